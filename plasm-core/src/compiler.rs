//! Compile driver: runs the pipeline phases in order.
//!
//! Each phase accumulates diagnostics without aborting; the driver
//! stops after any phase whose diagnostic list contains an error. The
//! generated text is assembled and validated before it is handed back,
//! so a caller never receives an artifact a wasm engine would reject.

use crate::diagnostic::{has_errors, Diagnostic, Phase};
use crate::error::CoreError;
use crate::irbuild;
use crate::lexer;
use crate::log;
use crate::name_resolve;
use crate::parser;
use crate::passes;
use crate::span::{FileId, Span};
use crate::typecheck;
use crate::wat;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Dump per-phase diagnostics and the IR/WAT to stderr.
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct CompilationArtifact {
    pub wat: String,
}

pub fn compile(
    file_id: FileId,
    source: &str,
    options: CompileOptions,
) -> Result<CompilationArtifact, CoreError> {
    log::set_verbose(options.verbose);

    let lex = lexer::tokenize(file_id, source);
    let parse = parser::parse_tokens(file_id, lex);
    let mut diagnostics = parse.diagnostics;
    if has_errors(&diagnostics) {
        return Err(CoreError::from(diagnostics));
    }
    let program = match parse.program {
        Some(program) => program,
        None => return Err(CoreError::internal("parser produced no program")),
    };

    let names = name_resolve::resolve_names(&program);
    diagnostics.extend(names.diagnostics);
    if has_errors(&diagnostics) {
        return Err(CoreError::from(diagnostics));
    }

    let tc = typecheck::typecheck(&program);
    diagnostics.extend(tc.diagnostics.clone());
    if has_errors(&diagnostics) {
        return Err(CoreError::from(diagnostics));
    }

    let built = irbuild::build(&program, &tc);
    diagnostics.extend(built.diagnostics);
    if has_errors(&diagnostics) {
        return Err(CoreError::from(diagnostics));
    }
    let mut module = built.module;

    let mut pipeline = passes::default_pipeline();
    pipeline.run_all(&mut module);

    if log::is_verbose() {
        eprintln!("=== IR ===\n{module}");
    }

    let text = wat::generate_wat(&module);
    if log::is_verbose() {
        eprintln!("=== WAT ===\n{text}");
    }

    // Assemble and validate before returning the artifact; a text
    // module that does not survive the toolchain is a compiler bug
    // worth surfacing as a diagnostic rather than downstream.
    match ::wat::parse_str(&text) {
        Ok(bytes) => {
            let mut validator = wasmparser::Validator::new_with_features(
                wasmparser::WasmFeatures::all(),
            );
            if let Err(err) = validator.validate_all(&bytes) {
                diagnostics.push(Diagnostic::error(
                    Phase::Codegen,
                    format!("invalid wasm generated: {err}"),
                    Span::dummy(),
                ));
                return Err(CoreError::from(diagnostics));
            }
        }
        Err(err) => {
            diagnostics.push(Diagnostic::error(
                Phase::Codegen,
                format!("invalid wasm generated: {err}"),
                Span::dummy(),
            ));
            return Err(CoreError::from(diagnostics));
        }
    }

    Ok(CompilationArtifact { wat: text })
}
