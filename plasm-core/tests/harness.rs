#![allow(dead_code)]

use plasm_core::ast::{self, AstVisitor, Expr, Program};
use plasm_core::compiler::{compile, CompilationArtifact, CompileOptions};
use plasm_core::diagnostic::Diagnostic;
use plasm_core::error::CoreError;
use plasm_core::ir::IrModule;
use plasm_core::span::FileId;
use plasm_core::typecheck::TypeCheckResult;
use plasm_core::{irbuild, lexer, name_resolve, parser, typecheck};

/// Compile source through the whole pipeline; panics on any error.
pub fn compile_src(src: &str) -> CompilationArtifact {
    match compile(FileId(0), src, CompileOptions::default()) {
        Ok(artifact) => artifact,
        Err(CoreError::Diagnostics(diags)) => {
            panic!(
                "unexpected compile failure:\n{}",
                diags
                    .iter()
                    .map(|d| d.message.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            );
        }
        Err(e) => panic!("unexpected compile failure: {e}"),
    }
}

/// Compile source expecting failure; returns the diagnostics.
pub fn compile_errs(src: &str) -> Vec<Diagnostic> {
    match compile(FileId(0), src, CompileOptions::default()) {
        Ok(_) => panic!("expected compilation to fail"),
        Err(CoreError::Diagnostics(diags)) => diags,
        Err(e) => panic!("expected diagnostics, got: {e}"),
    }
}

/// Lex and parse; returns the program and all diagnostics so far.
pub fn parse_src(src: &str) -> (Program, Vec<Diagnostic>) {
    let lex = lexer::tokenize(FileId(0), src);
    let parse = parser::parse_tokens(FileId(0), lex);
    (parse.program.expect("parser returned no program"), parse.diagnostics)
}

/// Parse expecting no diagnostics at all.
pub fn parse_clean(src: &str) -> Program {
    let (program, diags) = parse_src(src);
    assert!(
        diags.is_empty(),
        "unexpected parse diagnostics: {:?}",
        diags.iter().map(|d| &d.message).collect::<Vec<_>>()
    );
    program
}

/// Parse and type-check; parse and name analysis must be clean.
pub fn typecheck_src(src: &str) -> (Program, TypeCheckResult) {
    let program = parse_clean(src);
    let names = name_resolve::resolve_names(&program);
    assert!(
        names.diagnostics.is_empty(),
        "unexpected name diagnostics: {:?}",
        names.diagnostics.iter().map(|d| &d.message).collect::<Vec<_>>()
    );
    let tc = typecheck::typecheck(&program);
    (program, tc)
}

/// Run everything up to and including IR building; all phases before
/// the build must be clean, and so must the build itself.
pub fn build_module(src: &str) -> IrModule {
    let (program, tc) = typecheck_src(src);
    assert!(
        tc.diagnostics.is_empty(),
        "unexpected type diagnostics: {:?}",
        tc.diagnostics.iter().map(|d| &d.message).collect::<Vec<_>>()
    );
    let built = irbuild::build(&program, &tc);
    assert!(
        built.diagnostics.is_empty(),
        "unexpected build diagnostics: {:?}",
        built.diagnostics.iter().map(|d| &d.message).collect::<Vec<_>>()
    );
    built.module
}

pub fn assert_error(diags: &[Diagnostic], needle: &str) {
    assert!(
        diags.iter().any(|d| d.message.contains(needle)),
        "no diagnostic containing {needle:?} in: {:?}",
        diags.iter().map(|d| &d.message).collect::<Vec<_>>()
    );
}

struct ExprCollector {
    exprs: Vec<Expr>,
}

impl AstVisitor for ExprCollector {
    fn visit_expr(&mut self, expr: &Expr) {
        self.exprs.push(expr.clone());
        ast::walk_expr(self, expr);
    }
}

/// Every expression node in the program, pre-order.
pub fn collect_exprs(program: &Program) -> Vec<Expr> {
    let mut collector = ExprCollector { exprs: Vec::new() };
    collector.visit_program(program);
    collector.exprs
}
