use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as Process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plasm_core::{
    compile, diagnostic::Diagnostic, error::CoreError, source::SourceMap, CompileOptions,
};

#[derive(Parser, Debug)]
#[command(name = "plasm", version, about = "Compiler for the plasm language")]
struct Cli {
    #[arg(short, long, global = true, help = "Dump per-phase diagnostics and IR/WAT")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Source file to compile.
    src: Option<PathBuf>,

    /// Output path without extension; defaults to the source path
    /// with its extension removed.
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile into a temporary directory and hand the module to the
    /// host runner.
    Run {
        src: PathBuf,
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Run { src, args }) => run(&src, &args, cli.verbose),
        None => {
            let src = cli
                .src
                .ok_or_else(|| anyhow::anyhow!("missing source file (see --help)"))?;
            let out = cli.out.unwrap_or_else(|| src.with_extension(""));
            build(&src, &out, cli.verbose)?;
            Ok(())
        }
    }
}

/// Compile `src`, writing `<out>.wat` and, when an external
/// `wat2wasm` is available, `<out>.wasm`.
fn build(src: &Path, out: &Path, verbose: bool) -> Result<Option<PathBuf>> {
    let source = fs::read_to_string(src)
        .with_context(|| format!("failed to read source file {}", src.display()))?;
    let mut sm = SourceMap::new();
    let file_id = sm.add(src.display().to_string(), source.clone());

    let artifact = match compile(file_id, &source, CompileOptions { verbose }) {
        Ok(artifact) => artifact,
        Err(CoreError::Diagnostics(diags)) => {
            render_diagnostics(&diags, &sm);
            anyhow::bail!("compilation failed");
        }
        Err(e) => anyhow::bail!(e.to_string()),
    };

    let wat_path = out.with_extension("wat");
    if let Some(parent) = wat_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(&wat_path, &artifact.wat)
        .with_context(|| format!("failed to write {}", wat_path.display()))?;

    // The external assembler is optional: its absence leaves the .wat
    // artifact in place.
    let wasm_path = out.with_extension("wasm");
    match Process::new("wat2wasm")
        .arg("--enable-all")
        .arg(&wat_path)
        .arg("-o")
        .arg(&wasm_path)
        .status()
    {
        Ok(status) if status.success() => Ok(Some(wasm_path)),
        Ok(status) => {
            eprintln!("warning: wat2wasm exited with {status}; keeping {}", wat_path.display());
            Ok(None)
        }
        Err(_) => {
            eprintln!(
                "warning: wat2wasm not found; skipping .wasm generation ({} written)",
                wat_path.display()
            );
            Ok(None)
        }
    }
}

fn run(src: &Path, args: &[String], verbose: bool) -> Result<()> {
    let dir = tempfile::tempdir().context("failed to create temporary directory")?;
    let stem = src
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "out".into());
    let out = dir.path().join(stem);
    let wasm = build(src, &out, verbose)?
        .ok_or_else(|| anyhow::anyhow!("cannot run: no .wasm artifact (is wat2wasm installed?)"))?;

    let status = Process::new("plasm-run")
        .arg(&wasm)
        .args(args)
        .status()
        .context("failed to invoke plasm-run (is the host runner on PATH?)")?;
    std::process::exit(status.code().unwrap_or(1));
}

fn render_diagnostics(diags: &[Diagnostic], sm: &SourceMap) {
    for d in diags {
        eprintln!("{}", d.render(sm));
        let span = d.primary.span;
        if let Some((line, col)) = sm.line_col(span.file_id, span.start) {
            if let Some(text) = sm.line_str(span.file_id, line) {
                eprintln!("  {:>4} | {}", line + 1, text);
                eprintln!(
                    "       | {}{}",
                    " ".repeat(col as usize),
                    "^".repeat(span.len().max(1) as usize)
                );
            }
        }
        for label in &d.secondary {
            if let Some((line, col)) = sm.line_col(label.span.file_id, label.span.start) {
                let message = label.message.as_deref().unwrap_or("");
                eprintln!("  note: {}:{}: {}", line + 1, col + 1, message);
            }
        }
        eprintln!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_positional_output() {
        let cli = Cli::parse_from(["plasm", "main.plasm", "build/main"]);
        assert_eq!(cli.src, Some(PathBuf::from("main.plasm")));
        assert_eq!(cli.out, Some(PathBuf::from("build/main")));
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["plasm", "run", "main.plasm", "1", "2"]);
        match cli.command {
            Some(Command::Run { src, args }) => {
                assert_eq!(src, PathBuf::from("main.plasm"));
                assert_eq!(args, vec!["1".to_string(), "2".to_string()]);
            }
            _ => panic!("expected run subcommand"),
        }
    }
}
