//! Core error type for the plasm toolchain.
//!
//! Language-level errors travel as `Diagnostic` lists; `CoreError` is
//! the wrapper handed across the pipeline boundary. The CLI renders
//! the full list with source context, so `Display` here is only the
//! compact one-line form used where no source map is at hand.

use core::fmt;

use crate::diagnostic::{Diagnostic, Severity};

#[derive(Debug, Clone)]
pub enum CoreError {
    /// One or more language-level diagnostics (spans, labels, phases).
    Diagnostics(Vec<Diagnostic>),

    /// A bug in the compiler itself, never a user-facing language
    /// error.
    Internal(&'static str),
}

impl CoreError {
    /// Construct an internal error with a static message.
    pub fn internal(message: &'static str) -> CoreError {
        CoreError::Internal(message)
    }

    /// The diagnostics carried by this error, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CoreError::Diagnostics(ds) => ds,
            CoreError::Internal(_) => &[],
        }
    }
}

impl From<Diagnostic> for CoreError {
    fn from(diagnostic: Diagnostic) -> CoreError {
        CoreError::Diagnostics(vec![diagnostic])
    }
}

impl From<Vec<Diagnostic>> for CoreError {
    fn from(diagnostics: Vec<Diagnostic>) -> CoreError {
        CoreError::Diagnostics(diagnostics)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Diagnostics(diags) => match diags.first() {
                Some(first) => {
                    let kind = match first.severity {
                        Severity::Error => "error",
                        Severity::Warning => "warning",
                    };
                    write!(f, "{} {}: {}", first.phase, kind, first.message)?;
                    if diags.len() > 1 {
                        write!(f, " (and {} more)", diags.len() - 1)?;
                    }
                    Ok(())
                }
                None => write!(f, "compilation failed without diagnostics"),
            },
            CoreError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}
