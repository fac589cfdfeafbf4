//! Rich diagnostics for the plasm compiler.
//!
//! Every pipeline phase accumulates `Diagnostic` values and keeps going;
//! the driver decides after each phase whether the list is fatal.

use core::fmt;

use crate::source::SourceMap;
use crate::span::Span;

/// Severity level of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// The pipeline phase that produced a diagnostic.
///
/// Rendered as the leading word of the
/// `<Phase> error at L:C: <message>` format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lexer,
    Parse,
    Name,
    Type,
    Codegen,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Lexer => "Lexer",
            Phase::Parse => "Parse",
            Phase::Name => "Name",
            Phase::Type => "Type analysis",
            Phase::Codegen => "Codegen",
        };
        write!(f, "{s}")
    }
}

/// A labeled span used inside diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub span: Span,
    pub message: Option<String>,
}

/// A single diagnostic message produced by the compiler.
///
/// A diagnostic has a main message, a primary label indicating the main
/// source location, and zero or more secondary labels for related
/// locations (for example, "declared here").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub phase: Phase,
    pub message: String,
    pub primary: Label,
    pub secondary: Vec<Label>,
}

impl Diagnostic {
    /// Create a new error diagnostic with a primary span.
    pub fn error(phase: Phase, message: impl Into<String>, primary_span: Span) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            phase,
            message: message.into(),
            primary: Label {
                span: primary_span,
                message: None,
            },
            secondary: Vec::new(),
        }
    }

    /// Create a new warning diagnostic with a primary span.
    pub fn warning(phase: Phase, message: impl Into<String>, primary_span: Span) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            phase,
            message: message.into(),
            primary: Label {
                span: primary_span,
                message: None,
            },
            secondary: Vec::new(),
        }
    }

    /// Add a secondary label with its own span and optional message.
    pub fn with_secondary_label(
        mut self,
        span: Span,
        message: impl Into<Option<String>>,
    ) -> Diagnostic {
        self.secondary.push(Label {
            span,
            message: message.into(),
        });
        self
    }

    /// Render this diagnostic as a single line in the
    /// `<Phase> error at L:C: <message>` format, with one-based line
    /// and column derived from the source map.
    pub fn render(&self, sm: &SourceMap) -> String {
        let (line, col) = sm
            .line_col(self.primary.span.file_id, self.primary.span.start)
            .unwrap_or((0, 0));
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        format!(
            "{} {} at {}:{}: {}",
            self.phase,
            kind,
            line + 1,
            col + 1,
            self.message
        )
    }
}

/// True if any diagnostic in the list is an error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.severity == Severity::Error)
}
