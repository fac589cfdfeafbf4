//! Token definitions.

use crate::span::Span;
use crate::types::Primitive;

/// A piece of an interpolated string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpSeg {
    /// Literal text with escapes already decoded.
    Text(String),
    /// Raw source of an embedded `${...}` expression, with the
    /// line/column and byte offset of its first character.
    Source {
        text: String,
        line: u32,
        column: u32,
        offset: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // keywords
    KwImport,
    KwConst,
    KwFn,
    KwProc,
    KwClass,
    KwConstructor,
    KwOp,
    KwPub,
    KwProt,
    KwStatic,
    KwFinal,
    KwLet,
    KwIf,
    KwElse,
    KwWhile,
    KwReturn,
    KwSelf,
    KwIs,
    KwAs,
    KwAny,
    KwVoid,
    KwNew,
    /// A primitive type name used as a keyword (`u8` .. `f64`,
    /// `bool`, `string`).
    TypeName(Primitive),

    // identifiers and literals
    Ident(String),
    /// `$`-prefixed procedure identifier; the name includes the sigil.
    ProcIdent(String),
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    /// String literal containing `${...}` interpolation segments.
    InterpString(Vec<InterpSeg>),
    BoolLiteral(bool),

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,
    At,
    Dollar,

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AndAnd,
    OrOr,
    Not,
    FatArrow,

    Eof,
    Error,
}

impl TokenKind {
    /// Short human-readable form for "expected X" diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::ProcIdent(name) => format!("procedure identifier `{name}`"),
            TokenKind::IntLiteral(v) => format!("integer literal `{v}`"),
            TokenKind::FloatLiteral(v) => format!("float literal `{v}`"),
            TokenKind::StringLiteral(_) | TokenKind::InterpString(_) => {
                "string literal".to_string()
            }
            TokenKind::BoolLiteral(v) => format!("`{v}`"),
            TokenKind::TypeName(p) => format!("`{}`", p.name()),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("`{}`", other.text()),
        }
    }

    /// Canonical source text of fixed tokens.
    pub fn text(&self) -> &'static str {
        match self {
            TokenKind::KwImport => "import",
            TokenKind::KwConst => "const",
            TokenKind::KwFn => "fn",
            TokenKind::KwProc => "proc",
            TokenKind::KwClass => "class",
            TokenKind::KwConstructor => "constructor",
            TokenKind::KwOp => "op",
            TokenKind::KwPub => "pub",
            TokenKind::KwProt => "prot",
            TokenKind::KwStatic => "static",
            TokenKind::KwFinal => "final",
            TokenKind::KwLet => "let",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwWhile => "while",
            TokenKind::KwReturn => "return",
            TokenKind::KwSelf => "self",
            TokenKind::KwIs => "is",
            TokenKind::KwAs => "as",
            TokenKind::KwAny => "any",
            TokenKind::KwVoid => "void",
            TokenKind::KwNew => "new",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::At => "@",
            TokenKind::Dollar => "$",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Assign => "=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Not => "!",
            TokenKind::FatArrow => "=>",
            _ => "",
        }
    }
}

/// A lexeme with its raw text and source position.
///
/// `line` and `column` are one-based; `span` is the byte range of the
/// raw lexeme in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
    pub span: Span,
}
