//! Lexer for plasm source text.
//!
//! Produces a finite token sequence terminated by `Eof`. The lexer
//! never aborts: malformed input yields an `Error` token (or is
//! skipped) together with a diagnostic, and lexing continues.

use crate::diagnostic::{Diagnostic, Phase};
use crate::span::{FileId, Span};
use crate::token::{InterpSeg, Token, TokenKind};
use crate::types::Primitive;

#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn tokenize(file_id: FileId, src: &str) -> LexResult {
    let mut state = Lexer {
        file_id,
        src,
        bytes: src.as_bytes(),
        pos: 0,
        line: 1,
        col: 1,
        tokens: Vec::new(),
        diagnostics: Vec::new(),
    };
    state.run();
    LexResult {
        tokens: state.tokens,
        diagnostics: state.diagnostics,
    }
}

struct Lexer<'a> {
    file_id: FileId,
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) {
        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.bump();
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.block_comment();
                }
                b'"' => self.string_literal(),
                b'0'..=b'9' => self.number(),
                b'$' => self.proc_identifier(),
                _ if is_ident_start(c) => self.identifier(),
                _ => self.operator(),
            }
        }
        let end = self.pos as u32;
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            line: self.line,
            column: self.col,
            span: Span::new(self.file_id, end, end),
        });
    }

    /// Advance one code unit, updating line/column.
    fn bump(&mut self) {
        if self.bytes[self.pos] == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: u32, col: u32) {
        let text = self.src[start..self.pos].to_string();
        self.tokens.push(Token {
            kind,
            text,
            line,
            column: col,
            span: Span::new(self.file_id, start as u32, self.pos as u32),
        });
    }

    fn error_at(&mut self, message: String, start: usize) {
        self.diagnostics.push(Diagnostic::error(
            Phase::Lexer,
            message,
            Span::new(self.file_id, start as u32, self.pos.max(start + 1) as u32),
        ));
    }

    fn block_comment(&mut self) {
        let start = self.pos;
        self.bump();
        self.bump();
        loop {
            if self.pos >= self.bytes.len() {
                self.error_at("unterminated block comment".to_string(), start);
                return;
            }
            if self.bytes[self.pos] == b'*' && self.peek_at(1) == Some(b'/') {
                self.bump();
                self.bump();
                return;
            }
            self.bump();
        }
    }

    fn number(&mut self) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.bump();
        }
        let is_float = self.peek_at(0) == Some(b'.')
            && self.peek_at(1).map(|b| b.is_ascii_digit()).unwrap_or(false);
        if is_float {
            self.bump();
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                self.bump();
            }
            let text = &self.src[start..self.pos];
            match text.parse::<f64>() {
                Ok(v) => self.push(TokenKind::FloatLiteral(v), start, line, col),
                Err(_) => {
                    self.error_at(format!("invalid float literal: {text}"), start);
                    self.push(TokenKind::Error, start, line, col);
                }
            }
        } else {
            let text = &self.src[start..self.pos];
            match text.parse::<i64>() {
                Ok(v) => self.push(TokenKind::IntLiteral(v), start, line, col),
                Err(_) => {
                    self.error_at(format!("integer literal out of range: {text}"), start);
                    self.push(TokenKind::Error, start, line, col);
                }
            }
        }
    }

    fn identifier(&mut self) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        while self.pos < self.bytes.len() && is_ident_continue(self.bytes[self.pos]) {
            self.bump();
        }
        let text = &self.src[start..self.pos];
        let kind = keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()));
        self.push(kind, start, line, col);
    }

    fn proc_identifier(&mut self) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        self.bump();
        if self
            .peek_at(0)
            .map(|b| is_ident_start(b))
            .unwrap_or(false)
        {
            while self.pos < self.bytes.len() && is_ident_continue(self.bytes[self.pos]) {
                self.bump();
            }
            let text = self.src[start..self.pos].to_string();
            self.push(TokenKind::ProcIdent(text), start, line, col);
        } else {
            self.push(TokenKind::Dollar, start, line, col);
        }
    }

    fn string_literal(&mut self) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        self.bump();
        let mut text = String::new();
        let mut segments: Vec<InterpSeg> = Vec::new();
        loop {
            if self.pos >= self.bytes.len() {
                self.error_at("unterminated string literal".to_string(), start);
                self.push(TokenKind::Error, start, line, col);
                return;
            }
            match self.bytes[self.pos] {
                b'"' => {
                    self.bump();
                    break;
                }
                b'\\' => {
                    let esc_start = self.pos;
                    self.bump();
                    let decoded = match self.peek_at(0) {
                        Some(b'n') => Some('\n'),
                        Some(b't') => Some('\t'),
                        Some(b'r') => Some('\r'),
                        Some(b'\\') => Some('\\'),
                        Some(b'"') => Some('"'),
                        other => {
                            self.error_at(
                                format!(
                                    "invalid escape sequence: \\{}",
                                    other.map(|b| b as char).unwrap_or(' ')
                                ),
                                esc_start,
                            );
                            None
                        }
                    };
                    if self.pos < self.bytes.len() {
                        if let Some(ch) = decoded {
                            text.push(ch);
                        }
                        self.bump();
                    }
                }
                b'$' if self.peek_at(1) == Some(b'{') => {
                    if !text.is_empty() {
                        segments.push(InterpSeg::Text(core::mem::take(&mut text)));
                    }
                    self.bump();
                    self.bump();
                    let seg_offset = self.pos as u32;
                    let (seg_line, seg_col) = (self.line, self.col);
                    let seg_start = self.pos;
                    let mut depth = 1usize;
                    while self.pos < self.bytes.len() {
                        match self.bytes[self.pos] {
                            b'{' => depth += 1,
                            b'}' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            b'"' => break,
                            _ => {}
                        }
                        self.bump();
                    }
                    if self.pos >= self.bytes.len() || self.bytes[self.pos] != b'}' {
                        self.error_at("unterminated interpolation segment".to_string(), seg_start);
                    } else {
                        segments.push(InterpSeg::Source {
                            text: self.src[seg_start..self.pos].to_string(),
                            line: seg_line,
                            column: seg_col,
                            offset: seg_offset,
                        });
                        self.bump();
                    }
                }
                _ => {
                    if let Some(ch) = self.src[self.pos..].chars().next() {
                        text.push(ch);
                        for _ in 0..ch.len_utf8() {
                            self.bump();
                        }
                    } else {
                        self.bump();
                    }
                }
            }
        }
        if segments.is_empty() {
            self.push(TokenKind::StringLiteral(text), start, line, col);
        } else {
            if !text.is_empty() {
                segments.push(InterpSeg::Text(text));
            }
            self.push(TokenKind::InterpString(segments), start, line, col);
        }
    }

    fn operator(&mut self) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        let c = self.bytes[self.pos];
        let kind = match c {
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b'{' => Some(TokenKind::LBrace),
            b'}' => Some(TokenKind::RBrace),
            b'[' => Some(TokenKind::LBracket),
            b']' => Some(TokenKind::RBracket),
            b',' => Some(TokenKind::Comma),
            b';' => Some(TokenKind::Semicolon),
            b'.' => Some(TokenKind::Dot),
            b'@' => Some(TokenKind::At),
            b'+' => Some(TokenKind::Plus),
            b'-' => Some(TokenKind::Minus),
            b'*' => Some(TokenKind::Star),
            b'/' => Some(TokenKind::Slash),
            b'%' => Some(TokenKind::Percent),
            b'=' => match self.peek_at(1) {
                Some(b'=') => {
                    self.bump();
                    Some(TokenKind::EqEq)
                }
                Some(b'>') => {
                    self.bump();
                    Some(TokenKind::FatArrow)
                }
                _ => Some(TokenKind::Assign),
            },
            b'!' => match self.peek_at(1) {
                Some(b'=') => {
                    self.bump();
                    Some(TokenKind::NotEq)
                }
                _ => Some(TokenKind::Not),
            },
            b'<' => match self.peek_at(1) {
                Some(b'=') => {
                    self.bump();
                    Some(TokenKind::LtEq)
                }
                _ => Some(TokenKind::Lt),
            },
            b'>' => match self.peek_at(1) {
                Some(b'=') => {
                    self.bump();
                    Some(TokenKind::GtEq)
                }
                _ => Some(TokenKind::Gt),
            },
            b'&' => match self.peek_at(1) {
                Some(b'&') => {
                    self.bump();
                    Some(TokenKind::AndAnd)
                }
                _ => None,
            },
            b'|' => match self.peek_at(1) {
                Some(b'|') => {
                    self.bump();
                    Some(TokenKind::OrOr)
                }
                _ => None,
            },
            _ => None,
        };
        match kind {
            Some(kind) => {
                self.bump();
                self.push(kind, start, line, col);
            }
            None => {
                let ch = self.src[self.pos..].chars().next().unwrap_or('?');
                for _ in 0..ch.len_utf8().max(1) {
                    if self.pos < self.bytes.len() {
                        self.bump();
                    }
                }
                self.error_at(format!("Unexpected character: {ch}"), start);
            }
        }
    }
}

fn keyword(text: &str) -> Option<TokenKind> {
    if let Some(p) = Primitive::from_name(text) {
        return Some(TokenKind::TypeName(p));
    }
    let kind = match text {
        "import" => TokenKind::KwImport,
        "const" => TokenKind::KwConst,
        "fn" => TokenKind::KwFn,
        "proc" => TokenKind::KwProc,
        "class" => TokenKind::KwClass,
        "constructor" => TokenKind::KwConstructor,
        "op" => TokenKind::KwOp,
        "pub" => TokenKind::KwPub,
        "prot" => TokenKind::KwProt,
        "static" => TokenKind::KwStatic,
        "final" => TokenKind::KwFinal,
        "let" => TokenKind::KwLet,
        "if" => TokenKind::KwIf,
        "else" => TokenKind::KwElse,
        "while" => TokenKind::KwWhile,
        "return" => TokenKind::KwReturn,
        "self" => TokenKind::KwSelf,
        "is" => TokenKind::KwIs,
        "as" => TokenKind::KwAs,
        "any" => TokenKind::KwAny,
        "void" => TokenKind::KwVoid,
        "new" => TokenKind::KwNew,
        "true" => TokenKind::BoolLiteral(true),
        "false" => TokenKind::BoolLiteral(false),
        _ => return None,
    };
    Some(kind)
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
