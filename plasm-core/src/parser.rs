//! Recursive-descent parser.
//!
//! Precedence, lowest first: assignment, `||`, `&&`, equality,
//! relational (which also consumes `is T` and left-associative `as T`
//! chains), additive, multiplicative, unary, postfix, primary.
//!
//! After a statement-level error the parser synchronises by skipping
//! to the next `;` or to the next keyword that can begin a statement
//! or declaration.

use crate::ast::*;
use crate::diagnostic::{Diagnostic, Phase};
use crate::lexer::{self, LexResult};
use crate::span::{FileId, Span};
use crate::token::{InterpSeg, Token, TokenKind};

#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn parse_tokens(file_id: FileId, lex: LexResult) -> ParseResult {
    let mut parser = Parser {
        file_id,
        tokens: lex.tokens,
        pos: 0,
        diagnostics: lex.diagnostics,
        next_id: 0,
    };
    let program = parser.parse_program();
    ParseResult {
        program: Some(program),
        diagnostics: parser.diagnostics,
    }
}

struct Parser {
    file_id: FileId,
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    next_id: u32,
}

impl Parser {
    // -- token access -------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Span {
        self.peek()
            .map(|t| t.span)
            .unwrap_or_else(|| Span::empty(self.file_id, 0))
    }

    fn prev_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or_else(|| Span::empty(self.file_id, 0))
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn consume_if(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> bool {
        if self.consume_if(kind) {
            true
        } else {
            let found = self
                .peek_kind()
                .map(|k| k.describe())
                .unwrap_or_else(|| "end of input".to_string());
            let span = self.peek_span();
            self.diagnostics.push(Diagnostic::error(
                Phase::Parse,
                format!("expected `{}`, found {}", kind.text(), found),
                span,
            ));
            false
        }
    }

    /// A missing semicolon is a diagnostic, not a fatal error.
    fn expect_semicolon(&mut self) {
        if !self.consume_if(&TokenKind::Semicolon) {
            let found = self
                .peek_kind()
                .map(|k| k.describe())
                .unwrap_or_else(|| "end of input".to_string());
            let span = self.prev_span();
            self.diagnostics.push(Diagnostic::error(
                Phase::Parse,
                format!("expected `;`, found {found}"),
                span,
            ));
        }
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let span = self.peek_span();
        self.diagnostics
            .push(Diagnostic::error(Phase::Parse, message, span));
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.next_id(),
            span,
            kind,
        }
    }

    /// Skip ahead to the next `;` (consumed) or the next token that can
    /// begin a statement or declaration.
    fn synchronize(&mut self) {
        while !self.at_eof() {
            match self.peek_kind() {
                Some(TokenKind::Semicolon) => {
                    self.pos += 1;
                    return;
                }
                Some(
                    TokenKind::KwClass
                    | TokenKind::KwFn
                    | TokenKind::KwProc
                    | TokenKind::KwConst
                    | TokenKind::KwFinal
                    | TokenKind::KwLet
                    | TokenKind::KwIf
                    | TokenKind::KwWhile
                    | TokenKind::KwReturn
                    | TokenKind::RBrace,
                ) => return,
                _ => {
                    self.pos += 1;
                }
            }
        }
    }

    // -- program ------------------------------------------------------

    fn parse_program(&mut self) -> Program {
        let mut imports = Vec::new();
        let mut declarations = Vec::new();
        while !self.at_eof() {
            let before = self.pos;
            if self.check(&TokenKind::KwImport) {
                if let Some(import) = self.parse_import() {
                    imports.push(import);
                }
            } else if let Some(decl) = self.parse_declaration() {
                declarations.push(decl);
            }
            if self.pos == before {
                // Declaration failed without consuming anything; skip
                // the offending token to guarantee progress.
                self.pos += 1;
                self.synchronize();
            }
        }
        Program {
            imports,
            declarations,
        }
    }

    fn parse_import(&mut self) -> Option<ImportDecl> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwImport);
        let path = match self.peek_kind().cloned() {
            Some(TokenKind::StringLiteral(s)) => {
                self.pos += 1;
                s
            }
            Some(TokenKind::Ident(first)) => {
                self.pos += 1;
                let mut path = first;
                while self.consume_if(&TokenKind::Dot) {
                    match self.peek_kind().cloned() {
                        Some(TokenKind::Ident(part)) => {
                            self.pos += 1;
                            path.push('.');
                            path.push_str(&part);
                        }
                        _ => {
                            self.error_here("expected identifier in import path");
                            break;
                        }
                    }
                }
                path
            }
            _ => {
                self.error_here("expected import path");
                self.synchronize();
                return None;
            }
        };
        self.expect_semicolon();
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(ImportDecl { path, span })
    }

    fn parse_visibility(&mut self) -> Visibility {
        if self.consume_if(&TokenKind::KwPub) {
            Visibility::Pub
        } else if self.consume_if(&TokenKind::KwProt) {
            Visibility::Prot
        } else {
            Visibility::Private
        }
    }

    fn parse_declaration(&mut self) -> Option<Declaration> {
        let vis = self.parse_visibility();
        let is_static = self.consume_if(&TokenKind::KwStatic);
        match self.peek_kind() {
            Some(TokenKind::KwConst) => self.parse_const(vis, is_static).map(Declaration::Const),
            Some(TokenKind::KwFn) => self
                .parse_function(vis, is_static)
                .map(Declaration::Function),
            Some(TokenKind::KwProc) => self
                .parse_procedure(vis, is_static)
                .map(Declaration::Procedure),
            Some(TokenKind::KwClass) => self.parse_class(vis).map(Declaration::Class),
            _ => {
                let found = self
                    .peek_kind()
                    .map(|k| k.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                self.error_here(format!(
                    "expected `const`, `fn`, `proc` or `class`, found {found}"
                ));
                self.synchronize();
                None
            }
        }
    }

    fn parse_const(&mut self, vis: Visibility, is_static: bool) -> Option<ConstDecl> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwConst);
        let ty = if self.declared_type_follows() {
            self.parse_type_spec()
        } else {
            None
        };
        let name = self.parse_ident("constant name")?;
        if !self.expect(&TokenKind::Assign) {
            self.synchronize();
            return None;
        }
        let value = self.parse_expression();
        self.expect_semicolon();
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(ConstDecl {
            vis,
            is_static,
            ty,
            name,
            value,
            span,
        })
    }

    fn parse_function(&mut self, vis: Visibility, is_static: bool) -> Option<FunctionDecl> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwFn);
        let name = match self.peek_kind().cloned() {
            Some(TokenKind::Ident(name)) => {
                let span = self.peek_span();
                self.pos += 1;
                Ident { name, span }
            }
            _ => {
                self.error_here("expected function name after `fn`");
                self.synchronize();
                return None;
            }
        };
        let params = self.parse_params()?;
        let return_type = self.parse_type_spec()?;
        let body = self.parse_block()?;
        let span = start.join(body.span).unwrap_or(start);
        Some(FunctionDecl {
            vis,
            is_static,
            name,
            params,
            return_type,
            body,
            span,
        })
    }

    fn parse_procedure(&mut self, vis: Visibility, is_static: bool) -> Option<ProcedureDecl> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwProc);
        let name = match self.peek_kind().cloned() {
            Some(TokenKind::ProcIdent(name)) => {
                let span = self.peek_span();
                self.pos += 1;
                Ident { name, span }
            }
            _ => {
                self.error_here("expected `$`-identifier after `proc`");
                self.synchronize();
                return None;
            }
        };
        let params = self.parse_params()?;
        let return_type = self.parse_type_spec()?;
        let body = self.parse_block()?;
        let span = start.join(body.span).unwrap_or(start);
        Some(ProcedureDecl {
            vis,
            is_static,
            name,
            params,
            return_type,
            body,
            span,
        })
    }

    fn parse_class(&mut self, vis: Visibility) -> Option<ClassDecl> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwClass);
        let name = self.parse_ident("class name")?;
        if !self.expect(&TokenKind::LBrace) {
            self.synchronize();
            return None;
        }
        let mut members = Vec::new();
        while !self.at_eof() && !self.check(&TokenKind::RBrace) {
            let before = self.pos;
            if let Some(member) = self.parse_class_member() {
                members.push(member);
            }
            if self.pos == before {
                self.pos += 1;
                self.synchronize();
            }
        }
        self.expect(&TokenKind::RBrace);
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(ClassDecl {
            vis,
            name,
            members,
            span,
        })
    }

    fn parse_class_member(&mut self) -> Option<ClassMember> {
        let vis = self.parse_visibility();
        let is_static = self.consume_if(&TokenKind::KwStatic);
        match self.peek_kind() {
            Some(TokenKind::KwFinal | TokenKind::KwLet) => {
                self.parse_field(vis, is_static).map(ClassMember::Field)
            }
            Some(TokenKind::KwConstructor) => {
                self.parse_constructor(vis).map(ClassMember::Constructor)
            }
            Some(TokenKind::KwOp) => self.parse_operator(vis).map(ClassMember::Operator),
            Some(TokenKind::KwFn) => self
                .parse_function(vis, is_static)
                .map(ClassMember::Method),
            Some(TokenKind::KwProc) => self
                .parse_procedure(vis, is_static)
                .map(ClassMember::ProcMethod),
            _ => {
                let found = self
                    .peek_kind()
                    .map(|k| k.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                self.error_here(format!("expected class member, found {found}"));
                None
            }
        }
    }

    fn parse_field(&mut self, vis: Visibility, is_static: bool) -> Option<FieldDecl> {
        let start = self.peek_span();
        let is_final = matches!(self.peek_kind(), Some(TokenKind::KwFinal));
        self.pos += 1;
        let ty = if self.declared_type_follows() {
            self.parse_type_spec()
        } else {
            None
        };
        let name = self.parse_ident("field name")?;
        let init = if self.consume_if(&TokenKind::Assign) {
            Some(self.parse_expression())
        } else {
            None
        };
        self.expect_semicolon();
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(FieldDecl {
            vis,
            is_static,
            is_final,
            ty,
            name,
            init,
            span,
        })
    }

    fn parse_constructor(&mut self, vis: Visibility) -> Option<ConstructorDecl> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwConstructor);
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        let span = start.join(body.span).unwrap_or(start);
        Some(ConstructorDecl {
            vis,
            params,
            body,
            span,
        })
    }

    fn parse_operator(&mut self, vis: Visibility) -> Option<OperatorDecl> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwOp);
        if !self.expect(&TokenKind::LParen) {
            return None;
        }
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => BinaryOp::Add,
            Some(TokenKind::Minus) => BinaryOp::Sub,
            Some(TokenKind::Star) => BinaryOp::Mul,
            Some(TokenKind::Slash) => BinaryOp::Div,
            Some(TokenKind::Percent) => BinaryOp::Mod,
            Some(TokenKind::EqEq) => BinaryOp::Eq,
            Some(TokenKind::NotEq) => BinaryOp::Neq,
            Some(TokenKind::Lt) => BinaryOp::Lt,
            Some(TokenKind::Gt) => BinaryOp::Gt,
            Some(TokenKind::LtEq) => BinaryOp::Lte,
            Some(TokenKind::GtEq) => BinaryOp::Gte,
            Some(TokenKind::AndAnd) => BinaryOp::And,
            Some(TokenKind::OrOr) => BinaryOp::Or,
            _ => {
                self.error_here("expected operator symbol in `op(...)`");
                self.synchronize();
                return None;
            }
        };
        self.pos += 1;
        self.expect(&TokenKind::RParen);
        if !self.expect(&TokenKind::LParen) {
            return None;
        }
        let param = self.parse_param()?;
        self.expect(&TokenKind::RParen);
        let return_type = self.parse_type_spec()?;
        let body = self.parse_block()?;
        let span = start.join(body.span).unwrap_or(start);
        Some(OperatorDecl {
            vis,
            op,
            param,
            return_type,
            body,
            span,
        })
    }

    fn parse_params(&mut self) -> Option<Vec<Param>> {
        if !self.expect(&TokenKind::LParen) {
            self.synchronize();
            return None;
        }
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.consume_if(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen);
        Some(params)
    }

    fn parse_param(&mut self) -> Option<Param> {
        let start = self.peek_span();
        let ty = self.parse_type_spec()?;
        let name = self.parse_ident("parameter name")?;
        let span = start.join(name.span).unwrap_or(start);
        Some(Param { ty, name, span })
    }

    fn parse_ident(&mut self, what: &str) -> Option<Ident> {
        match self.peek_kind().cloned() {
            Some(TokenKind::Ident(name)) => {
                let span = self.peek_span();
                self.pos += 1;
                Some(Ident { name, span })
            }
            _ => {
                let found = self
                    .peek_kind()
                    .map(|k| k.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                self.error_here(format!("expected {what}, found {found}"));
                None
            }
        }
    }

    // -- types --------------------------------------------------------

    /// Whether the tokens at the cursor look like a declared type in a
    /// `const`/`final`/`let` position (as opposed to the bound name).
    fn declared_type_follows(&self) -> bool {
        match self.peek_kind() {
            Some(TokenKind::TypeName(_) | TokenKind::KwVoid | TokenKind::KwAny) => true,
            Some(TokenKind::LParen) => true,
            Some(TokenKind::Ident(_)) => matches!(
                self.peek_kind_at(1),
                Some(TokenKind::Ident(_) | TokenKind::Lt)
            ),
            _ => false,
        }
    }

    fn parse_type_spec(&mut self) -> Option<TypeSpec> {
        let start = self.peek_span();
        let kind = match self.peek_kind().cloned() {
            Some(TokenKind::TypeName(p)) => {
                self.pos += 1;
                TypeSpecKind::Prim(p)
            }
            Some(TokenKind::KwVoid) => {
                self.pos += 1;
                TypeSpecKind::Void
            }
            Some(TokenKind::KwAny) => {
                self.pos += 1;
                TypeSpecKind::Any
            }
            Some(TokenKind::Ident(name)) => {
                self.pos += 1;
                if self.consume_if(&TokenKind::Lt) {
                    let mut args = Vec::new();
                    loop {
                        args.push(self.parse_type_spec()?);
                        if !self.consume_if(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::Gt);
                    TypeSpecKind::Generic { name, args }
                } else {
                    TypeSpecKind::Named(name)
                }
            }
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let mut parts = Vec::new();
                if !self.check(&TokenKind::RParen) {
                    loop {
                        parts.push(self.parse_type_spec()?);
                        if !self.consume_if(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen);
                if self.consume_if(&TokenKind::FatArrow) {
                    let result = self.parse_type_spec()?;
                    TypeSpecKind::Function {
                        params: parts,
                        result: Box::new(result),
                    }
                } else {
                    TypeSpecKind::Tuple(parts)
                }
            }
            _ => {
                let found = self
                    .peek_kind()
                    .map(|k| k.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                self.error_here(format!("expected type, found {found}"));
                return None;
            }
        };
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(TypeSpec { kind, span })
    }

    // -- statements ---------------------------------------------------

    fn parse_block(&mut self) -> Option<Block> {
        let start = self.peek_span();
        if !self.expect(&TokenKind::LBrace) {
            self.synchronize();
            return None;
        }
        let mut statements = Vec::new();
        while !self.at_eof() && !self.check(&TokenKind::RBrace) {
            let before = self.pos;
            if let Some(stmt) = self.parse_stmt() {
                statements.push(stmt);
            }
            if self.pos == before {
                self.pos += 1;
                self.synchronize();
            }
        }
        self.expect(&TokenKind::RBrace);
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(Block { statements, span })
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        match self.peek_kind() {
            Some(TokenKind::LBrace) => self.parse_block().map(Stmt::Block),
            Some(TokenKind::KwFinal | TokenKind::KwLet) => {
                self.parse_var_decl().map(Stmt::VarDecl)
            }
            Some(TokenKind::KwIf) => self.parse_if().map(Stmt::If),
            Some(TokenKind::KwWhile) => self.parse_while().map(Stmt::While),
            Some(TokenKind::KwReturn) => self.parse_return().map(Stmt::Return),
            _ => {
                let expr = self.parse_expression();
                self.expect_semicolon();
                Some(Stmt::Expr(expr))
            }
        }
    }

    fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let start = self.peek_span();
        let is_final = matches!(self.peek_kind(), Some(TokenKind::KwFinal));
        self.pos += 1;
        let ty = if self.declared_type_follows() {
            self.parse_type_spec()
        } else {
            None
        };
        let mut bindings = Vec::new();
        loop {
            let name = match self.parse_ident("variable name") {
                Some(name) => name,
                None => {
                    self.synchronize();
                    return if bindings.is_empty() {
                        None
                    } else {
                        let span = start.join(self.prev_span()).unwrap_or(start);
                        Some(VarDecl {
                            is_final,
                            ty,
                            bindings,
                            span,
                        })
                    };
                }
            };
            let init = if self.consume_if(&TokenKind::Assign) {
                Some(self.parse_expression())
            } else {
                None
            };
            bindings.push(VarBinding { name, init });
            if !self.consume_if(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_semicolon();
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(VarDecl {
            is_final,
            ty,
            bindings,
            span,
        })
    }

    fn parse_if(&mut self) -> Option<IfStmt> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwIf);
        // Parentheses around the condition are optional; when present
        // the expression grammar consumes them as a grouping.
        let condition = self.parse_expression();
        let then_branch = self.parse_block()?;
        let else_branch = if self.consume_if(&TokenKind::KwElse) {
            if self.check(&TokenKind::KwIf) {
                Some(Box::new(Stmt::If(self.parse_if()?)))
            } else {
                Some(Box::new(Stmt::Block(self.parse_block()?)))
            }
        } else {
            None
        };
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(IfStmt {
            condition,
            then_branch,
            else_branch,
            span,
        })
    }

    fn parse_while(&mut self) -> Option<WhileStmt> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwWhile);
        let condition = self.parse_expression();
        let body = self.parse_block()?;
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(WhileStmt {
            condition,
            body,
            span,
        })
    }

    fn parse_return(&mut self) -> Option<ReturnStmt> {
        let start = self.peek_span();
        self.expect(&TokenKind::KwReturn);
        let value = if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RBrace) {
            None
        } else {
            Some(self.parse_expression())
        };
        self.expect_semicolon();
        let span = start.join(self.prev_span()).unwrap_or(start);
        Some(ReturnStmt { value, span })
    }

    // -- expressions --------------------------------------------------

    fn parse_expression(&mut self) -> Expr {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Expr {
        let lhs = self.parse_logical_or();
        if self.consume_if(&TokenKind::Assign) {
            if !matches!(lhs.kind, ExprKind::Identifier(_)) {
                self.diagnostics.push(Diagnostic::error(
                    Phase::Parse,
                    "invalid assignment target; only a bare identifier can be assigned",
                    lhs.span,
                ));
            }
            let value = self.parse_assignment();
            let span = lhs.span.join(value.span).unwrap_or(lhs.span);
            return self.expr(
                ExprKind::Assignment {
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                span,
            );
        }
        lhs
    }

    fn parse_logical_or(&mut self) -> Expr {
        let mut lhs = self.parse_logical_and();
        while self.consume_if(&TokenKind::OrOr) {
            let rhs = self.parse_logical_and();
            lhs = self.binary(BinaryOp::Or, lhs, rhs);
        }
        lhs
    }

    fn parse_logical_and(&mut self) -> Expr {
        let mut lhs = self.parse_equality();
        while self.consume_if(&TokenKind::AndAnd) {
            let rhs = self.parse_equality();
            lhs = self.binary(BinaryOp::And, lhs, rhs);
        }
        lhs
    }

    fn parse_equality(&mut self) -> Expr {
        let mut lhs = self.parse_relational();
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => BinaryOp::Eq,
                Some(TokenKind::NotEq) => BinaryOp::Neq,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_relational();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    /// Relational operators plus `is T` and left-associative `as T`
    /// cast chains.
    fn parse_relational(&mut self) -> Expr {
        let mut lhs = self.parse_additive();
        loop {
            match self.peek_kind() {
                Some(TokenKind::Lt) => {
                    self.pos += 1;
                    let rhs = self.parse_additive();
                    lhs = self.binary(BinaryOp::Lt, lhs, rhs);
                }
                Some(TokenKind::Gt) => {
                    self.pos += 1;
                    let rhs = self.parse_additive();
                    lhs = self.binary(BinaryOp::Gt, lhs, rhs);
                }
                Some(TokenKind::LtEq) => {
                    self.pos += 1;
                    let rhs = self.parse_additive();
                    lhs = self.binary(BinaryOp::Lte, lhs, rhs);
                }
                Some(TokenKind::GtEq) => {
                    self.pos += 1;
                    let rhs = self.parse_additive();
                    lhs = self.binary(BinaryOp::Gte, lhs, rhs);
                }
                Some(TokenKind::KwIs) => {
                    self.pos += 1;
                    match self.parse_type_spec() {
                        Some(target) => {
                            let span = lhs.span.join(target.span).unwrap_or(lhs.span);
                            lhs = self.expr(
                                ExprKind::TypeTest {
                                    operand: Box::new(lhs),
                                    target,
                                },
                                span,
                            );
                        }
                        None => break,
                    }
                }
                Some(TokenKind::KwAs) => {
                    self.pos += 1;
                    match self.parse_type_spec() {
                        Some(target) => {
                            let span = lhs.span.join(target.span).unwrap_or(lhs.span);
                            lhs = self.expr(
                                ExprKind::Cast {
                                    operand: Box::new(lhs),
                                    target,
                                },
                                span,
                            );
                        }
                        None => break,
                    }
                }
                _ => break,
            }
        }
        lhs
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary();
            lhs = self.binary(op, lhs, rhs);
        }
        lhs
    }

    fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.join(rhs.span).unwrap_or(lhs.span);
        self.expr(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    fn parse_unary(&mut self) -> Expr {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                let start = self.peek_span();
                self.pos += 1;
                let operand = self.parse_unary();
                let span = start.join(operand.span).unwrap_or(start);
                self.expr(
                    ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    span,
                )
            }
            Some(TokenKind::Not) => {
                let start = self.peek_span();
                self.pos += 1;
                let operand = self.parse_unary();
                let span = start.join(operand.span).unwrap_or(start);
                self.expr(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                )
            }
            // `(T) e` is a prefix cast only when the lookahead past the
            // `(` sees a type keyword immediately closed by `)`;
            // otherwise the `(` opens a grouping or tuple.
            Some(TokenKind::LParen)
                if matches!(
                    self.peek_kind_at(1),
                    Some(TokenKind::TypeName(_) | TokenKind::KwVoid | TokenKind::KwAny)
                ) && matches!(self.peek_kind_at(2), Some(TokenKind::RParen)) =>
            {
                let start = self.peek_span();
                self.pos += 1;
                let target = match self.parse_type_spec() {
                    Some(t) => t,
                    None => return self.poison(start),
                };
                self.expect(&TokenKind::RParen);
                let operand = self.parse_unary();
                let span = start.join(operand.span).unwrap_or(start);
                self.expr(
                    ExprKind::Cast {
                        operand: Box::new(operand),
                        target,
                    },
                    span,
                )
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    let member = match self.peek_kind().cloned() {
                        Some(TokenKind::Ident(name)) => {
                            self.pos += 1;
                            name
                        }
                        Some(TokenKind::ProcIdent(name)) => {
                            self.pos += 1;
                            name
                        }
                        _ => {
                            self.error_here("expected member name after `.`");
                            break;
                        }
                    };
                    let span = expr.span.join(self.prev_span()).unwrap_or(expr.span);
                    expr = self.expr(
                        ExprKind::Member {
                            object: Box::new(expr),
                            member,
                        },
                        span,
                    );
                }
                Some(TokenKind::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_expression();
                    self.expect(&TokenKind::RBracket);
                    let span = expr.span.join(self.prev_span()).unwrap_or(expr.span);
                    expr = self.expr(
                        ExprKind::Index {
                            array: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                Some(TokenKind::LParen) => {
                    self.pos += 1;
                    let args = self.parse_args();
                    let span = expr.span.join(self.prev_span()).unwrap_or(expr.span);
                    expr = self.expr(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression());
                if !self.consume_if(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen);
        args
    }

    fn parse_primary(&mut self) -> Expr {
        let start = self.peek_span();
        match self.peek_kind().cloned() {
            Some(TokenKind::IntLiteral(v)) => {
                self.pos += 1;
                self.expr(ExprKind::IntLiteral(v), start)
            }
            Some(TokenKind::FloatLiteral(v)) => {
                self.pos += 1;
                self.expr(ExprKind::FloatLiteral(v), start)
            }
            Some(TokenKind::StringLiteral(s)) => {
                self.pos += 1;
                self.expr(ExprKind::StringLiteral(s), start)
            }
            Some(TokenKind::InterpString(segments)) => {
                self.pos += 1;
                self.parse_interpolation(segments, start)
            }
            Some(TokenKind::BoolLiteral(v)) => {
                self.pos += 1;
                self.expr(ExprKind::BoolLiteral(v), start)
            }
            Some(TokenKind::KwSelf) => {
                self.pos += 1;
                self.expr(ExprKind::SelfRef, start)
            }
            Some(TokenKind::KwNew) => self.parse_new(start),
            Some(TokenKind::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expression());
                        if !self.consume_if(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket);
                let span = start.join(self.prev_span()).unwrap_or(start);
                self.expr(ExprKind::ArrayLiteral(items), span)
            }
            Some(TokenKind::Ident(name)) => {
                self.pos += 1;
                self.expr(ExprKind::Identifier(name), start)
            }
            Some(TokenKind::ProcIdent(name)) => {
                self.pos += 1;
                self.expr(ExprKind::ProcIdentifier(name), start)
            }
            Some(TokenKind::At) => self.parse_lambda(start),
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let first = self.parse_expression();
                if self.consume_if(&TokenKind::Comma) {
                    let mut items = vec![first];
                    loop {
                        items.push(self.parse_expression());
                        if !self.consume_if(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen);
                    let span = start.join(self.prev_span()).unwrap_or(start);
                    self.expr(ExprKind::Tuple(items), span)
                } else {
                    self.expect(&TokenKind::RParen);
                    first
                }
            }
            _ => {
                let found = self
                    .peek_kind()
                    .map(|k| k.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                self.error_here(format!("expected expression, found {found}"));
                self.poison(start)
            }
        }
    }

    fn parse_new(&mut self, start: Span) -> Expr {
        self.expect(&TokenKind::KwNew);
        let spec = match self.parse_type_spec() {
            Some(spec) => spec,
            None => return self.poison(start),
        };
        if self.consume_if(&TokenKind::LBracket) {
            let size = self.parse_expression();
            self.expect(&TokenKind::RBracket);
            let span = start.join(self.prev_span()).unwrap_or(start);
            self.expr(
                ExprKind::ArrayAlloc {
                    elem: spec,
                    size: Box::new(size),
                },
                span,
            )
        } else if self.consume_if(&TokenKind::LParen) {
            let args = self.parse_args();
            let span = start.join(self.prev_span()).unwrap_or(start);
            match spec.kind {
                TypeSpecKind::Named(name) => self.expr(
                    ExprKind::ConstructorCall {
                        class: Ident {
                            name,
                            span: spec.span,
                        },
                        args,
                    },
                    span,
                ),
                _ => {
                    self.diagnostics.push(Diagnostic::error(
                        Phase::Parse,
                        "expected class name after `new`",
                        spec.span,
                    ));
                    self.poison(span)
                }
            }
        } else {
            self.error_here("expected `[` or `(` after `new T`");
            self.poison(start)
        }
    }

    fn parse_lambda(&mut self, start: Span) -> Expr {
        self.expect(&TokenKind::At);
        let params = match self.parse_params() {
            Some(params) => params,
            None => return self.poison(start),
        };
        let body = if self.consume_if(&TokenKind::FatArrow) {
            LambdaBody::Expr(Box::new(self.parse_expression()))
        } else {
            match self.parse_block() {
                Some(block) => LambdaBody::Block(block),
                None => return self.poison(start),
            }
        };
        let span = start.join(self.prev_span()).unwrap_or(start);
        self.expr(ExprKind::Lambda { params, body }, span)
    }

    fn parse_interpolation(&mut self, segments: Vec<InterpSeg>, start: Span) -> Expr {
        let mut parts = Vec::new();
        for segment in segments {
            match segment {
                InterpSeg::Text(text) => parts.push(InterpPart::Text(text)),
                InterpSeg::Source {
                    text,
                    line,
                    column,
                    offset,
                } => {
                    let expr = self.parse_embedded_expr(&text, line, column, offset);
                    parts.push(InterpPart::Expr(Box::new(expr)));
                }
            }
        }
        let span = start.join(self.prev_span()).unwrap_or(start);
        self.expr(ExprKind::Interpolation(parts), span)
    }

    /// Parse the source of a `${...}` segment with a nested parser,
    /// re-anchoring token positions to the enclosing file.
    fn parse_embedded_expr(&mut self, text: &str, line: u32, column: u32, offset: u32) -> Expr {
        let lex = lexer::tokenize(self.file_id, text);
        let mut tokens = lex.tokens;
        for tok in &mut tokens {
            tok.span = Span::new(
                self.file_id,
                tok.span.start + offset,
                tok.span.end + offset,
            );
            if tok.line == 1 {
                tok.column += column - 1;
            }
            tok.line += line - 1;
        }
        let mut sub = Parser {
            file_id: self.file_id,
            tokens,
            pos: 0,
            diagnostics: lex.diagnostics,
            next_id: self.next_id,
        };
        let expr = sub.parse_expression();
        if !sub.at_eof() {
            sub.error_here("unexpected trailing tokens in interpolation");
        }
        self.next_id = sub.next_id;
        self.diagnostics.append(&mut sub.diagnostics);
        expr
    }

    /// Placeholder node emitted after an expression-level parse error;
    /// the driver never runs later phases once parse diagnostics exist.
    fn poison(&mut self, span: Span) -> Expr {
        self.expr(ExprKind::IntLiteral(0), span)
    }
}
