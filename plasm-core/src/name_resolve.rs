//! Name analysis.
//!
//! Two passes: the first registers every top-level declaration in the
//! outermost scope (reporting duplicates), the second walks the tree,
//! opening a scope per function body, class body, constructor body,
//! operator body, block and lambda, binding parameters and local
//! declarations, and resolving every identifier use.
//!
//! Symbols whose name begins with `__external_` (or `$__external_` for
//! procedures) are host bindings resolved at instantiation time; they
//! are accepted without a declaration.

use crate::ast::*;
use crate::diagnostic::{Diagnostic, Phase};
use crate::symbol::{ScopeStack, Symbol, SymbolKind};

#[derive(Debug)]
pub struct NameResolveResult {
    pub diagnostics: Vec<Diagnostic>,
}

pub fn resolve_names(program: &Program) -> NameResolveResult {
    let mut resolver = NameResolver {
        scopes: ScopeStack::new(),
        diagnostics: Vec::new(),
    };
    resolver.register_top_level(program);
    resolver.visit_program(program);
    NameResolveResult {
        diagnostics: resolver.diagnostics,
    }
}

fn is_external(name: &str) -> bool {
    name.starts_with("__external_") || name.starts_with("$__external_")
}

struct NameResolver {
    scopes: ScopeStack,
    diagnostics: Vec<Diagnostic>,
}

impl NameResolver {
    fn register_top_level(&mut self, program: &Program) {
        for decl in &program.declarations {
            let (name, kind) = match decl {
                Declaration::Const(c) => (&c.name, SymbolKind::Constant),
                Declaration::Function(f) => (&f.name, SymbolKind::Function),
                Declaration::Procedure(p) => (&p.name, SymbolKind::Procedure),
                Declaration::Class(c) => (&c.name, SymbolKind::Class),
            };
            self.declare(name, kind);
        }
    }

    fn declare(&mut self, name: &Ident, kind: SymbolKind) {
        let previous = self.scopes.declare(Symbol {
            name: name.name.clone(),
            kind,
            span: name.span,
        });
        if let Some(previous) = previous {
            self.diagnostics.push(
                Diagnostic::error(
                    Phase::Name,
                    format!("duplicate declaration in scope: {}", name.name),
                    name.span,
                )
                .with_secondary_label(previous.span, Some("first declared here".to_string())),
            );
        }
    }

    fn declare_params(&mut self, params: &[Param]) {
        for param in params {
            self.declare(&param.name, SymbolKind::Parameter);
        }
    }

    fn resolve_use(&mut self, name: &str, span: crate::span::Span) {
        if is_external(name) {
            return;
        }
        if self.scopes.lookup(name).is_none() {
            self.diagnostics.push(Diagnostic::error(
                Phase::Name,
                format!("Undefined identifier: {name}"),
                span,
            ));
        }
    }
}

impl AstVisitor for NameResolver {
    fn visit_declaration(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Const(c) => self.visit_expr(&c.value),
            Declaration::Function(f) => {
                self.scopes.push();
                self.declare_params(&f.params);
                // The body block opens its own scope below; sharing the
                // parameter scope keeps shadowing semantics uniform.
                self.visit_block(&f.body);
                self.scopes.pop();
            }
            Declaration::Procedure(p) => {
                self.scopes.push();
                self.declare_params(&p.params);
                self.visit_block(&p.body);
                self.scopes.pop();
            }
            Declaration::Class(c) => {
                self.scopes.push();
                for member in &c.members {
                    match member {
                        ClassMember::Field(f) => self.declare(&f.name, SymbolKind::Field),
                        ClassMember::Method(m) => self.declare(&m.name, SymbolKind::Function),
                        ClassMember::ProcMethod(m) => {
                            self.declare(&m.name, SymbolKind::Procedure)
                        }
                        ClassMember::Constructor(_) | ClassMember::Operator(_) => {}
                    }
                }
                for member in &c.members {
                    self.visit_class_member(member);
                }
                self.scopes.pop();
            }
        }
    }

    fn visit_class_member(&mut self, member: &ClassMember) {
        match member {
            ClassMember::Field(f) => {
                if let Some(init) = &f.init {
                    self.visit_expr(init);
                }
            }
            ClassMember::Constructor(c) => {
                self.scopes.push();
                self.declare_params(&c.params);
                self.visit_block(&c.body);
                self.scopes.pop();
            }
            ClassMember::Operator(o) => {
                self.scopes.push();
                self.declare_params(core::slice::from_ref(&o.param));
                self.visit_block(&o.body);
                self.scopes.pop();
            }
            ClassMember::Method(m) => {
                self.scopes.push();
                self.declare_params(&m.params);
                self.visit_block(&m.body);
                self.scopes.pop();
            }
            ClassMember::ProcMethod(m) => {
                self.scopes.push();
                self.declare_params(&m.params);
                self.visit_block(&m.body);
                self.scopes.pop();
            }
        }
    }

    fn visit_block(&mut self, block: &Block) {
        self.scopes.push();
        walk_block(self, block);
        self.scopes.pop();
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => {
                // Initialisers see the enclosing bindings, not the
                // names being introduced on this line.
                for binding in &decl.bindings {
                    if let Some(init) = &binding.init {
                        self.visit_expr(init);
                    }
                }
                for binding in &decl.bindings {
                    self.declare(&binding.name, SymbolKind::Variable);
                }
            }
            other => walk_stmt(self, other),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Identifier(name) => self.resolve_use(name, expr.span),
            ExprKind::ProcIdentifier(name) => self.resolve_use(name, expr.span),
            ExprKind::Assignment { target, value } => {
                self.visit_expr(target);
                self.visit_expr(value);
                if let ExprKind::Identifier(name) = &target.kind {
                    if let Some(symbol) = self.scopes.lookup(name) {
                        if matches!(
                            symbol.kind,
                            SymbolKind::Constant | SymbolKind::Function | SymbolKind::Procedure
                        ) {
                            self.diagnostics.push(Diagnostic::error(
                                Phase::Name,
                                format!(
                                    "invalid assignment target: {} is a {}",
                                    name,
                                    symbol.kind.describe()
                                ),
                                target.span,
                            ));
                        }
                    }
                }
            }
            ExprKind::ConstructorCall { class, args } => {
                match self.scopes.lookup(&class.name) {
                    Some(symbol) if symbol.kind == SymbolKind::Class => {}
                    Some(_) | None => {
                        self.diagnostics.push(Diagnostic::error(
                            Phase::Name,
                            format!("unknown class in constructor call: {}", class.name),
                            class.span,
                        ));
                    }
                }
                for arg in args {
                    self.visit_expr(arg);
                }
            }
            ExprKind::Lambda { params, body } => {
                self.scopes.push();
                self.declare_params(params);
                match body {
                    LambdaBody::Expr(e) => self.visit_expr(e),
                    LambdaBody::Block(b) => self.visit_block(b),
                }
                self.scopes.pop();
            }
            _ => walk_expr(self, expr),
        }
    }
}
