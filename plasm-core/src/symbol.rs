//! Symbol table: a chain of lexical scopes.

use std::collections::BTreeMap;

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Constant,
    Function,
    Procedure,
    Class,
    Parameter,
    Variable,
    Field,
}

impl SymbolKind {
    pub fn describe(&self) -> &'static str {
        match self {
            SymbolKind::Constant => "constant",
            SymbolKind::Function => "function",
            SymbolKind::Procedure => "procedure",
            SymbolKind::Class => "class",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Variable => "variable",
            SymbolKind::Field => "field",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Span of the declaring occurrence.
    pub span: Span,
}

/// Scope chain with shadowing across levels; re-definition within a
/// single level is rejected by `declare`.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<BTreeMap<String, Symbol>>,
}

impl ScopeStack {
    pub fn new() -> ScopeStack {
        ScopeStack {
            scopes: vec![BTreeMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    pub fn pop(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the outermost scope");
        self.scopes.pop();
    }

    /// Bind `symbol` in the innermost scope. Returns the previously
    /// bound symbol if this level already had one of the same name.
    pub fn declare(&mut self, symbol: Symbol) -> Option<Symbol> {
        let scope = self
            .scopes
            .last_mut()
            .expect("scope stack is never empty");
        scope.insert(symbol.name.clone(), symbol)
    }

    /// Resolve a name through the chain, innermost first.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        ScopeStack::new()
    }
}
