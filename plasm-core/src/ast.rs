//! AST node definitions and the visitor contract.
//!
//! The tree is immutable after parsing. Every expression carries a
//! `NodeId` so later phases can attach information (the type analyser's
//! side-table is keyed by it) without mutating the tree.

use crate::span::Span;
use crate::types::Primitive;

/// Identity of an expression node, unique within one parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

/// Visibility marker on declarations and members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Pub,
    Prot,
}

/// Identifier with span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// Surface-level type expression.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub kind: TypeSpecKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpecKind {
    Prim(Primitive),
    /// A user type (class) by name.
    Named(String),
    /// Generic application `N<T, ...>`.
    Generic {
        name: String,
        args: Vec<TypeSpec>,
    },
    /// Function type `(T, ...) => T`.
    Function {
        params: Vec<TypeSpec>,
        result: Box<TypeSpec>,
    },
    Tuple(Vec<TypeSpec>),
    Void,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Lte => "<=",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Stable mangled name used in lowered operator function names.
    pub fn mangled(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Eq => "eq",
            BinaryOp::Neq => "neq",
            BinaryOp::Lt => "lt",
            BinaryOp::Gt => "gt",
            BinaryOp::Lte => "lte",
            BinaryOp::Gte => "gte",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte
        )
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Neq)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A typed parameter `T name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeSpec,
    pub name: Ident,
    pub span: Span,
}

// ---------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpPart {
    Text(String),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Identifier(String),
    ProcIdentifier(String),
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    BoolLiteral(bool),
    SelfRef,
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        member: String,
    },
    Tuple(Vec<Expr>),
    /// `new T(args)`; the identifier-call form `T(args)` stays a `Call`
    /// and is resolved to a constructor during type analysis.
    ConstructorCall {
        class: Ident,
        args: Vec<Expr>,
    },
    Cast {
        operand: Box<Expr>,
        target: TypeSpec,
    },
    TypeTest {
        operand: Box<Expr>,
        target: TypeSpec,
    },
    Assignment {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: LambdaBody,
    },
    /// `new T[size]`.
    ArrayAlloc {
        elem: TypeSpec,
        size: Box<Expr>,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayLiteral(Vec<Expr>),
    Interpolation(Vec<InterpPart>),
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarBinding {
    pub name: Ident,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub is_final: bool,
    pub ty: Option<TypeSpec>,
    pub bindings: Vec<VarBinding>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_branch: Block,
    pub else_branch: Option<Box<Stmt>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Block),
    VarDecl(VarDecl),
    If(IfStmt),
    While(WhileStmt),
    Return(ReturnStmt),
    Expr(Expr),
}

// ---------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub vis: Visibility,
    pub is_static: bool,
    pub ty: Option<TypeSpec>,
    pub name: Ident,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub vis: Visibility,
    pub is_static: bool,
    pub name: Ident,
    pub params: Vec<Param>,
    pub return_type: TypeSpec,
    pub body: Block,
    pub span: Span,
}

/// Same shape as a function; the name carries the `$` sigil.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDecl {
    pub vis: Visibility,
    pub is_static: bool,
    pub name: Ident,
    pub params: Vec<Param>,
    pub return_type: TypeSpec,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub vis: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub ty: Option<TypeSpec>,
    pub name: Ident,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDecl {
    pub vis: Visibility,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDecl {
    pub vis: Visibility,
    pub op: BinaryOp,
    pub param: Param,
    pub return_type: TypeSpec,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Field(FieldDecl),
    Constructor(ConstructorDecl),
    Operator(OperatorDecl),
    Method(FunctionDecl),
    ProcMethod(ProcedureDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Const(ConstDecl),
    Function(FunctionDecl),
    Procedure(ProcedureDecl),
    Class(ClassDecl),
}

/// Parsed compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub imports: Vec<ImportDecl>,
    pub declarations: Vec<Declaration>,
}

// ---------------------------------------------------------------------
// Visitor
// ---------------------------------------------------------------------

/// Pre-order traversal over the tree.
///
/// Implementors override the hooks they care about and call the
/// matching `walk_*` function to descend. Nothing here requires
/// dynamic dispatch; the trait is a convenience for phases that visit
/// most of the tree (name analysis does).
pub trait AstVisitor {
    fn visit_program(&mut self, program: &Program) {
        walk_program(self, program);
    }
    fn visit_declaration(&mut self, decl: &Declaration) {
        walk_declaration(self, decl);
    }
    fn visit_class_member(&mut self, member: &ClassMember) {
        walk_class_member(self, member);
    }
    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_program<V: AstVisitor + ?Sized>(v: &mut V, program: &Program) {
    for decl in &program.declarations {
        v.visit_declaration(decl);
    }
}

pub fn walk_declaration<V: AstVisitor + ?Sized>(v: &mut V, decl: &Declaration) {
    match decl {
        Declaration::Const(c) => v.visit_expr(&c.value),
        Declaration::Function(f) => v.visit_block(&f.body),
        Declaration::Procedure(p) => v.visit_block(&p.body),
        Declaration::Class(c) => {
            for member in &c.members {
                v.visit_class_member(member);
            }
        }
    }
}

pub fn walk_class_member<V: AstVisitor + ?Sized>(v: &mut V, member: &ClassMember) {
    match member {
        ClassMember::Field(f) => {
            if let Some(init) = &f.init {
                v.visit_expr(init);
            }
        }
        ClassMember::Constructor(c) => v.visit_block(&c.body),
        ClassMember::Operator(o) => v.visit_block(&o.body),
        ClassMember::Method(m) => v.visit_block(&m.body),
        ClassMember::ProcMethod(m) => v.visit_block(&m.body),
    }
}

pub fn walk_block<V: AstVisitor + ?Sized>(v: &mut V, block: &Block) {
    for stmt in &block.statements {
        v.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: AstVisitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Block(b) => v.visit_block(b),
        Stmt::VarDecl(d) => {
            for binding in &d.bindings {
                if let Some(init) = &binding.init {
                    v.visit_expr(init);
                }
            }
        }
        Stmt::If(i) => {
            v.visit_expr(&i.condition);
            v.visit_block(&i.then_branch);
            if let Some(e) = &i.else_branch {
                v.visit_stmt(e);
            }
        }
        Stmt::While(w) => {
            v.visit_expr(&w.condition);
            v.visit_block(&w.body);
        }
        Stmt::Return(r) => {
            if let Some(value) = &r.value {
                v.visit_expr(value);
            }
        }
        Stmt::Expr(e) => v.visit_expr(e),
    }
}

pub fn walk_expr<V: AstVisitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Identifier(_)
        | ExprKind::ProcIdentifier(_)
        | ExprKind::IntLiteral(_)
        | ExprKind::FloatLiteral(_)
        | ExprKind::StringLiteral(_)
        | ExprKind::BoolLiteral(_)
        | ExprKind::SelfRef => {}
        ExprKind::Binary { lhs, rhs, .. } => {
            v.visit_expr(lhs);
            v.visit_expr(rhs);
        }
        ExprKind::Unary { operand, .. } => v.visit_expr(operand),
        ExprKind::Call { callee, args } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Member { object, .. } => v.visit_expr(object),
        ExprKind::Tuple(items) => {
            for item in items {
                v.visit_expr(item);
            }
        }
        ExprKind::ConstructorCall { args, .. } => {
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Cast { operand, .. } => v.visit_expr(operand),
        ExprKind::TypeTest { operand, .. } => v.visit_expr(operand),
        ExprKind::Assignment { target, value } => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        ExprKind::Lambda { body, .. } => match body {
            LambdaBody::Expr(e) => v.visit_expr(e),
            LambdaBody::Block(b) => v.visit_block(b),
        },
        ExprKind::ArrayAlloc { size, .. } => v.visit_expr(size),
        ExprKind::Index { array, index } => {
            v.visit_expr(array);
            v.visit_expr(index);
        }
        ExprKind::ArrayLiteral(items) => {
            for item in items {
                v.visit_expr(item);
            }
        }
        ExprKind::Interpolation(parts) => {
            for part in parts {
                if let InterpPart::Expr(e) = part {
                    v.visit_expr(e);
                }
            }
        }
    }
}
