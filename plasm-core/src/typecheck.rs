//! Type analysis.
//!
//! Computes a `TypeId` for every expression and records it in a
//! side-table keyed by `NodeId`; the IR builder reads types exclusively
//! from that table. Class signatures (fields, methods, operator
//! overloads, constructors) and top-level function signatures are
//! hoisted before any body is checked, so declaration order never
//! matters.
//!
//! Each declaration is analysed in isolation: an internal failure is
//! recorded as a `Type analysis error: ...` diagnostic on that
//! declaration and the walk continues with the next one.

use std::collections::BTreeMap;
use std::panic;

use crate::ast::*;
use crate::diagnostic::{Diagnostic, Phase};
use crate::span::Span;
use crate::symbol::SymbolKind;
use crate::types::{is_compatible_with, TypeCtx, TypeId, TypeKind};

/// Side-table mapping expression identity to its computed type.
#[derive(Debug, Default)]
pub struct TypeTable {
    map: BTreeMap<NodeId, TypeId>,
}

impl TypeTable {
    pub fn insert(&mut self, id: NodeId, ty: TypeId) {
        self.map.insert(id, ty);
    }

    pub fn get(&self, id: NodeId) -> Option<TypeId> {
        self.map.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeId,
    pub is_final: bool,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Function type of the method, without the implicit `self`.
    pub ty: TypeId,
    pub is_proc: bool,
}

#[derive(Debug, Clone)]
pub struct OperatorInfo {
    pub param: TypeId,
    pub result: TypeId,
}

#[derive(Debug, Clone)]
pub struct ConstructorInfo {
    pub params: Vec<TypeId>,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub ty: TypeId,
    pub fields: Vec<FieldInfo>,
    pub methods: BTreeMap<String, MethodInfo>,
    pub operators: BTreeMap<BinaryOp, OperatorInfo>,
    pub constructors: Vec<ConstructorInfo>,
}

impl ClassInfo {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug)]
pub struct TypeCheckResult {
    pub table: TypeTable,
    pub types: TypeCtx,
    pub classes: BTreeMap<String, ClassInfo>,
    /// Top-level function and procedure signatures by name.
    pub functions: BTreeMap<String, TypeId>,
    /// Top-level constant types by name.
    pub globals: BTreeMap<String, TypeId>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn typecheck(program: &Program) -> TypeCheckResult {
    let mut checker = Checker {
        ctx: TypeCtx::new(),
        table: TypeTable::default(),
        classes: BTreeMap::new(),
        functions: BTreeMap::new(),
        globals: BTreeMap::new(),
        diagnostics: Vec::new(),
        env: vec![BTreeMap::new()],
        current_class: None,
        return_ctx: Vec::new(),
    };
    checker.run(program);
    TypeCheckResult {
        table: checker.table,
        types: checker.ctx,
        classes: checker.classes,
        functions: checker.functions,
        globals: checker.globals,
        diagnostics: checker.diagnostics,
    }
}

fn is_external(name: &str) -> bool {
    name.starts_with("__external_") || name.starts_with("$__external_")
}

#[derive(Debug, Clone)]
struct Binding {
    ty: TypeId,
    kind: SymbolKind,
}

/// Expected return type of the function being checked; lambdas with a
/// block body infer theirs from the first `return`.
#[derive(Debug, Clone)]
enum ReturnCtx {
    Declared(TypeId),
    Infer(Option<TypeId>),
}

struct Checker {
    ctx: TypeCtx,
    table: TypeTable,
    classes: BTreeMap<String, ClassInfo>,
    functions: BTreeMap<String, TypeId>,
    globals: BTreeMap<String, TypeId>,
    diagnostics: Vec<Diagnostic>,
    env: Vec<BTreeMap<String, Binding>>,
    current_class: Option<String>,
    return_ctx: Vec<ReturnCtx>,
}

impl Checker {
    fn run(&mut self, program: &Program) {
        // 1. class shells, so class names resolve in any signature
        for decl in &program.declarations {
            if let Declaration::Class(c) = decl {
                self.check_isolated(c.span, |ck| ck.register_class_shell(c));
            }
        }

        // 2. class signatures
        for decl in &program.declarations {
            if let Declaration::Class(c) = decl {
                self.check_isolated(c.span, |ck| ck.collect_class_signature(c));
            }
        }

        // 3. constants
        for decl in &program.declarations {
            if let Declaration::Const(c) = decl {
                self.check_isolated(c.span, |ck| ck.check_const(c));
            }
        }

        // 4. top-level function/procedure signatures
        for decl in &program.declarations {
            match decl {
                Declaration::Function(f) => self.check_isolated(f.span, |ck| {
                    ck.hoist_function(&f.name, &f.params, &f.return_type)
                }),
                Declaration::Procedure(p) => self.check_isolated(p.span, |ck| {
                    ck.hoist_function(&p.name, &p.params, &p.return_type)
                }),
                _ => {}
            }
        }

        // 5. field initialisers (may reference constants and classes)
        for decl in &program.declarations {
            if let Declaration::Class(c) = decl {
                self.check_isolated(c.span, |ck| ck.check_field_inits(c));
            }
        }

        // 6. bodies
        for decl in &program.declarations {
            match decl {
                Declaration::Function(f) => {
                    self.check_isolated(f.span, |ck| ck.check_function_body(f, None))
                }
                Declaration::Procedure(p) => {
                    self.check_isolated(p.span, |ck| ck.check_procedure_body(p, None))
                }
                Declaration::Class(c) => {
                    self.check_isolated(c.span, |ck| ck.check_class_bodies(c))
                }
                Declaration::Const(_) => {}
            }
        }
    }

    /// Run one declaration's worth of analysis, degrading an internal
    /// failure to a diagnostic so the remaining declarations are still
    /// checked.
    fn check_isolated(&mut self, span: Span, check: impl FnOnce(&mut Self)) {
        let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| check(self)));
        if let Err(payload) = outcome {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unexpected failure".to_string());
            // The failed check may have left per-body state half-open.
            self.env.truncate(1);
            self.return_ctx.clear();
            self.current_class = None;
            self.diagnostics.push(Diagnostic::error(
                Phase::Type,
                format!("Type analysis error: {detail}"),
                span,
            ));
        }
    }

    fn register_class_shell(&mut self, class: &ClassDecl) {
        let ty = self.ctx.class(class.name.name.clone());
        self.classes
            .entry(class.name.name.clone())
            .or_insert(ClassInfo {
                name: class.name.name.clone(),
                ty,
                fields: Vec::new(),
                methods: BTreeMap::new(),
                operators: BTreeMap::new(),
                constructors: Vec::new(),
            });
        self.bind_global(
            class.name.name.clone(),
            Binding {
                ty,
                kind: SymbolKind::Class,
            },
        );
    }

    // -- environment --------------------------------------------------

    fn bind_global(&mut self, name: String, binding: Binding) {
        self.env[0].insert(name, binding);
    }

    fn bind(&mut self, name: String, binding: Binding) {
        self.env
            .last_mut()
            .expect("env is never empty")
            .insert(name, binding);
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.env.iter().rev().find_map(|scope| scope.get(name))
    }

    fn push_scope(&mut self) {
        self.env.push(BTreeMap::new());
    }

    fn pop_scope(&mut self) {
        self.env.pop();
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics
            .push(Diagnostic::error(Phase::Type, message, span));
    }

    // -- signature collection -----------------------------------------

    fn resolve_type_spec(&mut self, spec: &TypeSpec) -> TypeId {
        match &spec.kind {
            TypeSpecKind::Prim(p) => self.ctx.prim(*p),
            TypeSpecKind::Void => self.ctx.void(),
            TypeSpecKind::Any => self.ctx.any(),
            TypeSpecKind::Named(name) => {
                if let Some(info) = self.classes.get(name) {
                    info.ty
                } else {
                    self.error(format!("unknown type: {name}"), spec.span);
                    self.ctx.any()
                }
            }
            TypeSpecKind::Generic { name, args } => {
                let args: Vec<TypeId> = args.iter().map(|a| self.resolve_type_spec(a)).collect();
                match name.as_str() {
                    "array" if args.len() == 1 => self.ctx.array(args[0]),
                    "tuple" => self.ctx.generic("tuple", args),
                    _ => {
                        self.error(format!("unknown generic type: {name}"), spec.span);
                        self.ctx.any()
                    }
                }
            }
            TypeSpecKind::Function { params, result } => {
                let params: Vec<TypeId> =
                    params.iter().map(|p| self.resolve_type_spec(p)).collect();
                let result = self.resolve_type_spec(result);
                self.ctx.function(params, result)
            }
            TypeSpecKind::Tuple(items) => {
                let args: Vec<TypeId> = items.iter().map(|i| self.resolve_type_spec(i)).collect();
                self.ctx.generic("tuple", args)
            }
        }
    }

    fn collect_class_signature(&mut self, class: &ClassDecl) {
        let mut fields = Vec::new();
        let mut methods = BTreeMap::new();
        let mut operators = BTreeMap::new();
        let mut constructors = Vec::new();
        for member in &class.members {
            match member {
                ClassMember::Field(f) => {
                    let ty = match &f.ty {
                        Some(spec) => self.resolve_type_spec(spec),
                        // Untyped `let` fields get their type from the
                        // initialiser in `check_field_inits`.
                        None => self.ctx.any(),
                    };
                    fields.push(FieldInfo {
                        name: f.name.name.clone(),
                        ty,
                        is_final: f.is_final,
                    });
                }
                ClassMember::Method(m) => {
                    let params: Vec<TypeId> =
                        m.params.iter().map(|p| self.resolve_type_spec(&p.ty)).collect();
                    let result = self.resolve_type_spec(&m.return_type);
                    let ty = self.ctx.function(params, result);
                    methods.insert(m.name.name.clone(), MethodInfo { ty, is_proc: false });
                }
                ClassMember::ProcMethod(m) => {
                    let params: Vec<TypeId> =
                        m.params.iter().map(|p| self.resolve_type_spec(&p.ty)).collect();
                    let result = self.resolve_type_spec(&m.return_type);
                    let ty = self.ctx.function(params, result);
                    methods.insert(m.name.name.clone(), MethodInfo { ty, is_proc: true });
                }
                ClassMember::Operator(o) => {
                    let param = self.resolve_type_spec(&o.param.ty);
                    let result = self.resolve_type_spec(&o.return_type);
                    operators.insert(o.op, OperatorInfo { param, result });
                }
                ClassMember::Constructor(c) => {
                    let params: Vec<TypeId> =
                        c.params.iter().map(|p| self.resolve_type_spec(&p.ty)).collect();
                    constructors.push(ConstructorInfo { params });
                }
            }
        }
        if let Some(info) = self.classes.get_mut(&class.name.name) {
            info.fields = fields;
            info.methods = methods;
            info.operators = operators;
            info.constructors = constructors;
        }
    }

    fn check_field_inits(&mut self, class: &ClassDecl) {
        for member in &class.members {
            if let ClassMember::Field(f) = member {
                let init_ty = f.init.as_ref().map(|init| self.check_expr(init));
                let declared = f.ty.as_ref().map(|spec| self.resolve_type_spec(spec));
                match (declared, init_ty, &f.init) {
                    (Some(decl), Some(init), Some(init_expr)) => {
                        if self.apply_literal_binding(init_expr, decl) {
                            // literal adopted the declared type
                        } else if !is_compatible_with(&self.ctx, init, decl) {
                            self.error(
                                format!(
                                    "cannot assign value of type {} to field of type {}",
                                    self.ctx.display(init),
                                    self.ctx.display(decl)
                                ),
                                f.span,
                            );
                        }
                    }
                    (None, Some(init), _) => {
                        if let Some(info) = self.classes.get_mut(&class.name.name) {
                            if let Some(field) =
                                info.fields.iter_mut().find(|x| x.name == f.name.name)
                            {
                                field.ty = init;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn hoist_function(&mut self, name: &Ident, params: &[Param], return_type: &TypeSpec) {
        let param_tys: Vec<TypeId> =
            params.iter().map(|p| self.resolve_type_spec(&p.ty)).collect();
        let result = self.resolve_type_spec(return_type);
        let ty = self.ctx.function(param_tys, result);
        let kind = if name.name.starts_with('$') {
            SymbolKind::Procedure
        } else {
            SymbolKind::Function
        };
        self.functions.insert(name.name.clone(), ty);
        self.bind_global(name.name.clone(), Binding { ty, kind });
    }

    fn check_const(&mut self, decl: &ConstDecl) {
        let init_ty = self.check_expr(&decl.value);
        let declared = decl.ty.as_ref().map(|spec| self.resolve_type_spec(spec));
        let ty = match declared {
            Some(decl_ty) => {
                if self.apply_literal_binding(&decl.value, decl_ty) {
                    decl_ty
                } else if !is_compatible_with(&self.ctx, init_ty, decl_ty) {
                    self.error(
                        format!(
                            "cannot assign value of type {} to constant of type {}",
                            self.ctx.display(init_ty),
                            self.ctx.display(decl_ty)
                        ),
                        decl.span,
                    );
                    decl_ty
                } else {
                    decl_ty
                }
            }
            None => init_ty,
        };
        self.globals.insert(decl.name.name.clone(), ty);
        self.bind_global(
            decl.name.name.clone(),
            Binding {
                ty,
                kind: SymbolKind::Constant,
            },
        );
    }

    /// The literal widening rule: an integer-literal initialiser whose
    /// declared target type is an integer adopts the target type.
    /// Returns true if the rule applied (and re-records the literal).
    fn apply_literal_binding(&mut self, init: &Expr, declared: TypeId) -> bool {
        if !matches!(init.kind, ExprKind::IntLiteral(_)) {
            return false;
        }
        match self.ctx.as_prim(declared) {
            Some(p) if p.is_integer() => {
                self.table.insert(init.id, declared);
                true
            }
            _ => false,
        }
    }

    // -- bodies -------------------------------------------------------

    fn check_function_body(&mut self, f: &FunctionDecl, class: Option<&str>) {
        let result = self.resolve_type_spec(&f.return_type);
        self.push_scope();
        if let Some(class_name) = class {
            self.bind_class_scope(class_name);
        }
        for param in &f.params {
            let ty = self.resolve_type_spec(&param.ty);
            self.bind(
                param.name.name.clone(),
                Binding {
                    ty,
                    kind: SymbolKind::Parameter,
                },
            );
        }
        self.return_ctx.push(ReturnCtx::Declared(result));
        self.check_block(&f.body);
        self.return_ctx.pop();
        self.pop_scope();
    }

    fn check_procedure_body(&mut self, p: &ProcedureDecl, class: Option<&str>) {
        let result = self.resolve_type_spec(&p.return_type);
        self.push_scope();
        if let Some(class_name) = class {
            self.bind_class_scope(class_name);
        }
        for param in &p.params {
            let ty = self.resolve_type_spec(&param.ty);
            self.bind(
                param.name.name.clone(),
                Binding {
                    ty,
                    kind: SymbolKind::Parameter,
                },
            );
        }
        self.return_ctx.push(ReturnCtx::Declared(result));
        self.check_block(&p.body);
        self.return_ctx.pop();
        self.pop_scope();
    }

    /// Make the class's fields and methods visible as bare names.
    fn bind_class_scope(&mut self, class_name: &str) {
        let info = match self.classes.get(class_name) {
            Some(info) => info.clone(),
            None => return,
        };
        for field in &info.fields {
            self.bind(
                field.name.clone(),
                Binding {
                    ty: field.ty,
                    kind: SymbolKind::Field,
                },
            );
        }
        for (name, method) in &info.methods {
            let kind = if method.is_proc {
                SymbolKind::Procedure
            } else {
                SymbolKind::Function
            };
            self.bind(name.clone(), Binding { ty: method.ty, kind });
        }
    }

    fn check_class_bodies(&mut self, class: &ClassDecl) {
        self.current_class = Some(class.name.name.clone());
        for member in &class.members {
            match member {
                ClassMember::Method(m) => self.check_function_body(m, Some(&class.name.name)),
                ClassMember::ProcMethod(m) => {
                    self.check_procedure_body(m, Some(&class.name.name))
                }
                ClassMember::Constructor(c) => {
                    self.push_scope();
                    self.bind_class_scope(&class.name.name);
                    for param in &c.params {
                        let ty = self.resolve_type_spec(&param.ty);
                        self.bind(
                            param.name.name.clone(),
                            Binding {
                                ty,
                                kind: SymbolKind::Parameter,
                            },
                        );
                    }
                    let void = self.ctx.void();
                    self.return_ctx.push(ReturnCtx::Declared(void));
                    self.check_block(&c.body);
                    self.return_ctx.pop();
                    self.pop_scope();
                }
                ClassMember::Operator(o) => {
                    let result = self.resolve_type_spec(&o.return_type);
                    self.push_scope();
                    self.bind_class_scope(&class.name.name);
                    let ty = self.resolve_type_spec(&o.param.ty);
                    self.bind(
                        o.param.name.name.clone(),
                        Binding {
                            ty,
                            kind: SymbolKind::Parameter,
                        },
                    );
                    self.return_ctx.push(ReturnCtx::Declared(result));
                    self.check_block(&o.body);
                    self.return_ctx.pop();
                    self.pop_scope();
                }
                ClassMember::Field(_) => {}
            }
        }
        self.current_class = None;
    }

    fn check_block(&mut self, block: &Block) {
        self.push_scope();
        for stmt in &block.statements {
            self.check_stmt(stmt);
        }
        self.pop_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(b) => self.check_block(b),
            Stmt::VarDecl(decl) => self.check_var_decl(decl),
            Stmt::If(i) => {
                let cond = self.check_expr(&i.condition);
                let bool_ty = self.ctx.bool();
                if !is_compatible_with(&self.ctx, cond, bool_ty) {
                    self.error(
                        format!(
                            "condition must be of type bool, found {}",
                            self.ctx.display(cond)
                        ),
                        i.condition.span,
                    );
                }
                self.check_block(&i.then_branch);
                if let Some(else_branch) = &i.else_branch {
                    self.check_stmt(else_branch);
                }
            }
            Stmt::While(w) => {
                let cond = self.check_expr(&w.condition);
                let bool_ty = self.ctx.bool();
                if !is_compatible_with(&self.ctx, cond, bool_ty) {
                    self.error(
                        format!(
                            "condition must be of type bool, found {}",
                            self.ctx.display(cond)
                        ),
                        w.condition.span,
                    );
                }
                self.check_block(&w.body);
            }
            Stmt::Return(r) => self.check_return(r),
            Stmt::Expr(e) => {
                self.check_expr(e);
            }
        }
    }

    fn check_return(&mut self, ret: &ReturnStmt) {
        let value_ty = ret.value.as_ref().map(|value| self.check_expr(value));
        let ctx_top = match self.return_ctx.last().cloned() {
            Some(top) => top,
            None => return,
        };
        match ctx_top {
            ReturnCtx::Declared(expected) => match value_ty {
                Some(found) => {
                    if !is_compatible_with(&self.ctx, found, expected) {
                        self.error(
                            format!(
                                "return type mismatch: expected {}, found {}",
                                self.ctx.display(expected),
                                self.ctx.display(found)
                            ),
                            ret.span,
                        );
                    }
                }
                None => {
                    if !self.ctx.is_void(expected) {
                        self.error(
                            format!(
                                "return type mismatch: expected {}, found no value",
                                self.ctx.display(expected)
                            ),
                            ret.span,
                        );
                    }
                }
            },
            ReturnCtx::Infer(slot) => {
                let found = value_ty.unwrap_or_else(|| self.ctx.void());
                match slot {
                    None => {
                        if let Some(ReturnCtx::Infer(slot)) = self.return_ctx.last_mut() {
                            *slot = Some(found);
                        }
                    }
                    Some(first) => {
                        if !is_compatible_with(&self.ctx, found, first) {
                            self.error(
                                format!(
                                    "return type mismatch: expected {}, found {}",
                                    self.ctx.display(first),
                                    self.ctx.display(found)
                                ),
                                ret.span,
                            );
                        }
                    }
                }
            }
        }
    }

    fn check_var_decl(&mut self, decl: &VarDecl) {
        let declared = decl.ty.as_ref().map(|spec| self.resolve_type_spec(spec));
        for binding in &decl.bindings {
            let init_ty = binding.init.as_ref().map(|init| self.check_expr(init));
            let ty = match (declared, init_ty) {
                (Some(decl_ty), Some(init)) => {
                    let init_expr = binding.init.as_ref().expect("checked above");
                    if self.apply_literal_binding(init_expr, decl_ty) {
                        decl_ty
                    } else if !is_compatible_with(&self.ctx, init, decl_ty) {
                        self.error(
                            format!(
                                "cannot assign value of type {} to variable of type {}",
                                self.ctx.display(init),
                                self.ctx.display(decl_ty)
                            ),
                            binding.name.span,
                        );
                        decl_ty
                    } else {
                        decl_ty
                    }
                }
                (Some(decl_ty), None) => decl_ty,
                (None, Some(init)) => init,
                // No declared type and no initialiser: default integer.
                (None, None) => self.ctx.i64(),
            };
            self.bind(
                binding.name.name.clone(),
                Binding {
                    ty,
                    kind: SymbolKind::Variable,
                },
            );
        }
    }

    // -- expressions --------------------------------------------------

    fn check_expr(&mut self, expr: &Expr) -> TypeId {
        let ty = self.check_expr_inner(expr);
        self.table.insert(expr.id, ty);
        ty
    }

    fn check_expr_inner(&mut self, expr: &Expr) -> TypeId {
        match &expr.kind {
            ExprKind::IntLiteral(_) => self.ctx.i64(),
            ExprKind::FloatLiteral(_) => self.ctx.f64(),
            ExprKind::StringLiteral(_) => self.ctx.string(),
            ExprKind::BoolLiteral(_) => self.ctx.bool(),
            ExprKind::Identifier(name) | ExprKind::ProcIdentifier(name) => {
                if let Some(binding) = self.lookup(name) {
                    binding.ty
                } else if is_external(name) {
                    self.ctx.any()
                } else {
                    // Name analysis already reported the missing
                    // symbol; `any` avoids cascading errors.
                    self.ctx.any()
                }
            }
            ExprKind::SelfRef => match self.current_class.clone() {
                Some(class) => self
                    .classes
                    .get(&class)
                    .map(|info| info.ty)
                    .unwrap_or_else(|| self.ctx.any()),
                None => {
                    self.error("`self` used outside of a class", expr.span);
                    self.ctx.any()
                }
            },
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(expr, *op, lhs, rhs),
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.check_expr(operand);
                match op {
                    UnaryOp::Neg => {
                        if !self.ctx.is_numeric(operand_ty) && !self.ctx.is_any(operand_ty) {
                            self.error(
                                format!(
                                    "unary `-` requires a numeric operand, found {}",
                                    self.ctx.display(operand_ty)
                                ),
                                expr.span,
                            );
                        }
                        operand_ty
                    }
                    UnaryOp::Not => {
                        let bool_ty = self.ctx.bool();
                        if !is_compatible_with(&self.ctx, operand_ty, bool_ty) {
                            self.error(
                                format!(
                                    "unary `!` requires a bool operand, found {}",
                                    self.ctx.display(operand_ty)
                                ),
                                expr.span,
                            );
                        }
                        bool_ty
                    }
                }
            }
            ExprKind::Cast { operand, target } => {
                self.check_expr(operand);
                self.resolve_type_spec(target)
            }
            ExprKind::TypeTest { operand, target } => {
                self.check_expr(operand);
                self.resolve_type_spec(target);
                self.ctx.bool()
            }
            ExprKind::Call { callee, args } => self.check_call(expr, callee, args),
            ExprKind::ConstructorCall { class, args } => {
                let arg_tys: Vec<TypeId> = args.iter().map(|a| self.check_expr(a)).collect();
                self.resolve_constructor(&class.name, &arg_tys, expr.span)
            }
            ExprKind::Member { object, member } => {
                let object_ty = self.check_expr(object);
                self.member_type(object_ty, member, expr.span)
            }
            ExprKind::Tuple(items) => {
                let tys: Vec<TypeId> = items.iter().map(|i| self.check_expr(i)).collect();
                self.ctx.generic("tuple", tys)
            }
            ExprKind::Assignment { target, value } => {
                let target_ty = self.check_expr(target);
                let value_ty = self.check_expr(value);
                if !is_compatible_with(&self.ctx, value_ty, target_ty) {
                    self.error(
                        format!(
                            "cannot assign value of type {} to target of type {}",
                            self.ctx.display(value_ty),
                            self.ctx.display(target_ty)
                        ),
                        expr.span,
                    );
                }
                value_ty
            }
            ExprKind::Lambda { params, body } => self.check_lambda(params, body),
            ExprKind::ArrayAlloc { elem, size } => {
                let size_ty = self.check_expr(size);
                let integral = self
                    .ctx
                    .as_prim(size_ty)
                    .map(|p| p.is_integer())
                    .unwrap_or(false)
                    || self.ctx.is_any(size_ty);
                if !integral {
                    self.error(
                        format!(
                            "array size must be an integer, found {}",
                            self.ctx.display(size_ty)
                        ),
                        size.span,
                    );
                }
                let elem_ty = self.resolve_type_spec(elem);
                self.ctx.array(elem_ty)
            }
            ExprKind::Index { array, index } => {
                let array_ty = self.check_expr(array);
                let index_ty = self.check_expr(index);
                let integral = self
                    .ctx
                    .as_prim(index_ty)
                    .map(|p| p.is_integer())
                    .unwrap_or(false)
                    || self.ctx.is_any(index_ty);
                if !integral {
                    self.error(
                        format!(
                            "array index must be an integer, found {}",
                            self.ctx.display(index_ty)
                        ),
                        index.span,
                    );
                }
                match self.ctx.get(array_ty) {
                    TypeKind::Generic { name, args } if name == "array" && args.len() == 1 => {
                        args[0]
                    }
                    TypeKind::Any => self.ctx.any(),
                    _ => {
                        self.error(
                            format!(
                                "indexing requires an array, found {}",
                                self.ctx.display(array_ty)
                            ),
                            array.span,
                        );
                        self.ctx.any()
                    }
                }
            }
            ExprKind::ArrayLiteral(items) => {
                if items.is_empty() {
                    let any = self.ctx.any();
                    return self.ctx.array(any);
                }
                let first = self.check_expr(&items[0]);
                for item in &items[1..] {
                    let ty = self.check_expr(item);
                    if !is_compatible_with(&self.ctx, ty, first) {
                        self.error(
                            format!(
                                "array element type mismatch: expected {}, found {}",
                                self.ctx.display(first),
                                self.ctx.display(ty)
                            ),
                            item.span,
                        );
                    }
                }
                self.ctx.array(first)
            }
            ExprKind::Interpolation(parts) => {
                for part in parts {
                    if let InterpPart::Expr(e) = part {
                        let ty = self.check_expr(e);
                        let ok = self.ctx.as_prim(ty).is_some() || self.ctx.is_any(ty);
                        if !ok {
                            self.error(
                                format!(
                                    "cannot interpolate value of type {}",
                                    self.ctx.display(ty)
                                ),
                                e.span,
                            );
                        }
                    }
                }
                self.ctx.string()
            }
        }
    }

    fn check_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> TypeId {
        let lhs_ty = self.check_expr(lhs);
        let rhs_ty = self.check_expr(rhs);
        let bool_ty = self.ctx.bool();

        // Operator overloads dispatch on the left operand's class.
        if let TypeKind::Class(class_name) = self.ctx.get(lhs_ty) {
            if let Some(overload) = self
                .classes
                .get(&class_name)
                .and_then(|info| info.operators.get(&op))
                .cloned()
            {
                if !is_compatible_with(&self.ctx, rhs_ty, overload.param) {
                    self.error(
                        format!(
                            "operator `{}` of class {} expects {}, found {}",
                            op.symbol(),
                            class_name,
                            self.ctx.display(overload.param),
                            self.ctx.display(rhs_ty)
                        ),
                        rhs.span,
                    );
                }
                return overload.result;
            }
            if op.is_equality() {
                return bool_ty;
            }
            self.error(
                format!(
                    "operator `{}` is not defined for type {}",
                    op.symbol(),
                    class_name
                ),
                expr.span,
            );
            return if op.is_arithmetic() { lhs_ty } else { bool_ty };
        }

        if op.is_logical() {
            for (side, ty) in [(lhs, lhs_ty), (rhs, rhs_ty)] {
                if !is_compatible_with(&self.ctx, ty, bool_ty) {
                    self.error(
                        format!(
                            "operator `{}` requires bool operands, found {}",
                            op.symbol(),
                            self.ctx.display(ty)
                        ),
                        side.span,
                    );
                }
            }
            return bool_ty;
        }

        if op.is_equality() {
            return bool_ty;
        }

        // Arithmetic and comparisons need numeric operands.
        for (side, ty) in [(lhs, lhs_ty), (rhs, rhs_ty)] {
            if !self.ctx.is_numeric(ty) && !self.ctx.is_any(ty) {
                self.error(
                    format!(
                        "operator `{}` requires numeric operands, found {}",
                        op.symbol(),
                        self.ctx.display(ty)
                    ),
                    side.span,
                );
            }
        }
        if op.is_comparison() {
            bool_ty
        } else {
            lhs_ty
        }
    }

    fn check_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) -> TypeId {
        let arg_tys: Vec<TypeId> = args.iter().map(|a| self.check_expr(a)).collect();

        match &callee.kind {
            ExprKind::Identifier(name) | ExprKind::ProcIdentifier(name) => {
                if let Some(binding) = self.lookup(name).cloned() {
                    self.table.insert(callee.id, binding.ty);
                    match binding.kind {
                        SymbolKind::Class => {
                            return self.resolve_constructor(name, &arg_tys, expr.span);
                        }
                        _ => {
                            if let TypeKind::Function { params, result } =
                                self.ctx.get(binding.ty)
                            {
                                self.check_call_args(name, &params, &arg_tys, args, expr.span);
                                return result;
                            }
                            if self.ctx.is_any(binding.ty) {
                                return self.ctx.any();
                            }
                            self.error(
                                format!(
                                    "{name} is not callable (type {})",
                                    self.ctx.display(binding.ty)
                                ),
                                expr.span,
                            );
                            return self.ctx.void();
                        }
                    }
                }
                if is_external(name) {
                    self.table.insert(callee.id, self.ctx.any());
                    return self.ctx.any();
                }
                self.table.insert(callee.id, self.ctx.any());
                self.ctx.void()
            }
            ExprKind::Member { object, member } => {
                let object_ty = self.check_expr(object);
                self.table.insert(callee.id, object_ty);
                if let TypeKind::Class(class_name) = self.ctx.get(object_ty) {
                    if let Some(method) = self
                        .classes
                        .get(&class_name)
                        .and_then(|info| info.methods.get(member))
                        .cloned()
                    {
                        self.table.insert(callee.id, method.ty);
                        if let TypeKind::Function { params, result } = self.ctx.get(method.ty) {
                            self.check_call_args(member, &params, &arg_tys, args, expr.span);
                            return result;
                        }
                    }
                    self.error(
                        format!("unknown method {member} on class {class_name}"),
                        expr.span,
                    );
                    return self.ctx.void();
                }
                if self.ctx.is_any(object_ty) {
                    return self.ctx.any();
                }
                self.error(
                    format!(
                        "method calls require a class value, found {}",
                        self.ctx.display(object_ty)
                    ),
                    expr.span,
                );
                self.ctx.void()
            }
            _ => {
                let callee_ty = self.check_expr(callee);
                if let TypeKind::Function { params, result } = self.ctx.get(callee_ty) {
                    self.check_call_args("function value", &params, &arg_tys, args, expr.span);
                    return result;
                }
                if self.ctx.is_any(callee_ty) {
                    return self.ctx.any();
                }
                self.error(
                    format!(
                        "call target is not a function (type {})",
                        self.ctx.display(callee_ty)
                    ),
                    expr.span,
                );
                self.ctx.void()
            }
        }
    }

    fn check_call_args(
        &mut self,
        what: &str,
        params: &[TypeId],
        arg_tys: &[TypeId],
        args: &[Expr],
        span: Span,
    ) {
        if params.len() != arg_tys.len() {
            self.error(
                format!(
                    "argument count mismatch for {what}: expected {}, found {}",
                    params.len(),
                    arg_tys.len()
                ),
                span,
            );
            return;
        }
        for (i, (param, arg)) in params.iter().zip(arg_tys.iter()).enumerate() {
            if !is_compatible_with(&self.ctx, *arg, *param) {
                let arg_span = args.get(i).map(|a| a.span).unwrap_or(span);
                self.error(
                    format!(
                        "argument type mismatch for {what}: expected {}, found {}",
                        self.ctx.display(*param),
                        self.ctx.display(*arg)
                    ),
                    arg_span,
                );
            }
        }
    }

    fn resolve_constructor(&mut self, class_name: &str, arg_tys: &[TypeId], span: Span) -> TypeId {
        let info = match self.classes.get(class_name).cloned() {
            Some(info) => info,
            None => {
                self.error(format!("unknown class: {class_name}"), span);
                return self.ctx.any();
            }
        };
        if info.constructors.is_empty() {
            self.error(
                format!("no constructors defined for class {class_name}"),
                span,
            );
            return info.ty;
        }
        let same_arity: Vec<&ConstructorInfo> = info
            .constructors
            .iter()
            .filter(|c| c.params.len() == arg_tys.len())
            .collect();
        if same_arity.is_empty() {
            self.error(
                format!(
                    "no constructor of class {class_name} takes {} arguments",
                    arg_tys.len()
                ),
                span,
            );
            return info.ty;
        }
        let matched = same_arity.iter().any(|ctor| {
            ctor.params
                .iter()
                .zip(arg_tys.iter())
                .all(|(p, a)| is_compatible_with(&self.ctx, *a, *p))
        });
        if !matched {
            self.error(
                format!("no constructor of class {class_name} matches the argument types"),
                span,
            );
        }
        info.ty
    }

    fn member_type(&mut self, object_ty: TypeId, member: &str, span: Span) -> TypeId {
        match self.ctx.get(object_ty) {
            TypeKind::Class(class_name) => {
                if let Some(info) = self.classes.get(&class_name) {
                    if let Some(field) = info.field(member) {
                        return field.ty;
                    }
                    if let Some(method) = info.methods.get(member) {
                        return method.ty;
                    }
                }
                self.error(
                    format!("unknown member {member} on class {class_name}"),
                    span,
                );
                self.ctx.any()
            }
            TypeKind::Generic { ref name, .. } if name == "array" && member == "length" => {
                self.ctx.prim(crate::types::Primitive::U32)
            }
            TypeKind::Any => self.ctx.any(),
            other => {
                self.error(
                    format!(
                        "member access requires a class value, found {}",
                        self.ctx.display_kind(&other)
                    ),
                    span,
                );
                self.ctx.any()
            }
        }
    }

    fn check_lambda(&mut self, params: &[Param], body: &LambdaBody) -> TypeId {
        self.push_scope();
        let mut param_tys = Vec::new();
        for param in params {
            let ty = self.resolve_type_spec(&param.ty);
            param_tys.push(ty);
            self.bind(
                param.name.name.clone(),
                Binding {
                    ty,
                    kind: SymbolKind::Parameter,
                },
            );
        }
        let result = match body {
            LambdaBody::Expr(e) => self.check_expr(e),
            LambdaBody::Block(b) => {
                self.return_ctx.push(ReturnCtx::Infer(None));
                self.check_block(b);
                match self.return_ctx.pop() {
                    Some(ReturnCtx::Infer(Some(ty))) => ty,
                    _ => self.ctx.void(),
                }
            }
        };
        self.pop_scope();
        self.ctx.function(param_tys, result)
    }
}

/// Constructor selection, shared with IR building so the call lowering
/// picks the same overload the checker accepted.
pub fn select_constructor(
    ctx: &TypeCtx,
    info: &ClassInfo,
    arg_tys: &[TypeId],
) -> Option<usize> {
    info.constructors
        .iter()
        .enumerate()
        .filter(|(_, c)| c.params.len() == arg_tys.len())
        .find(|(_, c)| {
            c.params
                .iter()
                .zip(arg_tys.iter())
                .all(|(p, a)| is_compatible_with(ctx, *a, *p))
        })
        .map(|(idx, _)| idx)
}
