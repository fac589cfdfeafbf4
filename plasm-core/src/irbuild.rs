//! Lowering from the typed AST to the IR module.
//!
//! The builder walks declarations in order, keeping a `namedValues`
//! scope stack from symbolic names to value handles. Lambdas are
//! lifted: lowering one saves the current function context, builds a
//! fresh `__lambda_<n>` function, and resumes with a function-reference
//! value at the original site.

use std::collections::BTreeMap;

use crate::ast::*;
use crate::diagnostic::{Diagnostic, Phase};
use crate::ir::*;
use crate::span::Span;
use crate::typecheck::{select_constructor, TypeCheckResult};
use crate::types::{TypeId, TypeKind};

#[derive(Debug)]
pub struct IrBuildResult {
    pub module: IrModule,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn build(program: &Program, tc: &TypeCheckResult) -> IrBuildResult {
    let mut field_inits: BTreeMap<(String, String), &Expr> = BTreeMap::new();
    for decl in &program.declarations {
        if let Declaration::Class(c) = decl {
            for member in &c.members {
                if let ClassMember::Field(f) = member {
                    if let Some(init) = &f.init {
                        field_inits.insert((c.name.name.clone(), f.name.name.clone()), init);
                    }
                }
            }
        }
    }

    let mut builder = Builder {
        tc,
        field_inits,
        module: IrModule::new(),
        diagnostics: Vec::new(),
        scopes: Vec::new(),
        globals_map: BTreeMap::new(),
        blocks: Vec::new(),
        cur_block: 0,
        cur_return: IrType::Void,
        lambda_count: 0,
        current_class: None,
    };
    builder.build_program(program);
    IrBuildResult {
        module: builder.module,
        diagnostics: builder.diagnostics,
    }
}

struct Builder<'a> {
    tc: &'a TypeCheckResult,
    field_inits: BTreeMap<(String, String), &'a Expr>,
    module: IrModule,
    diagnostics: Vec<Diagnostic>,
    /// namedValues: lexical scopes of the function being lowered.
    scopes: Vec<BTreeMap<String, ValueId>>,
    globals_map: BTreeMap<String, ValueId>,
    /// Blocks of the function under construction.
    blocks: Vec<IrBasicBlock>,
    cur_block: usize,
    cur_return: IrType,
    lambda_count: u32,
    current_class: Option<String>,
}

impl<'a> Builder<'a> {
    fn build_program(&mut self, program: &Program) {
        // Struct type definitions come first so every later reference
        // can assume they exist.
        for decl in &program.declarations {
            if let Declaration::Class(c) = decl {
                self.define_class_type(&c.name.name);
            }
        }

        for decl in &program.declarations {
            match decl {
                Declaration::Const(c) => self.lower_const(c),
                Declaration::Function(f) => self.lower_function(f, None),
                Declaration::Procedure(p) => self.lower_procedure(p, None),
                Declaration::Class(c) => self.lower_class(c),
            }
        }
    }

    // -- types --------------------------------------------------------

    fn ty_of(&self, expr: &Expr) -> TypeId {
        self.tc
            .table
            .get(expr.id)
            .unwrap_or_else(|| self.tc.types.any())
    }

    fn ir_type(&mut self, ty: TypeId) -> IrType {
        match self.tc.types.get(ty) {
            TypeKind::Prim(p) => IrType::from_prim(p),
            TypeKind::Void => IrType::Void,
            TypeKind::Any => IrType::Any,
            TypeKind::Class(name) => IrType::Named(name),
            TypeKind::Generic { name, args } => {
                if name == "array" && args.len() == 1 {
                    let elem = self.ir_type(args[0]);
                    IrType::Array(Box::new(elem))
                } else {
                    let fields: Vec<IrType> =
                        args.iter().map(|a| self.ir_type(*a)).collect();
                    self.tuple_type(&fields)
                }
            }
            TypeKind::Function { .. } => IrType::Func,
        }
    }

    fn spec_ir_type(&mut self, spec: &TypeSpec) -> IrType {
        match &spec.kind {
            TypeSpecKind::Prim(p) => IrType::from_prim(*p),
            TypeSpecKind::Void => IrType::Void,
            TypeSpecKind::Any => IrType::Any,
            TypeSpecKind::Named(name) => IrType::Named(name.clone()),
            TypeSpecKind::Generic { name, args } => {
                if name == "array" && args.len() == 1 {
                    let elem = self.spec_ir_type(&args[0]);
                    IrType::Array(Box::new(elem))
                } else {
                    let fields: Vec<IrType> =
                        args.iter().map(|a| self.spec_ir_type(a)).collect();
                    self.tuple_type(&fields)
                }
            }
            TypeSpecKind::Function { .. } => IrType::Func,
            TypeSpecKind::Tuple(items) => {
                let fields: Vec<IrType> =
                    items.iter().map(|i| self.spec_ir_type(i)).collect();
                self.tuple_type(&fields)
            }
        }
    }

    /// Synthesised struct definition backing a tuple shape.
    fn tuple_type(&mut self, fields: &[IrType]) -> IrType {
        let mangles: Vec<String> = fields.iter().map(|f| f.mangle()).collect();
        let name = format!("tuple_{}", mangles.join("_"));
        let def_fields: Vec<IrField> = fields
            .iter()
            .enumerate()
            .map(|(i, ty)| IrField {
                name: format!("f{i}"),
                ty: ty.clone(),
                mutable: true,
            })
            .collect();
        self.module.ensure_type_def(IrTypeDef {
            name: name.clone(),
            kind: IrTypeDefKind::Struct { fields: def_fields },
        });
        IrType::Named(name)
    }

    fn define_class_type(&mut self, class_name: &str) {
        let info = match self.tc.classes.get(class_name) {
            Some(info) => info.clone(),
            None => return,
        };
        let fields: Vec<IrField> = info
            .fields
            .iter()
            .map(|f| IrField {
                name: f.name.clone(),
                ty: self.ir_type(f.ty),
                mutable: !f.is_final,
            })
            .collect();
        self.module.ensure_type_def(IrTypeDef {
            name: class_name.to_string(),
            kind: IrTypeDefKind::Struct { fields },
        });
    }

    // -- scopes and blocks --------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: impl Into<String>, value: ValueId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    fn lookup(&self, name: &str) -> Option<ValueId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
    }

    fn new_block(&mut self, label: Option<&str>) -> BlockId {
        let id = self.module.new_block_id();
        self.blocks.push(IrBasicBlock {
            id,
            label: label.map(|l| l.to_string()),
            instructions: Vec::new(),
            terminator: None,
        });
        id
    }

    fn switch_to(&mut self, id: BlockId) {
        if let Some(index) = self.blocks.iter().position(|b| b.id == id) {
            self.cur_block = index;
        }
    }

    fn current(&mut self) -> &mut IrBasicBlock {
        &mut self.blocks[self.cur_block]
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = self.current();
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    /// Statements after a terminator land in a fresh anonymous block.
    fn ensure_open(&mut self) {
        if self.blocks[self.cur_block].is_terminated() {
            let id = self.new_block(None);
            self.switch_to(id);
        }
    }

    fn emit(&mut self, opcode: Opcode, operands: Vec<ValueId>, ty: IrType) -> ValueId {
        let id = self
            .module
            .push_value(IrValueKind::Instruction { opcode, operands }, ty, None);
        self.blocks[self.cur_block].instructions.push(id);
        id
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics
            .push(Diagnostic::error(Phase::Codegen, message, span));
    }

    /// Insert a conversion when an implicitly upcast value would land
    /// in a different wasm value class than the consumer expects.
    fn coerce(&mut self, value: ValueId, target: &IrType, span: Span) -> ValueId {
        let source = self.module.value(value).ty.clone();
        if source.same_wasm_class(target) {
            value
        } else {
            self.lower_cast(value, target.clone(), span)
        }
    }

    // -- declarations -------------------------------------------------

    fn lower_const(&mut self, decl: &ConstDecl) {
        let ty_id = self
            .tc
            .globals
            .get(&decl.name.name)
            .copied()
            .unwrap_or_else(|| self.ty_of(&decl.value));
        let ty = self.ir_type(ty_id);
        let init = self.lower_const_expr(&decl.value, &ty);
        self.module.globals.push(IrGlobal {
            name: decl.name.name.clone(),
            ty: ty.clone(),
            is_constant: true,
            init,
        });
        let global =
            self.module
                .push_value(IrValueKind::Global { name: decl.name.name.clone() }, ty, None);
        self.globals_map.insert(decl.name.name.clone(), global);
    }

    /// Constant-context lowering: literals (and negated numeric
    /// literals) become constant values; anything else yields no
    /// initialiser.
    fn lower_const_expr(&mut self, expr: &Expr, ty: &IrType) -> Option<ValueId> {
        match &expr.kind {
            ExprKind::IntLiteral(v) => Some(self.module.const_int(*v, ty.clone())),
            ExprKind::FloatLiteral(v) => Some(self.module.const_float(*v, ty.clone())),
            ExprKind::BoolLiteral(v) => Some(self.module.const_bool(*v)),
            ExprKind::StringLiteral(s) => Some(self.module.const_str(s.clone(), IrType::Str)),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match &operand.kind {
                ExprKind::IntLiteral(v) => Some(self.module.const_int(-v, ty.clone())),
                ExprKind::FloatLiteral(v) => Some(self.module.const_float(-v, ty.clone())),
                _ => None,
            },
            _ => None,
        }
    }

    fn lower_function(&mut self, decl: &FunctionDecl, class: Option<&str>) {
        let (params, ret) = self.signature_of(&decl.name.name, &decl.params, class);
        let name = match class {
            Some(c) => format!("{}_{}", c, decl.name.name),
            None => decl.name.name.clone(),
        };
        self.build_function(&name, params, ret, &decl.body);
    }

    fn lower_procedure(&mut self, decl: &ProcedureDecl, class: Option<&str>) {
        let (params, ret) = self.signature_of(&decl.name.name, &decl.params, class);
        let name = match class {
            Some(c) => format!("{}_{}", c, decl.name.name),
            None => decl.name.name.clone(),
        };
        self.build_function(&name, params, ret, &decl.body);
    }

    /// Parameter list and return type in IR form; methods gain the
    /// implicit leading `self`.
    fn signature_of(
        &mut self,
        name: &str,
        params: &[Param],
        class: Option<&str>,
    ) -> (Vec<(String, IrType)>, IrType) {
        let mut out = Vec::new();
        if let Some(c) = class {
            out.push(("self".to_string(), IrType::Named(c.to_string())));
        }
        for param in params {
            let ty = self.spec_ir_type(&param.ty);
            out.push((param.name.name.clone(), ty));
        }
        let ret = match class {
            Some(c) => self
                .tc
                .classes
                .get(c)
                .and_then(|info| info.methods.get(name))
                .map(|m| m.ty),
            None => self.tc.functions.get(name).copied(),
        };
        let ret = match ret.map(|ty| self.tc.types.get(ty)) {
            Some(TypeKind::Function { result, .. }) => self.ir_type(result),
            _ => IrType::Void,
        };
        (out, ret)
    }

    fn lower_class(&mut self, class: &ClassDecl) {
        self.current_class = Some(class.name.name.clone());
        let mut ctor_index = 0usize;
        for member in &class.members {
            match member {
                ClassMember::Method(m) => self.lower_function(m, Some(&class.name.name)),
                ClassMember::ProcMethod(m) => self.lower_procedure(m, Some(&class.name.name)),
                ClassMember::Operator(o) => self.lower_operator(class, o),
                ClassMember::Constructor(c) => {
                    self.lower_constructor(class, c, ctor_index);
                    ctor_index += 1;
                }
                ClassMember::Field(_) => {}
            }
        }
        self.current_class = None;
    }

    fn lower_operator(&mut self, class: &ClassDecl, op: &OperatorDecl) {
        let name = format!("{}_op_{}", class.name.name, op.op.mangled());
        let mut params = vec![(
            "self".to_string(),
            IrType::Named(class.name.name.clone()),
        )];
        let param_ty = self.spec_ir_type(&op.param.ty);
        params.push((op.param.name.name.clone(), param_ty));
        let ret = self.spec_ir_type(&op.return_type);
        self.build_function(&name, params, ret, &op.body);
    }

    fn lower_constructor(&mut self, class: &ClassDecl, ctor: &ConstructorDecl, index: usize) {
        let name = format!("{}_constructor_{}", class.name.name, index);
        let mut params = vec![(
            "self".to_string(),
            IrType::Named(class.name.name.clone()),
        )];
        for param in &ctor.params {
            let ty = self.spec_ir_type(&param.ty);
            params.push((param.name.name.clone(), ty));
        }
        self.build_function(&name, params, IrType::Void, &ctor.body);
    }

    fn build_function(
        &mut self,
        name: &str,
        params: Vec<(String, IrType)>,
        return_type: IrType,
        body: &Block,
    ) {
        let saved_blocks = core::mem::take(&mut self.blocks);
        let saved_cur = self.cur_block;
        let saved_scopes = core::mem::take(&mut self.scopes);
        let saved_return = core::mem::replace(&mut self.cur_return, return_type.clone());

        self.push_scope();
        let entry = self.new_block(Some("entry"));
        self.switch_to(entry);

        let mut param_values = Vec::new();
        for (index, (param_name, ty)) in params.iter().enumerate() {
            let value = self.module.push_value(
                IrValueKind::Parameter { index },
                ty.clone(),
                Some(param_name.clone()),
            );
            self.bind(param_name.clone(), value);
            param_values.push(value);
        }

        self.lower_block_stmts(body);

        // A void function may fall off the end; give it an explicit
        // return so the block invariant holds for every block.
        if return_type == IrType::Void && !self.blocks[self.cur_block].is_terminated() {
            self.terminate(Terminator::Ret(None));
        }

        self.pop_scope();
        let blocks = core::mem::replace(&mut self.blocks, saved_blocks);
        self.cur_block = saved_cur;
        self.scopes = saved_scopes;
        self.cur_return = saved_return;

        self.module.functions.push(IrFunction {
            name: name.to_string(),
            params: param_values,
            return_type,
            blocks,
        });
    }

    // -- statements ---------------------------------------------------

    fn lower_block_stmts(&mut self, block: &Block) {
        self.push_scope();
        for stmt in &block.statements {
            self.ensure_open();
            self.lower_stmt(stmt);
        }
        self.pop_scope();
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(b) => self.lower_block_stmts(b),
            Stmt::VarDecl(decl) => self.lower_var_decl(decl),
            Stmt::If(i) => self.lower_if(i),
            Stmt::While(w) => self.lower_while(w),
            Stmt::Return(r) => {
                let value = r.value.as_ref().map(|v| {
                    let raw = self.lower_expr(v);
                    let ret = self.cur_return.clone();
                    self.coerce(raw, &ret, r.span)
                });
                self.terminate(Terminator::Ret(value));
            }
            Stmt::Expr(e) => {
                self.lower_expr(e);
            }
        }
    }

    fn lower_var_decl(&mut self, decl: &VarDecl) {
        for binding in &decl.bindings {
            match &binding.init {
                Some(init) => {
                    let mut value = self.lower_expr(init);
                    if let Some(spec) = &decl.ty {
                        let declared = self.spec_ir_type(spec);
                        value = self.coerce(value, &declared, binding.name.span);
                    }
                    if self.module.value(value).name.is_none() {
                        self.module.value_mut(value).name =
                            Some(binding.name.name.clone());
                    }
                    self.bind(binding.name.name.clone(), value);
                }
                None => {
                    let ty = match &decl.ty {
                        Some(spec) => self.spec_ir_type(spec),
                        None => IrType::I64,
                    };
                    let value = self.emit(Opcode::Alloca, Vec::new(), ty);
                    self.module.value_mut(value).name = Some(binding.name.name.clone());
                    self.bind(binding.name.name.clone(), value);
                }
            }
        }
    }

    fn lower_if(&mut self, stmt: &IfStmt) {
        let cond = self.lower_expr(&stmt.condition);
        let then_block = self.new_block(Some("then"));
        let else_block = stmt
            .else_branch
            .as_ref()
            .map(|_| self.new_block(Some("else")));
        let merge_block = self.new_block(Some("merge"));

        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block: else_block.unwrap_or(merge_block),
        });

        self.switch_to(then_block);
        self.lower_block_stmts(&stmt.then_branch);
        self.terminate(Terminator::Br(merge_block));

        if let (Some(else_block), Some(else_branch)) = (else_block, &stmt.else_branch) {
            self.switch_to(else_block);
            self.lower_stmt(else_branch);
            self.terminate(Terminator::Br(merge_block));
        }

        self.switch_to(merge_block);
    }

    fn lower_while(&mut self, stmt: &WhileStmt) {
        let header = self.new_block(Some("while_header"));
        let body = self.new_block(Some("while_body"));
        let exit = self.new_block(Some("while_exit"));

        self.terminate(Terminator::Br(header));
        self.switch_to(header);
        let cond = self.lower_expr(&stmt.condition);
        self.terminate(Terminator::CondBr {
            cond,
            then_block: body,
            else_block: exit,
        });

        self.switch_to(body);
        self.lower_block_stmts(&stmt.body);
        self.terminate(Terminator::Br(header));

        self.switch_to(exit);
    }

    // -- expressions --------------------------------------------------

    fn lower_expr(&mut self, expr: &Expr) -> ValueId {
        match &expr.kind {
            ExprKind::IntLiteral(v) => {
                let ty_id = self.ty_of(expr);
                let ty = self.ir_type(ty_id);
                self.module.const_int(*v, ty)
            }
            ExprKind::FloatLiteral(v) => {
                let ty_id = self.ty_of(expr);
                let ty = self.ir_type(ty_id);
                self.module.const_float(*v, ty)
            }
            ExprKind::StringLiteral(s) => self.module.const_str(s.clone(), IrType::Str),
            ExprKind::BoolLiteral(v) => self.module.const_bool(*v),
            ExprKind::Identifier(name) | ExprKind::ProcIdentifier(name) => {
                self.lower_name(name, expr.span)
            }
            ExprKind::SelfRef => match self.lookup("self") {
                Some(value) => value,
                None => {
                    self.error("`self` is not available here", expr.span);
                    self.module.const_int(0, IrType::I64)
                }
            },
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(expr, *op, lhs, rhs),
            ExprKind::Unary { op, operand } => {
                let value = self.lower_expr(operand);
                match op {
                    UnaryOp::Neg => {
                        let ty = self.module.value(value).ty.clone();
                        self.emit(Opcode::Neg, vec![value], ty)
                    }
                    UnaryOp::Not => self.emit(Opcode::Not, vec![value], IrType::Bool),
                }
            }
            ExprKind::Assignment { target, value } => {
                let value_id = self.lower_expr(value);
                match &target.kind {
                    ExprKind::Identifier(name) => {
                        let target_id = self.lower_name(name, target.span);
                        let target_ty = self.module.value(target_id).ty.clone();
                        let stored = self.coerce(value_id, &target_ty, target.span);
                        self.emit(Opcode::Store, vec![stored, target_id], IrType::Void);
                    }
                    _ => {
                        self.error("unsupported assignment target", target.span);
                    }
                }
                value_id
            }
            ExprKind::Cast { operand, .. } => {
                let value = self.lower_expr(operand);
                let target_id = self.ty_of(expr);
                let target = self.ir_type(target_id);
                self.lower_cast(value, target, expr.span)
            }
            ExprKind::TypeTest { operand, target } => {
                let value = self.lower_expr(operand);
                let operand_ty_id = self.ty_of(operand);
                let target_ir = self.spec_ir_type(target);
                if self.tc.types.is_any(operand_ty_id) {
                    // The test names a heap type; make sure the
                    // backing definition exists.
                    match &target_ir {
                        IrType::F32 | IrType::F64 => {
                            self.float_box_type(&target_ir);
                        }
                        IrType::Array(elem) => {
                            let elem = (**elem).clone();
                            self.module.ensure_type_def(IrTypeDef {
                                name: target_ir.mangle(),
                                kind: IrTypeDefKind::Array { elem },
                            });
                        }
                        _ => {}
                    }
                    let name = self.module.const_str(heap_type_name(&target_ir), IrType::Str);
                    self.emit(Opcode::RefTest, vec![value, name], IrType::Bool)
                } else {
                    // The operand's type is statically known; the test
                    // folds to a constant.
                    let operand_ir = {
                        let id = self.ty_of(operand);
                        self.ir_type(id)
                    };
                    self.module.const_bool(operand_ir == target_ir)
                }
            }
            ExprKind::Call { callee, args } => self.lower_call(expr, callee, args),
            ExprKind::ConstructorCall { class, args } => {
                self.lower_constructor_call(&class.name, args, expr.span)
            }
            ExprKind::Member { object, member } => self.lower_member(expr, object, member),
            ExprKind::Tuple(items) => {
                let values: Vec<ValueId> =
                    items.iter().map(|item| self.lower_expr(item)).collect();
                let tys: Vec<IrType> = values
                    .iter()
                    .map(|v| self.module.value(*v).ty.clone())
                    .collect();
                let ty = self.tuple_type(&tys);
                self.emit(Opcode::StructNew, values, ty)
            }
            ExprKind::Lambda { params, body } => self.lower_lambda(expr, params, body),
            ExprKind::ArrayAlloc { size, .. } => {
                let length = self.lower_expr(size);
                let ty_id = self.ty_of(expr);
                let ty = self.ir_type(ty_id);
                self.emit(Opcode::ArrayNewDefault, vec![length], ty)
            }
            ExprKind::Index { array, index } => {
                let array_value = self.lower_expr(array);
                let index_value = self.lower_expr(index);
                let index_value = self.coerce(index_value, &IrType::U32, index.span);
                let ty_id = self.ty_of(expr);
                let ty = self.ir_type(ty_id);
                self.emit(Opcode::ArrayGet, vec![array_value, index_value], ty)
            }
            ExprKind::ArrayLiteral(items) => self.lower_array_literal(expr, items),
            ExprKind::Interpolation(parts) => self.lower_interpolation(parts),
        }
    }

    fn lower_name(&mut self, name: &str, span: Span) -> ValueId {
        if let Some(value) = self.lookup(name) {
            return value;
        }
        if let Some(global) = self.globals_map.get(name) {
            return *global;
        }
        // Bare reference to a class field or method inside a body.
        if let Some(class_name) = self.current_class.clone() {
            if let Some(info) = self.tc.classes.get(&class_name).cloned() {
                if let Some(field) = info.field(name) {
                    if let Some(self_value) = self.lookup("self") {
                        let field_ty = self.ir_type(field.ty);
                        let field_name = self.module.const_str(name, IrType::Str);
                        return self.emit(
                            Opcode::StructGet,
                            vec![self_value, field_name],
                            field_ty,
                        );
                    }
                }
                if info.methods.contains_key(name) {
                    let mangled = format!("{class_name}_{name}");
                    let target = self.module.const_str(mangled, IrType::Str);
                    return self.emit(Opcode::FuncRef, vec![target], IrType::Func);
                }
            }
        }
        if self.tc.functions.contains_key(name) || name.starts_with("__external_")
            || name.starts_with("$__external_")
        {
            let target = self.module.const_str(name, IrType::Str);
            return self.emit(Opcode::FuncRef, vec![target], IrType::Func);
        }
        // Lambdas do not capture their environment; a name that is
        // visible lexically but absent here fell out of the lifted
        // function's scope.
        self.error(
            format!("unsupported capture of enclosing variable: {name}"),
            span,
        );
        self.module.const_int(0, IrType::I64)
    }

    fn lower_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> ValueId {
        let lhs_ty_id = self.ty_of(lhs);

        // Class operands dispatch through lowered operator functions.
        if let TypeKind::Class(class_name) = self.tc.types.get(lhs_ty_id) {
            if let Some(overload) = self
                .tc
                .classes
                .get(&class_name)
                .and_then(|info| info.operators.get(&op))
                .cloned()
            {
                let lhs_value = self.lower_expr(lhs);
                let rhs_value = self.lower_expr(rhs);
                let param_ty = self.ir_type(overload.param);
                let rhs_value = self.coerce(rhs_value, &param_ty, rhs.span);
                let target = self
                    .module
                    .const_str(format!("{class_name}_op_{}", op.mangled()), IrType::Str);
                let result = self.ir_type(overload.result);
                return self.emit(Opcode::Call, vec![target, lhs_value, rhs_value], result);
            }
            if op.is_equality() {
                let lhs_value = self.lower_expr(lhs);
                let rhs_value = self.lower_expr(rhs);
                let eq = self.emit(Opcode::RefEq, vec![lhs_value, rhs_value], IrType::Bool);
                return if op == BinaryOp::Neq {
                    self.emit(Opcode::Not, vec![eq], IrType::Bool)
                } else {
                    eq
                };
            }
        }

        let lhs_value = self.lower_expr(lhs);
        let mut rhs_value = self.lower_expr(rhs);

        let lhs_ir = self.module.value(lhs_value).ty.clone();
        let rhs_ir = self.module.value(rhs_value).ty.clone();

        if op.is_equality() && lhs_ir.is_ref() {
            let eq = self.emit(Opcode::RefEq, vec![lhs_value, rhs_value], IrType::Bool);
            return if op == BinaryOp::Neq {
                self.emit(Opcode::Not, vec![eq], IrType::Bool)
            } else {
                eq
            };
        }

        // Mixed-width numeric operands are normalised to the left
        // type so the emitted opcode is well-typed.
        if !lhs_ir.same_wasm_class(&rhs_ir) && (lhs_ir.is_integer() || lhs_ir.is_float()) {
            rhs_value = self.lower_cast(rhs_value, lhs_ir.clone(), rhs.span);
        }

        // wasm has no float remainder; defer to the host runtime.
        if op == BinaryOp::Mod && lhs_ir.is_float() {
            let target = self.module.const_str("__external_fmod", IrType::Str);
            return self.emit(Opcode::Call, vec![target, lhs_value, rhs_value], lhs_ir);
        }

        let opcode = match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Eq => Opcode::Eq,
            BinaryOp::Neq => Opcode::Neq,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Lte => Opcode::Lte,
            BinaryOp::Gte => Opcode::Gte,
            BinaryOp::And => Opcode::And,
            BinaryOp::Or => Opcode::Or,
        };
        let result = if op.is_arithmetic() {
            let ty_id = self.ty_of(expr);
            self.ir_type(ty_id)
        } else {
            IrType::Bool
        };
        self.emit(opcode, vec![lhs_value, rhs_value], result)
    }

    fn lower_cast(&mut self, value: ValueId, target: IrType, _span: Span) -> ValueId {
        let source = self.module.value(value).ty.clone();
        if source == target {
            // Re-materialised so the cast keeps its own value identity.
            return self.emit(Opcode::Cast, vec![value], target);
        }
        // Floats box into a one-field struct when erased to `any`; the
        // i31 representation only covers integers and booleans.
        if target == IrType::Any && source.is_float() {
            let box_ty = self.float_box_type(&source);
            let boxed = self.emit(Opcode::StructNew, vec![value], box_ty);
            return self.emit(Opcode::Cast, vec![boxed], IrType::Any);
        }
        if source == IrType::Any && target.is_float() {
            let box_ty = self.float_box_type(&target);
            let cast = self.emit(Opcode::RefCast, vec![value], box_ty);
            let field = self.module.const_str("v", IrType::Str);
            return self.emit(Opcode::StructGet, vec![cast, field], target);
        }
        self.emit(Opcode::Cast, vec![value], target)
    }

    fn float_box_type(&mut self, float: &IrType) -> IrType {
        let name = format!("box_{}", float.mangle());
        self.module.ensure_type_def(IrTypeDef {
            name: name.clone(),
            kind: IrTypeDefKind::Struct {
                fields: vec![IrField {
                    name: "v".to_string(),
                    ty: float.clone(),
                    mutable: false,
                }],
            },
        });
        IrType::Named(name)
    }

    /// Lower `args`, converting each to its declared parameter type
    /// when a signature is known.
    fn lower_args(&mut self, args: &[Expr], params: Option<&[IrType]>) -> Vec<ValueId> {
        let mut out = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            let mut value = self.lower_expr(arg);
            if let Some(param) = params.and_then(|ps| ps.get(i)) {
                let param = param.clone();
                value = self.coerce(value, &param, arg.span);
            }
            out.push(value);
        }
        out
    }

    fn fn_param_irs(&mut self, ty: TypeId) -> Option<Vec<IrType>> {
        match self.tc.types.get(ty) {
            TypeKind::Function { params, .. } => {
                Some(params.iter().map(|p| self.ir_type(*p)).collect())
            }
            _ => None,
        }
    }

    fn method_param_irs(&mut self, class_name: &str, method: &str) -> Option<Vec<IrType>> {
        let ty = self.tc.classes.get(class_name)?.methods.get(method)?.ty;
        self.fn_param_irs(ty)
    }

    fn lower_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) -> ValueId {
        match &callee.kind {
            ExprKind::Identifier(name) | ExprKind::ProcIdentifier(name) => {
                // Constructor call through the class name.
                if self.tc.classes.contains_key(name) && self.lookup(name).is_none() {
                    return self.lower_constructor_call(name, args, expr.span);
                }
                // Method call on the enclosing class.
                if self.lookup(name).is_none() && !self.tc.functions.contains_key(name) {
                    if let Some(class_name) = self.current_class.clone() {
                        let is_method = self
                            .tc
                            .classes
                            .get(&class_name)
                            .map(|info| info.methods.contains_key(name))
                            .unwrap_or(false);
                        if is_method {
                            if let Some(self_value) = self.lookup("self") {
                                let params = self.method_param_irs(&class_name, name);
                                let values = self.lower_args(args, params.as_deref());
                                let mut operands = vec![
                                    self.module.const_str(
                                        format!("{class_name}_{name}"),
                                        IrType::Str,
                                    ),
                                    self_value,
                                ];
                                operands.extend(values);
                                let ty_id = self.ty_of(expr);
                                let ty = self.ir_type(ty_id);
                                return self.emit(Opcode::Call, operands, ty);
                            }
                        }
                    }
                }
                // A local binding of function type calls indirectly.
                if let Some(value) = self.lookup(name) {
                    if self.module.value(value).ty == IrType::Func {
                        let params = self
                            .tc
                            .table
                            .get(callee.id)
                            .and_then(|ty| self.fn_param_irs(ty));
                        let values = self.lower_args(args, params.as_deref());
                        let mut operands = vec![value];
                        operands.extend(values);
                        let ty_id = self.ty_of(expr);
                        let ty = self.ir_type(ty_id);
                        return self.emit(Opcode::CallIndirect, operands, ty);
                    }
                }
                // Direct call by name, externals included.
                let params = self
                    .tc
                    .functions
                    .get(name)
                    .copied()
                    .and_then(|ty| self.fn_param_irs(ty));
                let values = self.lower_args(args, params.as_deref());
                let mut operands =
                    vec![self.module.const_str(name.clone(), IrType::Str)];
                operands.extend(values);
                let ty_id = self.ty_of(expr);
                let ty = self.ir_type(ty_id);
                self.emit(Opcode::Call, operands, ty)
            }
            ExprKind::Member { object, member } => {
                let object_ty_id = self.ty_of(object);
                if let TypeKind::Class(class_name) = self.tc.types.get(object_ty_id) {
                    let object_value = self.lower_expr(object);
                    let params = self.method_param_irs(&class_name, member);
                    let values = self.lower_args(args, params.as_deref());
                    let mut operands = vec![
                        self.module
                            .const_str(format!("{class_name}_{member}"), IrType::Str),
                        object_value,
                    ];
                    operands.extend(values);
                    let ty_id = self.ty_of(expr);
                    let ty = self.ir_type(ty_id);
                    return self.emit(Opcode::Call, operands, ty);
                }
                self.error(
                    "method calls are only supported on class values",
                    expr.span,
                );
                self.module.const_int(0, IrType::I64)
            }
            _ => {
                let callee_value = self.lower_expr(callee);
                let params = self
                    .tc
                    .table
                    .get(callee.id)
                    .and_then(|ty| self.fn_param_irs(ty));
                let values = self.lower_args(args, params.as_deref());
                let mut operands = vec![callee_value];
                operands.extend(values);
                let ty_id = self.ty_of(expr);
                let ty = self.ir_type(ty_id);
                self.emit(Opcode::CallIndirect, operands, ty)
            }
        }
    }

    fn lower_constructor_call(&mut self, class_name: &str, args: &[Expr], span: Span) -> ValueId {
        let info = match self.tc.classes.get(class_name).cloned() {
            Some(info) => info,
            None => {
                self.error(format!("unknown class: {class_name}"), span);
                return self.module.const_int(0, IrType::I64);
            }
        };

        // Fresh object with per-field defaults (declared initialiser
        // when it is a constant, zero/null otherwise).
        let mut defaults = Vec::new();
        for field in &info.fields {
            let field_ty = self.ir_type(field.ty);
            let init = self
                .field_inits
                .get(&(class_name.to_string(), field.name.clone()))
                .copied();
            let value = match init {
                Some(init_expr) => self
                    .lower_const_expr(init_expr, &field_ty)
                    .unwrap_or_else(|| self.default_value(&field_ty)),
                None => self.default_value(&field_ty),
            };
            defaults.push(value);
        }
        let object = self.emit(
            Opcode::StructNew,
            defaults,
            IrType::Named(class_name.to_string()),
        );

        let arg_tys: Vec<TypeId> = args.iter().map(|a| self.ty_of(a)).collect();
        if let Some(index) = select_constructor(&self.tc.types, &info, &arg_tys) {
            let params: Vec<IrType> = info.constructors[index]
                .params
                .iter()
                .map(|p| self.ir_type(*p))
                .collect();
            let values = self.lower_args(args, Some(&params));
            let mut operands = vec![
                self.module.const_str(
                    format!("{class_name}_constructor_{index}"),
                    IrType::Str,
                ),
                object,
            ];
            operands.extend(values);
            self.emit(Opcode::Call, operands, IrType::Void);
        }
        object
    }

    fn default_value(&mut self, ty: &IrType) -> ValueId {
        match ty {
            t if t.is_integer() => self.module.const_int(0, t.clone()),
            IrType::F32 | IrType::F64 => self.module.const_float(0.0, ty.clone()),
            IrType::Bool => self.module.const_bool(false),
            _ => self.module.const_null(ty.clone()),
        }
    }

    fn lower_member(&mut self, expr: &Expr, object: &Expr, member: &str) -> ValueId {
        let object_ty_id = self.ty_of(object);
        match self.tc.types.get(object_ty_id) {
            TypeKind::Class(class_name) => {
                let object_value = self.lower_expr(object);
                let info = self.tc.classes.get(&class_name).cloned();
                if let Some(info) = info {
                    if info.field(member).is_some() {
                        let ty_id = self.ty_of(expr);
                        let ty = self.ir_type(ty_id);
                        let field_name = self.module.const_str(member, IrType::Str);
                        return self.emit(
                            Opcode::StructGet,
                            vec![object_value, field_name],
                            ty,
                        );
                    }
                    if info.methods.contains_key(member) {
                        let target = self
                            .module
                            .const_str(format!("{class_name}_{member}"), IrType::Str);
                        return self.emit(Opcode::FuncRef, vec![target], IrType::Func);
                    }
                }
                self.error(
                    format!("unknown member {member} on class {class_name}"),
                    expr.span,
                );
                self.module.const_int(0, IrType::I64)
            }
            TypeKind::Generic { name, .. } if name == "array" && member == "length" => {
                let object_value = self.lower_expr(object);
                self.emit(Opcode::ArrayLen, vec![object_value], IrType::U32)
            }
            _ => {
                self.error(
                    format!("unsupported member access: {member}"),
                    expr.span,
                );
                self.module.const_int(0, IrType::I64)
            }
        }
    }

    fn lower_lambda(&mut self, expr: &Expr, params: &[Param], body: &LambdaBody) -> ValueId {
        let name = format!("__lambda_{}", self.lambda_count);
        self.lambda_count += 1;

        let lambda_ty = self.ty_of(expr);
        let (param_tys, result) = match self.tc.types.get(lambda_ty) {
            TypeKind::Function { params, result } => (params, result),
            _ => (Vec::new(), self.tc.types.void()),
        };
        let mut ir_params = Vec::new();
        for (i, param) in params.iter().enumerate() {
            let ty = param_tys
                .get(i)
                .map(|t| self.ir_type(*t))
                .unwrap_or(IrType::Any);
            ir_params.push((param.name.name.clone(), ty));
        }
        let ret = self.ir_type(result);

        match body {
            LambdaBody::Block(block) => {
                self.build_function(&name, ir_params, ret, block);
            }
            LambdaBody::Expr(value_expr) => {
                // Expression bodies become a single-block function
                // returning the lowered value.
                let saved_blocks = core::mem::take(&mut self.blocks);
                let saved_cur = self.cur_block;
                let saved_scopes = core::mem::take(&mut self.scopes);

                self.push_scope();
                let entry = self.new_block(Some("entry"));
                self.switch_to(entry);
                let mut param_values = Vec::new();
                for (index, (param_name, ty)) in ir_params.iter().enumerate() {
                    let value = self.module.push_value(
                        IrValueKind::Parameter { index },
                        ty.clone(),
                        Some(param_name.clone()),
                    );
                    self.bind(param_name.clone(), value);
                    param_values.push(value);
                }
                let result_value = self.lower_expr(value_expr);
                let result_value = self.coerce(result_value, &ret, value_expr.span);
                self.terminate(Terminator::Ret(Some(result_value)));
                self.pop_scope();

                let blocks = core::mem::replace(&mut self.blocks, saved_blocks);
                self.cur_block = saved_cur;
                self.scopes = saved_scopes;
                self.module.functions.push(IrFunction {
                    name: name.clone(),
                    params: param_values,
                    return_type: ret,
                    blocks,
                });
            }
        }

        let target = self.module.const_str(name, IrType::Str);
        self.emit(Opcode::FuncRef, vec![target], IrType::Func)
    }

    fn lower_array_literal(&mut self, expr: &Expr, items: &[Expr]) -> ValueId {
        let ty_id = self.ty_of(expr);
        let ty = self.ir_type(ty_id);
        let elem = match &ty {
            IrType::Array(elem) => (**elem).clone(),
            _ => IrType::Any,
        };
        let length = self.module.const_int(items.len() as i64, IrType::U32);
        let array = self.emit(Opcode::ArrayNewDefault, vec![length], ty);
        for (i, item) in items.iter().enumerate() {
            let index = self.module.const_int(i as i64, IrType::U32);
            let value = self.lower_expr(item);
            let value = self.coerce(value, &elem, item.span);
            self.emit(Opcode::ArraySet, vec![array, index, value], IrType::Void);
        }
        array
    }

    fn lower_interpolation(&mut self, parts: &[InterpPart]) -> ValueId {
        let mut pieces: Vec<ValueId> = Vec::new();
        for part in parts {
            match part {
                InterpPart::Text(text) => {
                    pieces.push(self.module.const_str(text.clone(), IrType::Str));
                }
                InterpPart::Expr(e) => {
                    let value = self.lower_expr(e);
                    let piece = self.stringify(value, e.span);
                    pieces.push(piece);
                }
            }
        }
        let mut result = match pieces.first() {
            Some(first) => *first,
            None => return self.module.const_str("", IrType::Str),
        };
        for piece in pieces.into_iter().skip(1) {
            let concat = self.module.const_str("__external_concat", IrType::Str);
            result = self.emit(Opcode::Call, vec![concat, result, piece], IrType::Str);
        }
        result
    }

    /// Conversion of one interpolated value to a string, through the
    /// host runtime helpers.
    fn stringify(&mut self, value: ValueId, span: Span) -> ValueId {
        let ty = self.module.value(value).ty.clone();
        let (helper, coerced) = match &ty {
            IrType::Str => return value,
            t if t.is_integer() => {
                let wide = if t.bit_width() == 64 {
                    value
                } else {
                    self.lower_cast(value, IrType::I64, span)
                };
                ("__external_itos", wide)
            }
            IrType::F32 => {
                let wide = self.lower_cast(value, IrType::F64, span);
                ("__external_ftos", wide)
            }
            IrType::F64 => ("__external_ftos", value),
            IrType::Bool => ("__external_btos", value),
            IrType::Any => ("__external_atos", value),
            _ => {
                self.error("cannot interpolate this value", span);
                return self.module.const_str("", IrType::Str);
            }
        };
        let target = self.module.const_str(helper, IrType::Str);
        self.emit(Opcode::Call, vec![target, coerced], IrType::Str)
    }
}

/// Heap-type name used by dynamic `is` tests.
fn heap_type_name(ty: &IrType) -> String {
    match ty {
        t if t.is_integer() || *t == IrType::Bool => "i31".to_string(),
        IrType::F32 => "box_f32".to_string(),
        IrType::F64 => "box_f64".to_string(),
        other => other.mangle(),
    }
}
