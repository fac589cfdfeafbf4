//! Typed SSA-style intermediate representation.
//!
//! The module is an arena: it owns a dense vector of values and hands
//! out integer handles (`ValueId`). Blocks and instructions reference
//! values by handle only, which keeps the graph free of ownership
//! cycles. Ids are unique within a module; block ids are numbered
//! monotonically across all functions.

use core::fmt;

use crate::types::Primitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

/// Wasm-level value classes the IR types collapse onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasmClass {
    I32,
    I64,
    F32,
    F64,
    Ref,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

/// IR-level types keep the source-level width and signedness; the WAT
/// generator collapses them onto wasm value types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bool,
    Str,
    Void,
    Any,
    /// A function value; represented as a table index at emission.
    Func,
    /// A user GC struct type, by type-definition name.
    Named(String),
    Array(Box<IrType>),
}

impl IrType {
    pub fn from_prim(p: Primitive) -> IrType {
        match p {
            Primitive::U8 => IrType::U8,
            Primitive::U16 => IrType::U16,
            Primitive::U32 => IrType::U32,
            Primitive::U64 => IrType::U64,
            Primitive::I8 => IrType::I8,
            Primitive::I16 => IrType::I16,
            Primitive::I32 => IrType::I32,
            Primitive::I64 => IrType::I64,
            Primitive::F32 => IrType::F32,
            Primitive::F64 => IrType::F64,
            Primitive::Bool => IrType::Bool,
            Primitive::Str => IrType::Str,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            IrType::U8
                | IrType::U16
                | IrType::U32
                | IrType::U64
                | IrType::I8
                | IrType::I16
                | IrType::I32
                | IrType::I64
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, IrType::U8 | IrType::U16 | IrType::U32 | IrType::U64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    pub fn bit_width(&self) -> u32 {
        match self {
            IrType::U8 | IrType::I8 => 8,
            IrType::U16 | IrType::I16 => 16,
            IrType::U32 | IrType::I32 | IrType::F32 => 32,
            IrType::U64 | IrType::I64 | IrType::F64 => 64,
            _ => 0,
        }
    }

    /// Whether values of this type are GC references at emission time.
    pub fn is_ref(&self) -> bool {
        matches!(
            self,
            IrType::Str | IrType::Any | IrType::Named(_) | IrType::Array(_)
        )
    }

    /// The wasm value class this type collapses onto at emission.
    pub fn wasm_class(&self) -> WasmClass {
        match self {
            IrType::U64 | IrType::I64 => WasmClass::I64,
            IrType::F32 => WasmClass::F32,
            IrType::F64 => WasmClass::F64,
            IrType::Str | IrType::Any | IrType::Named(_) | IrType::Array(_) => WasmClass::Ref,
            // Narrow integers, bool, and function table indices.
            _ => WasmClass::I32,
        }
    }

    /// True when a value of `self` can stand where `other` is expected
    /// without an explicit conversion instruction.
    pub fn same_wasm_class(&self, other: &IrType) -> bool {
        self.wasm_class() == other.wasm_class()
    }

    /// Flat name used for compiler-synthesised type definitions
    /// (`array_i64`, `array_Point`, ...).
    pub fn mangle(&self) -> String {
        match self {
            IrType::Named(name) => name.clone(),
            IrType::Array(elem) => format!("array_{}", elem.mangle()),
            IrType::Str => "str".to_string(),
            IrType::Any => "any".to_string(),
            IrType::Func => "func".to_string(),
            IrType::Void => "void".to_string(),
            IrType::U8 => "u8".to_string(),
            IrType::U16 => "u16".to_string(),
            IrType::U32 => "u32".to_string(),
            IrType::U64 => "u64".to_string(),
            IrType::I8 => "i8".to_string(),
            IrType::I16 => "i16".to_string(),
            IrType::I32 => "i32".to_string(),
            IrType::I64 => "i64".to_string(),
            IrType::F32 => "f32".to_string(),
            IrType::F64 => "f64".to_string(),
            IrType::Bool => "bool".to_string(),
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Array(elem) => write!(f, "array<{elem}>"),
            IrType::Named(name) => write!(f, "{name}"),
            other => write!(f, "{}", other.mangle()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrConst {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

/// Instruction opcodes, including the WebAssembly-GC operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    // comparison
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    // logical
    And,
    Or,
    Not,
    // memory
    Load,
    Store,
    Alloca,
    // calls
    Call,
    CallIndirect,
    // conversions
    Cast,
    // gc
    StructNew,
    StructGet,
    StructSet,
    ArrayNew,
    ArrayNewDefault,
    ArrayGet,
    ArraySet,
    ArrayLen,
    RefNull,
    RefIsNull,
    RefEq,
    RefCast,
    RefTest,
    RttCanon,
    RttSub,
    I31New,
    I31GetS,
    I31GetU,
    FuncRef,
}

impl Opcode {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Neg => "neg",
            Opcode::Eq => "eq",
            Opcode::Neq => "neq",
            Opcode::Lt => "lt",
            Opcode::Gt => "gt",
            Opcode::Lte => "lte",
            Opcode::Gte => "gte",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Not => "not",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Alloca => "alloca",
            Opcode::Call => "call",
            Opcode::CallIndirect => "call_indirect",
            Opcode::Cast => "cast",
            Opcode::StructNew => "struct.new",
            Opcode::StructGet => "struct.get",
            Opcode::StructSet => "struct.set",
            Opcode::ArrayNew => "array.new",
            Opcode::ArrayNewDefault => "array.new_default",
            Opcode::ArrayGet => "array.get",
            Opcode::ArraySet => "array.set",
            Opcode::ArrayLen => "array.len",
            Opcode::RefNull => "ref.null",
            Opcode::RefIsNull => "ref.is_null",
            Opcode::RefEq => "ref.eq",
            Opcode::RefCast => "ref.cast",
            Opcode::RefTest => "ref.test",
            Opcode::RttCanon => "rtt.canon",
            Opcode::RttSub => "rtt.sub",
            Opcode::I31New => "ref.i31",
            Opcode::I31GetS => "i31.get_s",
            Opcode::I31GetU => "i31.get_u",
            Opcode::FuncRef => "func.ref",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrValueKind {
    /// Function parameter; `index` is its position.
    Parameter { index: usize },
    Constant(IrConst),
    /// Reference to a module global, by name.
    Global { name: String },
    Instruction {
        opcode: Opcode,
        operands: Vec<ValueId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrValue {
    pub id: ValueId,
    /// Symbolic name, when one exists (parameter and binding names).
    pub name: Option<String>,
    pub ty: IrType,
    pub kind: IrValueKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret(Option<ValueId>),
    Br(BlockId),
    CondBr {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrBasicBlock {
    pub id: BlockId,
    pub label: Option<String>,
    pub instructions: Vec<ValueId>,
    pub terminator: Option<Terminator>,
}

impl IrBasicBlock {
    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<ValueId>,
    pub return_type: IrType,
    pub blocks: Vec<IrBasicBlock>,
}

impl IrFunction {
    pub fn block(&self, id: BlockId) -> Option<&IrBasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrField {
    pub name: String,
    pub ty: IrType,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrTypeDefKind {
    Struct { fields: Vec<IrField> },
    Array { elem: IrType },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrTypeDef {
    pub name: String,
    pub kind: IrTypeDefKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrGlobal {
    pub name: String,
    pub ty: IrType,
    pub is_constant: bool,
    pub init: Option<ValueId>,
}

/// Arena owner of the whole IR graph.
#[derive(Debug, Default)]
pub struct IrModule {
    pub type_defs: Vec<IrTypeDef>,
    pub globals: Vec<IrGlobal>,
    pub functions: Vec<IrFunction>,
    values: Vec<IrValue>,
    next_block: u32,
}

impl IrModule {
    pub fn new() -> IrModule {
        IrModule::default()
    }

    pub fn push_value(
        &mut self,
        kind: IrValueKind,
        ty: IrType,
        name: Option<String>,
    ) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(IrValue { id, name, ty, kind });
        id
    }

    pub fn value(&self, id: ValueId) -> &IrValue {
        &self.values[id.0 as usize]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut IrValue {
        &mut self.values[id.0 as usize]
    }

    pub fn values(&self) -> &[IrValue] {
        &self.values
    }

    pub fn const_int(&mut self, v: i64, ty: IrType) -> ValueId {
        self.push_value(IrValueKind::Constant(IrConst::Int(v)), ty, None)
    }

    pub fn const_float(&mut self, v: f64, ty: IrType) -> ValueId {
        self.push_value(IrValueKind::Constant(IrConst::Float(v)), ty, None)
    }

    pub fn const_bool(&mut self, v: bool) -> ValueId {
        self.push_value(IrValueKind::Constant(IrConst::Bool(v)), IrType::Bool, None)
    }

    pub fn const_str(&mut self, v: impl Into<String>, ty: IrType) -> ValueId {
        self.push_value(IrValueKind::Constant(IrConst::Str(v.into())), ty, None)
    }

    pub fn const_null(&mut self, ty: IrType) -> ValueId {
        self.push_value(IrValueKind::Constant(IrConst::Null), ty, None)
    }

    pub fn new_block_id(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn type_def(&self, name: &str) -> Option<&IrTypeDef> {
        self.type_defs.iter().find(|t| t.name == name)
    }

    /// Register a type definition unless one of the same name exists.
    pub fn ensure_type_def(&mut self, def: IrTypeDef) {
        if self.type_def(&def.name).is_none() {
            self.type_defs.push(def);
        }
    }

    pub fn global(&self, name: &str) -> Option<&IrGlobal> {
        self.globals.iter().find(|g| g.name == name)
    }
}

// ---------------------------------------------------------------------
// Visitor
// ---------------------------------------------------------------------

/// Pre-order traversal over module, functions, blocks, instructions
/// and their operand values. Passes use this to scan without repeating
/// the iteration scaffolding.
pub trait IrVisitor {
    fn visit_module(&mut self, module: &IrModule) {
        walk_module(self, module);
    }
    fn visit_function(&mut self, module: &IrModule, function: &IrFunction) {
        walk_function(self, module, function);
    }
    fn visit_block(&mut self, module: &IrModule, block: &IrBasicBlock) {
        walk_block(self, module, block);
    }
    fn visit_instruction(&mut self, module: &IrModule, value: &IrValue) {
        walk_instruction(self, module, value);
    }
    fn visit_value(&mut self, _module: &IrModule, _value: &IrValue) {}
}

pub fn walk_module<V: IrVisitor + ?Sized>(v: &mut V, module: &IrModule) {
    for function in &module.functions {
        v.visit_function(module, function);
    }
}

pub fn walk_function<V: IrVisitor + ?Sized>(v: &mut V, module: &IrModule, function: &IrFunction) {
    for block in &function.blocks {
        v.visit_block(module, block);
    }
}

pub fn walk_block<V: IrVisitor + ?Sized>(v: &mut V, module: &IrModule, block: &IrBasicBlock) {
    for id in &block.instructions {
        v.visit_instruction(module, module.value(*id));
    }
    match &block.terminator {
        Some(Terminator::Ret(Some(value))) => v.visit_value(module, module.value(*value)),
        Some(Terminator::CondBr { cond, .. }) => v.visit_value(module, module.value(*cond)),
        _ => {}
    }
}

pub fn walk_instruction<V: IrVisitor + ?Sized>(v: &mut V, module: &IrModule, value: &IrValue) {
    if let IrValueKind::Instruction { operands, .. } = &value.kind {
        for operand in operands {
            v.visit_value(module, module.value(*operand));
        }
    }
}

// ---------------------------------------------------------------------
// Dump
// ---------------------------------------------------------------------

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for def in &self.type_defs {
            match &def.kind {
                IrTypeDefKind::Struct { fields } => {
                    let fields: Vec<String> = fields
                        .iter()
                        .map(|field| format!("{}: {}", field.name, field.ty))
                        .collect();
                    writeln!(f, "type {} = struct {{ {} }}", def.name, fields.join(", "))?;
                }
                IrTypeDefKind::Array { elem } => {
                    writeln!(f, "type {} = array of {}", def.name, elem)?;
                }
            }
        }
        for global in &self.globals {
            let kind = if global.is_constant { "const" } else { "mut" };
            match global.init {
                Some(init) => writeln!(
                    f,
                    "global {} {}: {} = {}",
                    kind,
                    global.name,
                    global.ty,
                    self.value_dump(init)
                )?,
                None => writeln!(f, "global {} {}: {}", kind, global.name, global.ty)?,
            }
        }
        for function in &self.functions {
            let params: Vec<String> = function
                .params
                .iter()
                .map(|p| {
                    let value = self.value(*p);
                    format!(
                        "%{}: {}",
                        value.name.as_deref().unwrap_or("_"),
                        value.ty
                    )
                })
                .collect();
            writeln!(
                f,
                "fn {}({}) -> {} {{",
                function.name,
                params.join(", "),
                function.return_type
            )?;
            for block in &function.blocks {
                match &block.label {
                    Some(label) => writeln!(f, "block{} ({}):", block.id.0, label)?,
                    None => writeln!(f, "block{}:", block.id.0)?,
                }
                for id in &block.instructions {
                    writeln!(f, "  {}", self.value_dump(*id))?;
                }
                match &block.terminator {
                    Some(Terminator::Ret(Some(value))) => {
                        writeln!(f, "  ret %{}", value.0)?;
                    }
                    Some(Terminator::Ret(None)) => writeln!(f, "  ret")?,
                    Some(Terminator::Br(target)) => writeln!(f, "  br block{}", target.0)?,
                    Some(Terminator::CondBr {
                        cond,
                        then_block,
                        else_block,
                    }) => writeln!(
                        f,
                        "  cond_br %{}, block{}, block{}",
                        cond.0, then_block.0, else_block.0
                    )?,
                    None => {}
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

impl IrModule {
    fn value_dump(&self, id: ValueId) -> String {
        let value = self.value(id);
        match &value.kind {
            IrValueKind::Parameter { index } => format!("%{} = param {}", id.0, index),
            IrValueKind::Constant(c) => match c {
                IrConst::Int(v) => format!("%{} = const {} : {}", id.0, v, value.ty),
                IrConst::Float(v) => format!("%{} = const {} : {}", id.0, v, value.ty),
                IrConst::Bool(v) => format!("%{} = const {} : {}", id.0, v, value.ty),
                IrConst::Str(v) => format!("%{} = const {:?} : {}", id.0, v, value.ty),
                IrConst::Null => format!("%{} = null : {}", id.0, value.ty),
            },
            IrValueKind::Global { name } => format!("%{} = global {}", id.0, name),
            IrValueKind::Instruction { opcode, operands } => {
                let operands: Vec<String> =
                    operands.iter().map(|o| format!("%{}", o.0)).collect();
                format!(
                    "%{} = {} {} : {}",
                    id.0,
                    opcode.mnemonic(),
                    operands.join(", "),
                    value.ty
                )
            }
        }
    }
}
