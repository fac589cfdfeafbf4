//! Semantic types and the implicit-conversion lattice.
//!
//! Types are interned in an arena (`TypeCtx`) and referenced by
//! `TypeId`; structural queries go through `TypeCtx::get`.

use core::fmt;

/// Built-in primitive types of the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Primitive {
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
}

impl Primitive {
    pub const ALL: [Primitive; 12] = [
        Primitive::U8,
        Primitive::U16,
        Primitive::U32,
        Primitive::U64,
        Primitive::I8,
        Primitive::I16,
        Primitive::I32,
        Primitive::I64,
        Primitive::F32,
        Primitive::F64,
        Primitive::Bool,
        Primitive::Str,
    ];

    pub fn bit_width(&self) -> u32 {
        match self {
            Primitive::U8 | Primitive::I8 => 8,
            Primitive::U16 | Primitive::I16 => 16,
            Primitive::U32 | Primitive::I32 | Primitive::F32 => 32,
            Primitive::U64 | Primitive::I64 | Primitive::F64 => 64,
            Primitive::Bool => 1,
            Primitive::Str => 0,
        }
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::U64
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64
        )
    }

    pub fn is_integer(&self) -> bool {
        self.is_unsigned() || self.is_signed()
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_floating()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Bool => "bool",
            Primitive::Str => "string",
        }
    }

    /// The primitive named by `name`, if any.
    pub fn from_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.iter().copied().find(|p| p.name() == name)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identifier for a type stored in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Prim(Primitive),
    Void,
    Any,
    /// A user class, by name.
    Class(String),
    /// A parameterised type such as `array<T>` or `tuple`.
    Generic { name: String, args: Vec<TypeId> },
    Function { params: Vec<TypeId>, result: TypeId },
}

/// Arena-based type context.
#[derive(Debug)]
pub struct TypeCtx {
    arena: Vec<TypeKind>,
    prims: [TypeId; 12],
    void_ty: TypeId,
    any_ty: TypeId,
}

impl TypeCtx {
    pub fn new() -> Self {
        let mut arena = Vec::new();
        let mut prims = [TypeId(0); 12];
        for (i, p) in Primitive::ALL.iter().enumerate() {
            prims[i] = TypeId(arena.len());
            arena.push(TypeKind::Prim(*p));
        }
        let void_ty = TypeId(arena.len());
        arena.push(TypeKind::Void);
        let any_ty = TypeId(arena.len());
        arena.push(TypeKind::Any);
        Self {
            arena,
            prims,
            void_ty,
            any_ty,
        }
    }

    pub fn prim(&self, p: Primitive) -> TypeId {
        let idx = Primitive::ALL.iter().position(|q| *q == p).unwrap_or(0);
        self.prims[idx]
    }

    pub fn void(&self) -> TypeId {
        self.void_ty
    }

    pub fn any(&self) -> TypeId {
        self.any_ty
    }

    pub fn bool(&self) -> TypeId {
        self.prim(Primitive::Bool)
    }

    pub fn string(&self) -> TypeId {
        self.prim(Primitive::Str)
    }

    pub fn i64(&self) -> TypeId {
        self.prim(Primitive::I64)
    }

    pub fn f64(&self) -> TypeId {
        self.prim(Primitive::F64)
    }

    pub fn class(&mut self, name: impl Into<String>) -> TypeId {
        self.store(TypeKind::Class(name.into()))
    }

    pub fn generic(&mut self, name: impl Into<String>, args: Vec<TypeId>) -> TypeId {
        self.store(TypeKind::Generic {
            name: name.into(),
            args,
        })
    }

    pub fn array(&mut self, elem: TypeId) -> TypeId {
        self.generic("array", vec![elem])
    }

    pub fn function(&mut self, params: Vec<TypeId>, result: TypeId) -> TypeId {
        self.store(TypeKind::Function { params, result })
    }

    fn store(&mut self, kind: TypeKind) -> TypeId {
        // Structural interning keeps equality checks cheap.
        if let Some(idx) = self.arena.iter().position(|k| *k == kind) {
            return TypeId(idx);
        }
        let id = TypeId(self.arena.len());
        self.arena.push(kind);
        id
    }

    pub fn get(&self, id: TypeId) -> TypeKind {
        self.arena[id.0].clone()
    }

    /// The primitive behind `id`, if it is one.
    pub fn as_prim(&self, id: TypeId) -> Option<Primitive> {
        match &self.arena[id.0] {
            TypeKind::Prim(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        self.as_prim(id).map(|p| p.is_numeric()).unwrap_or(false)
    }

    pub fn is_class(&self, id: TypeId) -> bool {
        matches!(&self.arena[id.0], TypeKind::Class(_))
    }

    pub fn is_any(&self, id: TypeId) -> bool {
        matches!(&self.arena[id.0], TypeKind::Any)
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(&self.arena[id.0], TypeKind::Void)
    }

    /// Human-readable form: `u64`, `Point`, `array<u64>`, `(u64) => u64`.
    pub fn display(&self, id: TypeId) -> String {
        self.display_kind(&self.get(id))
    }

    /// Display helper for an already-fetched kind.
    pub fn display_kind(&self, kind: &TypeKind) -> String {
        match kind {
            TypeKind::Prim(p) => p.name().to_string(),
            TypeKind::Void => "void".to_string(),
            TypeKind::Any => "any".to_string(),
            TypeKind::Class(name) => name.clone(),
            TypeKind::Generic { name, args } => {
                let args: Vec<String> = args.iter().map(|a| self.display(*a)).collect();
                format!("{}<{}>", name, args.join(", "))
            }
            TypeKind::Function { params, result } => {
                let params: Vec<String> = params.iter().map(|p| self.display(*p)).collect();
                format!("({}) => {}", params.join(", "), self.display(*result))
            }
        }
    }
}

impl Default for TypeCtx {
    fn default() -> Self {
        TypeCtx::new()
    }
}

/// The implicit widening lattice.
///
/// Permits: identity, conversions to/from `any`, unsigned and signed
/// widening within the same signedness, unsigned-to-wider-signed,
/// integer-to-float of at-least-equal width, and `f32 -> f64`.
/// Notably `u64 -> i64` is excluded, as is every signed-to-unsigned
/// conversion; those require an explicit `as`.
pub fn can_implicitly_upcast(ctx: &TypeCtx, from: TypeId, to: TypeId) -> bool {
    if from == to || ctx.get(from) == ctx.get(to) {
        return true;
    }
    if ctx.is_any(from) || ctx.is_any(to) {
        return true;
    }
    let (f, t) = match (ctx.as_prim(from), ctx.as_prim(to)) {
        (Some(f), Some(t)) => (f, t),
        _ => return false,
    };
    if f.is_unsigned() && t.is_unsigned() && f.bit_width() < t.bit_width() {
        return true;
    }
    if f.is_unsigned() && t.is_signed() && f.bit_width() < t.bit_width() {
        return true;
    }
    if f.is_signed() && t.is_signed() && f.bit_width() < t.bit_width() {
        return true;
    }
    if f.is_integer() && t.is_floating() && f.bit_width() <= t.bit_width() {
        return true;
    }
    if f == Primitive::F32 && t == Primitive::F64 {
        return true;
    }
    false
}

/// Argument/assignment compatibility is exactly the implicit lattice.
pub fn is_compatible_with(ctx: &TypeCtx, from: TypeId, to: TypeId) -> bool {
    can_implicitly_upcast(ctx, from, to)
}
