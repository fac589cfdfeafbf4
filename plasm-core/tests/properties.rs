//! Quantified properties: the implicit-conversion lattice, the literal
//! widening rule, and random-program compilation. Uses a small
//! hand-rolled strategy/runner pair over `rand`.

mod harness;

use harness::{collect_exprs, compile_src, typecheck_src};
use plasm_core::types::{can_implicitly_upcast, Primitive, TypeCtx};
use rand::Rng;

// ----------------------------------------------------------------
// Minimal property-testing scaffolding
// ----------------------------------------------------------------

pub trait Strategy {
    type Value: std::fmt::Debug + Clone;
    fn generate<R: Rng>(&self, rng: &mut R) -> Self::Value;
}

pub struct PropRunner {
    iterations: usize,
}

impl PropRunner {
    pub fn new(iterations: usize) -> Self {
        Self { iterations }
    }

    pub fn run<S, F>(&self, strategy: S, property: F)
    where
        S: Strategy,
        F: Fn(S::Value) -> Result<(), String>,
    {
        let mut rng = rand::thread_rng();
        for i in 0..self.iterations {
            let input = strategy.generate(&mut rng);
            if let Err(msg) = property(input.clone()) {
                panic!(
                    "property failed at iteration {}: input {:?}: {}",
                    i + 1,
                    input,
                    msg
                );
            }
        }
    }
}

/// Two operands and an arithmetic/comparison operator.
struct BinExprStrategy;

impl Strategy for BinExprStrategy {
    type Value = (i64, i64, &'static str);

    fn generate<R: Rng>(&self, rng: &mut R) -> Self::Value {
        let ops = ["+", "-", "*", "/", "%"];
        (
            rng.gen_range(-1_000_000..=1_000_000),
            rng.gen_range(-1_000_000..=1_000_000),
            ops[rng.gen_range(0..ops.len())],
        )
    }
}

// ----------------------------------------------------------------
// Lattice properties
// ----------------------------------------------------------------

#[test]
fn lattice_is_reflexive() {
    let ctx = TypeCtx::new();
    for p in Primitive::ALL {
        let ty = ctx.prim(p);
        assert!(can_implicitly_upcast(&ctx, ty, ty), "{p} not reflexive");
    }
}

#[test]
fn lattice_is_monotone_within_signedness() {
    let ctx = TypeCtx::new();
    let unsigned = [Primitive::U8, Primitive::U16, Primitive::U32, Primitive::U64];
    let signed = [Primitive::I8, Primitive::I16, Primitive::I32, Primitive::I64];
    for family in [unsigned, signed] {
        for (i, from) in family.iter().enumerate() {
            for to in &family[i + 1..] {
                assert!(
                    can_implicitly_upcast(&ctx, ctx.prim(*from), ctx.prim(*to)),
                    "{from} -> {to} should be implicit"
                );
                assert!(
                    !can_implicitly_upcast(&ctx, ctx.prim(*to), ctx.prim(*from)),
                    "{to} -> {from} should not be implicit"
                );
            }
        }
    }
}

#[test]
fn u64_to_i64_is_excluded() {
    let ctx = TypeCtx::new();
    assert!(!can_implicitly_upcast(
        &ctx,
        ctx.prim(Primitive::U64),
        ctx.prim(Primitive::I64)
    ));
}

#[test]
fn signed_to_unsigned_is_always_excluded() {
    let ctx = TypeCtx::new();
    let signed = [Primitive::I8, Primitive::I16, Primitive::I32, Primitive::I64];
    let unsigned = [Primitive::U8, Primitive::U16, Primitive::U32, Primitive::U64];
    for from in signed {
        for to in unsigned {
            assert!(
                !can_implicitly_upcast(&ctx, ctx.prim(from), ctx.prim(to)),
                "{from} -> {to} must not be implicit"
            );
        }
    }
}

#[test]
fn unsigned_widens_into_wider_signed() {
    let ctx = TypeCtx::new();
    assert!(can_implicitly_upcast(
        &ctx,
        ctx.prim(Primitive::U8),
        ctx.prim(Primitive::I16)
    ));
    assert!(!can_implicitly_upcast(
        &ctx,
        ctx.prim(Primitive::U16),
        ctx.prim(Primitive::I16)
    ));
}

#[test]
fn integer_to_float_respects_width() {
    let ctx = TypeCtx::new();
    assert!(can_implicitly_upcast(
        &ctx,
        ctx.prim(Primitive::U32),
        ctx.prim(Primitive::F64)
    ));
    assert!(can_implicitly_upcast(
        &ctx,
        ctx.prim(Primitive::I32),
        ctx.prim(Primitive::F32)
    ));
    assert!(!can_implicitly_upcast(
        &ctx,
        ctx.prim(Primitive::U64),
        ctx.prim(Primitive::F32)
    ));
}

#[test]
fn float_widening_is_one_way() {
    let ctx = TypeCtx::new();
    assert!(can_implicitly_upcast(
        &ctx,
        ctx.prim(Primitive::F32),
        ctx.prim(Primitive::F64)
    ));
    assert!(!can_implicitly_upcast(
        &ctx,
        ctx.prim(Primitive::F64),
        ctx.prim(Primitive::F32)
    ));
}

#[test]
fn any_is_top_in_both_directions() {
    let ctx = TypeCtx::new();
    for p in Primitive::ALL {
        assert!(can_implicitly_upcast(&ctx, ctx.prim(p), ctx.any()));
        assert!(can_implicitly_upcast(&ctx, ctx.any(), ctx.prim(p)));
    }
}

// ----------------------------------------------------------------
// Literal widening
// ----------------------------------------------------------------

#[test]
fn integer_literals_adopt_every_declared_integer_type() {
    for p in Primitive::ALL {
        if !p.is_integer() {
            continue;
        }
        let src = format!("fn t() {p} {{ final {p} x = 7; return x; }}");
        compile_src(&src);
    }
}

// ----------------------------------------------------------------
// Random programs
// ----------------------------------------------------------------

#[test]
fn random_arithmetic_programs_compile_to_valid_modules() {
    let runner = PropRunner::new(25);
    runner.run(BinExprStrategy, |(a, b, op)| {
        let src = format!("fn t() i64 {{ return {a} {op} {b}; }}");
        let artifact = compile_src(&src);
        if wat::parse_str(&artifact.wat).is_err() {
            return Err("emitted text does not assemble".to_string());
        }
        Ok(())
    });
}

#[test]
fn well_typed_programs_have_fully_populated_type_tables() {
    let src = r#"
fn fib(u64 n) u64 {
    if n < 2 { return n; }
    return fib(n - 1) + fib(n - 2);
}
fn t() u64 { return fib(10 as u64); }
"#;
    let (program, tc) = typecheck_src(src);
    assert!(tc.diagnostics.is_empty());
    for expr in collect_exprs(&program) {
        assert!(tc.table.get(expr.id).is_some());
    }
}
