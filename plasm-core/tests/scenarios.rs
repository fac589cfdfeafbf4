//! End-to-end scenarios: each compiles a small program and checks the
//! produced IR/WAT fragments or the reported diagnostics.

mod harness;

use harness::{assert_error, build_module, collect_exprs, compile_errs, compile_src, parse_clean,
              typecheck_src};
use plasm_core::ast::{ExprKind, TypeSpecKind};
use plasm_core::ir::{IrConst, IrType, IrValueKind, Opcode};
use plasm_core::types::Primitive;

#[test]
fn const_and_function() {
    let src = "const x = 42; fn add(u64 a, u64 b) u64 { return a + b; }";
    let module = build_module(src);
    let global = module.global("x").expect("global x missing");
    let init = global.init.expect("missing initializer");
    assert!(matches!(
        module.value(init).kind,
        IrValueKind::Constant(IrConst::Int(42))
    ));
    let add = module.function("add").expect("add missing");
    assert_eq!(add.params.len(), 2);

    let artifact = compile_src(src);
    assert!(artifact.wat.contains("(global $x i64"));
    assert!(artifact
        .wat
        .contains("(func $add (param $a i64) (param $b i64) (result i64)"));
    assert!(artifact.wat.contains("i64.add"));
}

#[test]
fn implicit_upcast() {
    compile_src("fn t() u16 { final u8 x = 10; final u16 y = x; return y; }");
}

#[test]
fn forbidden_implicit_cast() {
    let diags =
        compile_errs("fn t() i64 { final u64 x = 100; final i64 y = x; return y; }");
    assert_error(&diags, "cannot assign");
}

#[test]
fn explicit_downcast_via_as() {
    let src = "fn t() u8 { final u64 x = 100; return x as u8; }";

    let program = parse_clean(src);
    let cast = collect_exprs(&program)
        .into_iter()
        .find(|e| matches!(e.kind, ExprKind::Cast { .. }))
        .expect("no cast expression in AST");
    match &cast.kind {
        ExprKind::Cast { target, .. } => {
            assert!(matches!(target.kind, TypeSpecKind::Prim(Primitive::U8)));
        }
        _ => unreachable!(),
    }

    let module = build_module(src);
    let has_u8_cast = module.values().iter().any(|v| {
        matches!(&v.kind, IrValueKind::Instruction { opcode: Opcode::Cast, .. })
            && v.ty == IrType::U8
    });
    assert!(has_u8_cast, "no cast instruction with result type u8");

    compile_src(src);
}

#[test]
fn operator_overload() {
    let src = r#"
class Point {
    final u64 x;
    final u64 y;
    op(+)(Point other) Point { return self; }
}
fn t(Point a, Point b) Point { return a + b; }
"#;
    let module = build_module(src);
    let op = module
        .function("Point_op_add")
        .expect("Point_op_add missing");
    assert_eq!(op.params.len(), 2);
    assert_eq!(module.value(op.params[0]).name.as_deref(), Some("self"));
    assert_eq!(
        module.value(op.params[0]).ty,
        IrType::Named("Point".to_string())
    );
    assert_eq!(
        module.value(op.params[1]).ty,
        IrType::Named("Point".to_string())
    );

    let artifact = compile_src(src);
    assert!(artifact.wat.contains("call $Point_op_add"));
}

#[test]
fn lambda_typing_and_call() {
    let src = "fn t() u64 { final f = @(u64 x) => x + 1; return f(42 as u64); }";

    let (program, tc) = typecheck_src(src);
    assert!(tc.diagnostics.is_empty());
    let lambda = collect_exprs(&program)
        .into_iter()
        .find(|e| matches!(e.kind, ExprKind::Lambda { .. }))
        .expect("no lambda");
    let ty = tc.table.get(lambda.id).expect("untyped lambda");
    assert_eq!(tc.types.display(ty), "(u64) => u64");

    let module = build_module(src);
    assert_eq!(
        module
            .functions
            .iter()
            .filter(|f| f.name.starts_with("__lambda_"))
            .count(),
        1
    );
    let uses_indirect = module.values().iter().any(|v| {
        matches!(
            &v.kind,
            IrValueKind::Instruction { opcode: Opcode::CallIndirect, .. }
        )
    });
    assert!(uses_indirect, "call site does not use call_indirect");

    compile_src(src);
}

#[test]
fn wrong_lambda_arity() {
    let diags =
        compile_errs("fn t() u64 { final f = @(u64 x, u64 y) => x + y; return f(42); }");
    assert_error(&diags, "argument count");
}

#[test]
fn class_without_constructors_reports() {
    let diags = compile_errs("class C { final u64 x; } fn t() C { return new C(); }");
    assert_error(&diags, "no constructors defined");
}

#[test]
fn every_lambda_gets_exactly_one_lifted_function() {
    let src = r#"
fn t() u64 {
    final f = @(u64 x) => x + 1;
    final g = @(u64 x) => x * 2;
    return f(1 as u64) + g(2 as u64);
}
"#;
    let program = parse_clean(src);
    let lambda_count = collect_exprs(&program)
        .iter()
        .filter(|e| matches!(e.kind, ExprKind::Lambda { .. }))
        .count();
    let module = build_module(src);
    let lifted = module
        .functions
        .iter()
        .filter(|f| f.name.starts_with("__lambda_"))
        .count();
    assert_eq!(lambda_count, lifted);
}
