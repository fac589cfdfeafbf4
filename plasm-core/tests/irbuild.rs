mod harness;

use harness::build_module;
use plasm_core::ir::*;

/// All instruction values of a function, in block order.
fn instructions<'a>(module: &'a IrModule, name: &str) -> Vec<&'a IrValue> {
    let function = module.function(name).expect("function not found");
    function
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .map(|id| module.value(*id))
        .collect()
}

fn has_opcode(module: &IrModule, name: &str, opcode: Opcode) -> bool {
    instructions(module, name).iter().any(|v| {
        matches!(&v.kind, IrValueKind::Instruction { opcode: op, .. } if *op == opcode)
    })
}

fn call_targets(module: &IrModule, name: &str) -> Vec<String> {
    instructions(module, name)
        .iter()
        .filter_map(|v| match &v.kind {
            IrValueKind::Instruction { opcode: Opcode::Call, operands } => {
                match &module.value(operands[0]).kind {
                    IrValueKind::Constant(IrConst::Str(s)) => Some(s.clone()),
                    _ => None,
                }
            }
            _ => None,
        })
        .collect()
}

#[test]
fn const_becomes_global_with_initializer() {
    let module = build_module("const x = 42;");
    let global = module.global("x").expect("global x missing");
    assert!(global.is_constant);
    assert_eq!(global.ty, IrType::I64);
    let init = global.init.expect("global x has no initializer");
    assert!(matches!(
        module.value(init).kind,
        IrValueKind::Constant(IrConst::Int(42))
    ));
}

#[test]
fn function_lowering_emits_arithmetic() {
    let module = build_module("fn add(u64 a, u64 b) u64 { return a + b; }");
    let function = module.function("add").expect("add missing");
    assert_eq!(function.params.len(), 2);
    assert_eq!(function.return_type, IrType::U64);
    assert!(has_opcode(&module, "add", Opcode::Add));
}

#[test]
fn value_ids_are_unique() {
    let module = build_module(
        "const x = 1; fn t(u64 a) u64 { final u64 b = a + 1; return b * 2; }",
    );
    let mut seen = std::collections::BTreeSet::new();
    for value in module.values() {
        assert!(seen.insert(value.id), "duplicate value id {:?}", value.id);
    }
}

#[test]
fn block_ids_are_unique_across_functions() {
    let module = build_module(
        "fn t(bool c) void { if c { } } fn u(bool c) void { while c { } }",
    );
    let mut seen = std::collections::BTreeSet::new();
    for function in &module.functions {
        for block in &function.blocks {
            assert!(seen.insert(block.id), "duplicate block id {:?}", block.id);
        }
    }
}

#[test]
fn every_block_terminated_or_last() {
    let src = r#"
fn t(bool c, u64 n) u64 {
    let u64 acc = 0;
    while acc < n { acc = acc + 1; }
    if c { return acc; } else { acc = 0; }
    return acc;
}
"#;
    let module = build_module(src);
    for function in &module.functions {
        let last = function.blocks.len().saturating_sub(1);
        for (i, block) in function.blocks.iter().enumerate() {
            assert!(
                block.is_terminated() || i == last,
                "unterminated non-final block {:?} in {}",
                block.id,
                function.name
            );
        }
    }
}

#[test]
fn if_lowering_creates_then_else_merge() {
    let module = build_module("fn t(bool c) void { if c { } else { } }");
    let function = module.function("t").expect("t missing");
    let labels: Vec<&str> = function
        .blocks
        .iter()
        .filter_map(|b| b.label.as_deref())
        .collect();
    assert_eq!(labels, vec!["entry", "then", "else", "merge"]);
    assert!(matches!(
        function.blocks[0].terminator,
        Some(Terminator::CondBr { .. })
    ));
}

#[test]
fn while_lowering_creates_header_body_exit() {
    let module = build_module("fn t(u64 n) void { while n > 0 { n = n - 1; } }");
    let function = module.function("t").expect("t missing");
    let labels: Vec<&str> = function
        .blocks
        .iter()
        .filter_map(|b| b.label.as_deref())
        .collect();
    assert_eq!(labels, vec!["entry", "while_header", "while_body", "while_exit"]);
}

#[test]
fn lambda_is_lifted_to_a_function() {
    let src = "fn t() u64 { final f = @(u64 x) => x + 1; return f(42 as u64); }";
    let module = build_module(src);
    let lifted: Vec<&IrFunction> = module
        .functions
        .iter()
        .filter(|f| f.name.starts_with("__lambda_"))
        .collect();
    assert_eq!(lifted.len(), 1);
    assert_eq!(lifted[0].params.len(), 1);
    assert_eq!(lifted[0].return_type, IrType::U64);
    assert!(has_opcode(&module, "t", Opcode::CallIndirect));
    assert!(has_opcode(&module, "t", Opcode::FuncRef));
}

#[test]
fn operator_overload_lowers_to_named_function() {
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
    let self_param = module.value(op.params[0]);
    assert_eq!(self_param.name.as_deref(), Some("self"));
    assert_eq!(self_param.ty, IrType::Named("Point".to_string()));
    // The call site uses the lowered function, not an add opcode.
    assert!(call_targets(&module, "t").contains(&"Point_op_add".to_string()));
    assert!(!has_opcode(&module, "t", Opcode::Add));
}

#[test]
fn constructor_lowering_builds_and_initialises() {
    let src = r#"
class Point {
    final u64 x;
    final u64 y;
    constructor(u64 a, u64 b) { }
}
fn t() Point { return new Point(1 as u64, 2 as u64); }
"#;
    let module = build_module(src);
    assert!(module.function("Point_constructor_0").is_some());
    assert!(has_opcode(&module, "t", Opcode::StructNew));
    assert!(call_targets(&module, "t").contains(&"Point_constructor_0".to_string()));
    let def = module.type_def("Point").expect("Point type def missing");
    match &def.kind {
        IrTypeDefKind::Struct { fields } => {
            assert_eq!(fields.len(), 2);
            assert!(!fields[0].mutable);
        }
        other => panic!("expected struct, got {other:?}"),
    }
}

#[test]
fn cast_emits_cast_instruction() {
    let module = build_module("fn t() u8 { final u64 x = 100; return x as u8; }");
    let cast = instructions(&module, "t")
        .into_iter()
        .find(|v| {
            matches!(
                &v.kind,
                IrValueKind::Instruction { opcode: Opcode::Cast, .. }
            )
        })
        .expect("no cast instruction");
    assert_eq!(cast.ty, IrType::U8);
}

#[test]
fn array_literal_lowering() {
    let module = build_module("fn t() u64 { final xs = [1, 2, 3]; return xs[0 as u32]; }");
    assert!(has_opcode(&module, "t", Opcode::ArrayNewDefault));
    assert!(has_opcode(&module, "t", Opcode::ArrayGet));
    let sets = instructions(&module, "t")
        .iter()
        .filter(|v| {
            matches!(
                &v.kind,
                IrValueKind::Instruction { opcode: Opcode::ArraySet, .. }
            )
        })
        .count();
    assert_eq!(sets, 3);
}

#[test]
fn assignment_emits_store() {
    let module = build_module("fn t() u64 { let u64 x = 1; x = 2; return x; }");
    assert!(has_opcode(&module, "t", Opcode::Store));
}

#[test]
fn uninitialised_variable_allocates() {
    let module = build_module("fn t() void { let u64 x; }");
    assert!(has_opcode(&module, "t", Opcode::Alloca));
}

#[test]
fn static_type_test_folds_to_constant() {
    let module = build_module("fn t(u64 x) bool { return x is u64; }");
    assert!(!has_opcode(&module, "t", Opcode::RefTest));
}

#[test]
fn dynamic_type_test_emits_ref_test() {
    let module = build_module("fn t(any x) bool { return x is u64; }");
    assert!(has_opcode(&module, "t", Opcode::RefTest));
}

#[test]
fn interpolation_lowers_to_runtime_helpers() {
    let module = build_module(r#"fn t() string { return "v=${1}"; }"#);
    let targets = call_targets(&module, "t");
    assert!(targets.contains(&"__external_itos".to_string()));
    assert!(targets.contains(&"__external_concat".to_string()));
}

#[test]
fn method_call_passes_self_first() {
    let src = r#"
class Counter {
    final u64 n;
    fn get() u64 { return n; }
}
fn t(Counter c) u64 { return c.get(); }
"#;
    let module = build_module(src);
    let get = module.function("Counter_get").expect("method missing");
    assert_eq!(get.params.len(), 1);
    assert_eq!(module.value(get.params[0]).name.as_deref(), Some("self"));
    assert!(call_targets(&module, "t").contains(&"Counter_get".to_string()));
}
