mod harness;

use harness::{build_module, compile_src};

#[test]
fn emitted_text_parses_as_wasm() {
    let sources = [
        "const x = 42; fn add(u64 a, u64 b) u64 { return a + b; }",
        "fn t(bool c) u64 { if c { return 1 as u64; } return 2 as u64; }",
        "fn t(u64 n) u64 { let u64 acc = 0; while acc < n { acc = acc + 1; } return acc; }",
        r#"fn t() string { return "v=${42}"; }"#,
        "fn t() u64 { final xs = [1, 2, 3]; return xs[0 as u32]; }",
    ];
    for src in sources {
        let artifact = compile_src(src);
        assert!(artifact.wat.starts_with("(module"));
        wat::parse_str(&artifact.wat).expect("emitted text does not assemble");
    }
}

#[test]
fn function_count_matches_ir() {
    let src = r#"
fn helper(u64 a) u64 { return a; }
fn t() u64 { final f = @(u64 x) => x + 1; return f(helper(1 as u64)); }
"#;
    let module = build_module(src);
    let artifact = compile_src(src);
    let emitted = artifact.wat.matches("\n  (func ").count();
    assert_eq!(emitted, module.functions.len());
}

#[test]
fn global_and_function_rendering() {
    let artifact =
        compile_src("const x = 42; fn add(u64 a, u64 b) u64 { return a + b; }");
    assert!(artifact.wat.contains("(global $x i64 (i64.const 42))"));
    assert!(artifact
        .wat
        .contains("(func $add (param $a i64) (param $b i64) (result i64)"));
    assert!(artifact.wat.contains("i64.add"));
}

#[test]
fn main_procedure_exports_start() {
    let artifact = compile_src("proc $main() void { return; }");
    assert!(artifact.wat.contains("(export \"_start\")"));
}

#[test]
fn memory_is_emitted_only_when_needed() {
    let without = compile_src("fn t(u64 a) u64 { return a; }");
    assert!(!without.wat.contains("(memory"));
    let with = compile_src("fn t() u64 { let u64 x = 1; x = 2; return x; }");
    assert!(with.wat.contains("(memory (export \"memory\") 1)"));
}

#[test]
fn struct_types_render_fields() {
    let src = r#"
class Point {
    final u64 x;
    let u64 y;
    constructor(u64 a) { }
}
fn t() Point { return new Point(1 as u64); }
"#;
    let artifact = compile_src(src);
    assert!(artifact.wat.contains("(type $Point (struct"));
    assert!(artifact.wat.contains("(field $x i64)"));
    assert!(artifact.wat.contains("(field $y (mut i64))"));
    assert!(artifact.wat.contains("struct.new $Point"));
}

#[test]
fn array_types_and_operations_render() {
    let artifact =
        compile_src("fn t() u64 { final xs = [1, 2, 3]; return xs[0 as u32]; }");
    assert!(artifact.wat.contains("(type $array_i64 (array (mut i64)))"));
    assert!(artifact.wat.contains("array.new_default $array_i64"));
    assert!(artifact.wat.contains("array.set $array_i64"));
    assert!(artifact.wat.contains("array.get $array_i64"));
}

#[test]
fn conditionals_reconstruct_structured_if() {
    let artifact =
        compile_src("fn t(bool c) u64 { if c { return 1 as u64; } else { return 2 as u64; } }");
    assert!(artifact.wat.contains("\n    if\n"));
    assert!(artifact.wat.contains("\n    else\n"));
    assert!(artifact.wat.contains("\n    end\n"));
}

#[test]
fn loops_reconstruct_block_loop_pairs() {
    let artifact = compile_src(
        "fn t(u64 n) u64 { let u64 acc = 0; while acc < n { acc = acc + 1; } return acc; }",
    );
    assert!(artifact.wat.contains("block $B"));
    assert!(artifact.wat.contains("loop $L"));
    assert!(artifact.wat.contains("br_if $B"));
    assert!(artifact.wat.contains("br $L"));
    assert!(artifact.wat.contains("i64.lt_u"));
}

#[test]
fn signedness_selects_instruction_variants() {
    let signed = compile_src("fn t(i64 a, i64 b) bool { return a < b; }");
    assert!(signed.wat.contains("i64.lt_s"));
    let unsigned = compile_src("fn t(u64 a, u64 b) u64 { return a / b; }");
    assert!(unsigned.wat.contains("i64.div_u"));
}

#[test]
fn imports_are_synthesised_from_call_sites() {
    let artifact = compile_src(r#"fn t() string { return "v=${1}"; }"#);
    assert!(artifact
        .wat
        .contains("(import \"env\" \"__external_itos\" (func $__external_itos (param i64) (result (ref null $str))))"));
    assert!(artifact.wat.contains("(import \"env\" \"__external_concat\""));
}

#[test]
fn lambdas_use_table_and_call_indirect() {
    let artifact =
        compile_src("fn t() u64 { final f = @(u64 x) => x + 1; return f(2 as u64); }");
    assert!(artifact.wat.contains("(table $fns"));
    assert!(artifact.wat.contains("(elem (table $fns)"));
    assert!(artifact.wat.contains("call_indirect $fns (param i64) (result i64)"));
    assert!(artifact.wat.contains("(func $__lambda_0"));
}

#[test]
fn string_literals_build_byte_arrays() {
    let artifact = compile_src(r#"fn t() string { return "hi"; }"#);
    assert!(artifact.wat.contains("(type $str (array (mut i8)))"));
    assert!(artifact.wat.contains("array.new_fixed $str 2"));
}

#[test]
fn casts_emit_conversions() {
    let artifact = compile_src("fn t() u8 { final u64 x = 300; return x as u8; }");
    assert!(artifact.wat.contains("i32.wrap_i64"));
    let widen = compile_src("fn t(u8 a) u64 { return a as u64; }");
    assert!(widen.wat.contains("i64.extend_i32_u"));
}
