mod harness;

use harness::{assert_error, collect_exprs, typecheck_src};

fn check(src: &str) -> Vec<plasm_core::diagnostic::Diagnostic> {
    typecheck_src(src).1.diagnostics
}

fn check_clean(src: &str) {
    let diags = check(src);
    assert!(
        diags.is_empty(),
        "unexpected diagnostics: {:?}",
        diags.iter().map(|d| &d.message).collect::<Vec<_>>()
    );
}

#[test]
fn unsigned_widening_is_implicit() {
    check_clean("fn t() u16 { final u8 x = 10; final u16 y = x; return y; }");
}

#[test]
fn unsigned_to_wider_signed_is_implicit() {
    check_clean("fn t() i64 { final u8 x = 10; final i64 y = x; return y; }");
}

#[test]
fn u64_to_i64_requires_explicit_cast() {
    let diags = check("fn t() i64 { final u64 x = 100; final i64 y = x; return y; }");
    assert_error(&diags, "cannot assign");
}

#[test]
fn signed_to_unsigned_is_never_implicit() {
    let diags = check("fn t() void { final i8 x = 1; final u16 y = x; }");
    assert_error(&diags, "cannot assign");
}

#[test]
fn integer_to_float_needs_enough_width() {
    check_clean("fn t() f64 { final u32 x = 1; final f64 y = x; return y; }");
    let diags = check("fn t() void { final u64 x = 1; final f32 y = x; }");
    assert_error(&diags, "cannot assign");
}

#[test]
fn literal_adopts_declared_integer_type() {
    check_clean("fn t() u8 { final u8 x = 10; return x; }");
}

#[test]
fn bare_integer_literal_is_i64() {
    check_clean("fn t() i64 { final x = 1; return x; }");
    let diags = check("fn t() u8 { final x = 1; return x; }");
    assert_error(&diags, "return type mismatch");
}

#[test]
fn float_literal_is_f64() {
    check_clean("fn t() f64 { final x = 1.5; return x; }");
}

#[test]
fn condition_must_be_bool() {
    let diags = check("fn t() void { if 1 { } }");
    assert_error(&diags, "condition must be of type bool");
    let diags = check("fn t() void { while 1 { } }");
    assert_error(&diags, "condition must be of type bool");
}

#[test]
fn bare_return_only_in_void() {
    check_clean("fn t() void { return; }");
    let diags = check("fn t() u64 { return; }");
    assert_error(&diags, "return type mismatch");
}

#[test]
fn arithmetic_requires_numeric_operands() {
    let diags = check(r#"fn t() void { final x = "a" + 1; }"#);
    assert_error(&diags, "requires numeric operands");
}

#[test]
fn comparison_yields_bool() {
    check_clean("fn t(u64 a, u64 b) bool { return a < b; }");
}

#[test]
fn logical_operators_require_bool() {
    check_clean("fn t(bool a, bool b) bool { return a && b; }");
    let diags = check("fn t(u64 a) bool { return a || true; }");
    assert_error(&diags, "requires bool operands");
}

#[test]
fn call_arity_mismatch() {
    let diags = check("fn f(u64 a) u64 { return a; } fn t() u64 { return f(1 as u64, 2 as u64); }");
    assert_error(&diags, "argument count");
}

#[test]
fn call_argument_type_mismatch() {
    let diags = check("fn f(u8 a) u8 { return a; } fn t() void { f(1000 as u64); }");
    assert_error(&diags, "argument type mismatch");
}

#[test]
fn operator_overload_resolves() {
    let src = r#"
class Point {
    final u64 x;
    final u64 y;
    op(+)(Point other) Point { return self; }
}
fn t(Point a, Point b) Point { return a + b; }
"#;
    check_clean(src);
}

#[test]
fn operator_overload_checks_operand_type() {
    let src = r#"
class Point {
    final u64 x;
    op(+)(Point other) Point { return self; }
}
fn t(Point a) Point { return a + 1; }
"#;
    let diags = check(src);
    assert_error(&diags, "expects");
}

#[test]
fn missing_operator_overload_is_reported() {
    let src = r#"
class Point { final u64 x; }
fn t(Point a, Point b) Point { return a + b; }
"#;
    let diags = check(src);
    assert_error(&diags, "not defined for type Point");
}

#[test]
fn class_without_constructors() {
    let src = "class C { final u64 x; } fn t() C { return new C(); }";
    let diags = check(src);
    assert_error(&diags, "no constructors defined");
}

#[test]
fn constructor_arity_filter() {
    let src = "class C { constructor(u64 a) { } } fn t() C { return new C(); }";
    let diags = check(src);
    assert_error(&diags, "takes 0 arguments");
}

#[test]
fn constructor_overload_by_type() {
    let src = r#"
class C {
    constructor(u64 a) { }
    constructor(string s) { }
}
fn t() C { return new C("hi"); }
"#;
    check_clean(src);
}

#[test]
fn constructor_type_mismatch() {
    let src = "class C { constructor(string s) { } } fn t() C { return new C(1 as u64); }";
    let diags = check(src);
    assert_error(&diags, "matches the argument types");
}

#[test]
fn lambda_types_as_function() {
    let (program, tc) = typecheck_src(
        "fn t() u64 { final f = @(u64 x) => x + 1; return f(42 as u64); }",
    );
    assert!(tc.diagnostics.is_empty());
    let lambda = collect_exprs(&program)
        .into_iter()
        .find(|e| matches!(e.kind, plasm_core::ast::ExprKind::Lambda { .. }))
        .expect("no lambda in program");
    let ty = tc.table.get(lambda.id).expect("lambda has no recorded type");
    assert_eq!(tc.types.display(ty), "(u64) => u64");
}

#[test]
fn lambda_block_body_infers_return_type() {
    check_clean(
        "fn t() u64 { final f = @(u64 x) { return x; }; return f(1 as u64); }",
    );
}

#[test]
fn member_access_and_method_calls() {
    let src = r#"
class Point {
    final u64 x;
    fn get() u64 { return x; }
}
fn t(Point p) u64 { return p.x + p.get(); }
"#;
    check_clean(src);
}

#[test]
fn unknown_member_is_reported() {
    let src = "class Point { final u64 x; } fn t(Point p) u64 { return p.z; }";
    let diags = check(src);
    assert_error(&diags, "unknown member z");
}

#[test]
fn self_outside_class() {
    let diags = check("fn t() void { self; }");
    assert_error(&diags, "`self` used outside of a class");
}

#[test]
fn array_allocation_and_indexing() {
    check_clean("fn t() u64 { final xs = new u64[10]; return xs[0 as u32]; }");
}

#[test]
fn array_size_must_be_integral() {
    let diags = check("fn t() void { final xs = new u64[1.5]; }");
    assert_error(&diags, "array size must be an integer");
}

#[test]
fn array_literal_element_mismatch() {
    let diags = check(r#"fn t() void { final xs = [1, "a"]; }"#);
    assert_error(&diags, "array element type mismatch");
}

#[test]
fn empty_array_literal_is_array_of_any() {
    check_clean("fn t() void { final array<any> xs = []; }");
}

#[test]
fn array_length_member() {
    check_clean("fn t(array<u64> xs) u32 { return xs.length; }");
}

#[test]
fn interpolation_is_string_typed() {
    check_clean(r#"fn t() string { return "v=${1} ${1.5} ${true}"; }"#);
}

#[test]
fn interpolating_a_class_value_is_rejected() {
    let src = r#"class C { final u64 x; } fn t(C c) string { return "${c}"; }"#;
    let diags = check(src);
    assert_error(&diags, "cannot interpolate");
}

#[test]
fn any_is_compatible_both_ways() {
    check_clean("fn t(any v) u64 { final u64 x = v; return x; }");
    check_clean("fn t(u64 v) any { return v; }");
}

#[test]
fn broken_declaration_does_not_abort_analysis() {
    // Both declarations are faulty; both must be diagnosed.
    let diags = check(
        "fn bad() u8 { final u64 x = 1; return x; } fn also_bad() void { if 1 { } }",
    );
    assert_error(&diags, "return type mismatch");
    assert_error(&diags, "condition must be of type bool");
}

#[test]
fn every_expression_gets_a_type() {
    let src = r#"
class Point {
    final u64 x;
    op(+)(Point other) Point { return self; }
}
fn helper(u64 a) u64 { return a * 2; }
fn t(Point p, bool c) u64 {
    final f = @(u64 x) => x + 1;
    let u64 acc = 0;
    while acc < 10 { acc = acc + 1; }
    if c { acc = helper(acc); }
    final q = p + p;
    final xs = [1, 2, 3];
    return f(acc) + xs[0 as u32] + q.x;
}
"#;
    let (program, tc) = typecheck_src(src);
    assert!(
        tc.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        tc.diagnostics.iter().map(|d| &d.message).collect::<Vec<_>>()
    );
    for expr in collect_exprs(&program) {
        assert!(
            tc.table.get(expr.id).is_some(),
            "expression without a type: {:?}",
            expr.kind
        );
    }
}
