mod harness;

use harness::{assert_error, parse_clean};
use plasm_core::name_resolve::resolve_names;

fn resolve(src: &str) -> Vec<plasm_core::diagnostic::Diagnostic> {
    let program = parse_clean(src);
    resolve_names(&program).diagnostics
}

#[test]
fn undefined_identifier_is_reported() {
    let diags = resolve("fn t() u64 { return y; }");
    assert_error(&diags, "Undefined identifier: y");
}

#[test]
fn duplicate_top_level_declaration() {
    let diags = resolve("const x = 1; const x = 2;");
    assert_error(&diags, "duplicate declaration in scope: x");
}

#[test]
fn duplicate_in_same_block() {
    let diags = resolve("fn t() void { final x = 1; final x = 2; }");
    assert_error(&diags, "duplicate declaration in scope: x");
}

#[test]
fn shadowing_across_scopes_is_allowed() {
    let diags = resolve("fn t() void { final x = 1; { final x = 2; } }");
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
}

#[test]
fn parameters_resolve_in_body() {
    let diags = resolve("fn add(u64 a, u64 b) u64 { return a + b; }");
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
}

#[test]
fn assignment_to_constant_is_rejected() {
    let diags = resolve("const x = 1; fn t() void { x = 2; }");
    assert_error(&diags, "invalid assignment target: x is a constant");
}

#[test]
fn assignment_to_function_is_rejected() {
    let diags = resolve("fn f() void { } fn t() void { f = 2; }");
    assert_error(&diags, "invalid assignment target: f is a function");
}

#[test]
fn assignment_to_variable_is_allowed() {
    let diags = resolve("fn t() void { let x = 1; x = 2; }");
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
}

#[test]
fn external_bindings_are_implicit() {
    let diags = resolve("fn t() void { __external_print(1); $__external_flush(); }");
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
}

#[test]
fn unknown_class_in_constructor_call() {
    let diags = resolve("fn t() void { final p = new Foo(1); }");
    assert_error(&diags, "unknown class in constructor call: Foo");
}

#[test]
fn class_fields_and_methods_resolve() {
    let src = r#"
class Point {
    final u64 x;
    fn get() u64 { return x; }
}
"#;
    let diags = resolve(src);
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
}

#[test]
fn lambda_parameters_resolve() {
    let diags = resolve("fn t() void { final f = @(u64 x) => x + 1; }");
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
}

#[test]
fn use_before_declaration_in_block_is_reported() {
    let diags = resolve("fn t() void { final a = b; final b = 1; }");
    assert_error(&diags, "Undefined identifier: b");
}
