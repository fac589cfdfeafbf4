mod harness;

use harness::{parse_clean, parse_src};
use plasm_core::ast::*;
use plasm_core::types::Primitive;

fn first_function(program: &Program) -> &FunctionDecl {
    program
        .declarations
        .iter()
        .find_map(|d| match d {
            Declaration::Function(f) => Some(f),
            _ => None,
        })
        .expect("no function declaration")
}

fn return_value<'a>(f: &'a FunctionDecl, index: usize) -> &'a Expr {
    match &f.body.statements[index] {
        Stmt::Return(r) => r.value.as_ref().expect("return has no value"),
        other => panic!("expected return statement, got {other:?}"),
    }
}

#[test]
fn const_declaration() {
    let program = parse_clean("const x = 42;");
    match &program.declarations[0] {
        Declaration::Const(c) => {
            assert_eq!(c.name.name, "x");
            assert!(matches!(c.value.kind, ExprKind::IntLiteral(42)));
            assert!(c.ty.is_none());
        }
        other => panic!("expected const declaration, got {other:?}"),
    }
}

#[test]
fn typed_const_declaration() {
    let program = parse_clean("const u64 limit = 10;");
    match &program.declarations[0] {
        Declaration::Const(c) => {
            assert!(matches!(
                c.ty.as_ref().unwrap().kind,
                TypeSpecKind::Prim(Primitive::U64)
            ));
        }
        other => panic!("expected const declaration, got {other:?}"),
    }
}

#[test]
fn function_signature() {
    let program = parse_clean("fn add(u64 a, u64 b) u64 { return a + b; }");
    let f = first_function(&program);
    assert_eq!(f.name.name, "add");
    assert_eq!(f.params.len(), 2);
    assert_eq!(f.params[0].name.name, "a");
    assert!(matches!(
        f.return_type.kind,
        TypeSpecKind::Prim(Primitive::U64)
    ));
}

#[test]
fn procedure_requires_dollar_identifier() {
    let program = parse_clean("proc $main() void { return; }");
    match &program.declarations[0] {
        Declaration::Procedure(p) => assert_eq!(p.name.name, "$main"),
        other => panic!("expected procedure, got {other:?}"),
    }

    let (_, diags) = parse_src("proc main() void { return; }");
    assert!(diags
        .iter()
        .any(|d| d.message.contains("expected `$`-identifier")));
}

#[test]
fn cast_chain_associates_left() {
    let program = parse_clean("fn t(u64 a) u8 { return a as u16 as u8; }");
    let value = return_value(first_function(&program), 0);
    match &value.kind {
        ExprKind::Cast { operand, target } => {
            assert!(matches!(target.kind, TypeSpecKind::Prim(Primitive::U8)));
            match &operand.kind {
                ExprKind::Cast { operand, target } => {
                    assert!(matches!(target.kind, TypeSpecKind::Prim(Primitive::U16)));
                    assert!(matches!(operand.kind, ExprKind::Identifier(_)));
                }
                other => panic!("expected inner cast, got {other:?}"),
            }
        }
        other => panic!("expected cast, got {other:?}"),
    }
}

#[test]
fn type_test_expression() {
    let program = parse_clean("fn t(u64 a) bool { return a is u16; }");
    let value = return_value(first_function(&program), 0);
    assert!(matches!(value.kind, ExprKind::TypeTest { .. }));
}

#[test]
fn if_and_while_accept_optional_parens() {
    parse_clean("fn t(bool c) void { if (c) { } if c { } while (c) { } while c { } }");
}

#[test]
fn else_if_chain() {
    let program = parse_clean("fn t(bool c) void { if c { } else if c { } else { } }");
    let f = first_function(&program);
    match &f.body.statements[0] {
        Stmt::If(i) => match i.else_branch.as_deref() {
            Some(Stmt::If(inner)) => assert!(inner.else_branch.is_some()),
            other => panic!("expected nested if, got {other:?}"),
        },
        other => panic!("expected if, got {other:?}"),
    }
}

#[test]
fn missing_semicolon_is_not_fatal() {
    let (program, diags) = parse_src("fn t() void { final x = 1 }");
    assert!(diags.iter().any(|d| d.message.contains("expected `;`")));
    // The declaration itself survives.
    assert_eq!(program.declarations.len(), 1);
}

#[test]
fn missing_semicolon_after_return() {
    let (_, diags) = parse_src("fn t() u64 { return 1 }");
    assert!(diags.iter().any(|d| d.message.contains("expected `;`")));
}

#[test]
fn var_decl_with_multiple_bindings() {
    let program = parse_clean("fn t() void { let u64 a = 1, b, c = 3; }");
    let f = first_function(&program);
    match &f.body.statements[0] {
        Stmt::VarDecl(decl) => {
            assert!(!decl.is_final);
            assert_eq!(decl.bindings.len(), 3);
            assert!(decl.bindings[0].init.is_some());
            assert!(decl.bindings[1].init.is_none());
        }
        other => panic!("expected var decl, got {other:?}"),
    }
}

#[test]
fn lambda_with_zero_parameters() {
    let program = parse_clean("fn t() void { final f = @() => 1; }");
    let f = first_function(&program);
    match &f.body.statements[0] {
        Stmt::VarDecl(decl) => match &decl.bindings[0].init.as_ref().unwrap().kind {
            ExprKind::Lambda { params, body } => {
                assert!(params.is_empty());
                assert!(matches!(body, LambdaBody::Expr(_)));
            }
            other => panic!("expected lambda, got {other:?}"),
        },
        other => panic!("expected var decl, got {other:?}"),
    }
}

#[test]
fn lambda_with_block_body() {
    let program = parse_clean("fn t() void { final f = @(u64 x) { return x; }; }");
    let f = first_function(&program);
    match &f.body.statements[0] {
        Stmt::VarDecl(decl) => match &decl.bindings[0].init.as_ref().unwrap().kind {
            ExprKind::Lambda { params, body } => {
                assert_eq!(params.len(), 1);
                assert!(matches!(body, LambdaBody::Block(_)));
            }
            other => panic!("expected lambda, got {other:?}"),
        },
        other => panic!("expected var decl, got {other:?}"),
    }
}

#[test]
fn parenthesised_expression_versus_tuple() {
    let program = parse_clean("fn t() void { final a = (1, 2); final b = (1); }");
    let f = first_function(&program);
    match &f.body.statements[0] {
        Stmt::VarDecl(decl) => {
            assert!(matches!(
                decl.bindings[0].init.as_ref().unwrap().kind,
                ExprKind::Tuple(_)
            ));
        }
        other => panic!("expected var decl, got {other:?}"),
    }
    match &f.body.statements[1] {
        Stmt::VarDecl(decl) => {
            assert!(matches!(
                decl.bindings[0].init.as_ref().unwrap().kind,
                ExprKind::IntLiteral(1)
            ));
        }
        other => panic!("expected var decl, got {other:?}"),
    }
}

#[test]
fn prefix_cast_tie_break() {
    // `(u8) a` is a cast; `(a)` stays a parenthesised identifier.
    let program = parse_clean("fn t(u64 a) void { final b = (u8) a; final c = (a); }");
    let f = first_function(&program);
    match &f.body.statements[0] {
        Stmt::VarDecl(decl) => {
            assert!(matches!(
                decl.bindings[0].init.as_ref().unwrap().kind,
                ExprKind::Cast { .. }
            ));
        }
        other => panic!("expected var decl, got {other:?}"),
    }
    match &f.body.statements[1] {
        Stmt::VarDecl(decl) => {
            assert!(matches!(
                decl.bindings[0].init.as_ref().unwrap().kind,
                ExprKind::Identifier(_)
            ));
        }
        other => panic!("expected var decl, got {other:?}"),
    }
}

#[test]
fn class_members_parse() {
    let src = r#"
class Point {
    final u64 x;
    let u64 y = 0;
    constructor(u64 a) { }
    op(+)(Point other) Point { return self; }
    fn sum() u64 { return 0; }
    proc $dump() void { return; }
}
"#;
    let program = parse_clean(src);
    match &program.declarations[0] {
        Declaration::Class(c) => {
            assert_eq!(c.name.name, "Point");
            assert_eq!(c.members.len(), 6);
            assert!(matches!(&c.members[0], ClassMember::Field(f) if f.is_final));
            assert!(matches!(&c.members[1], ClassMember::Field(f) if f.init.is_some()));
            assert!(matches!(&c.members[2], ClassMember::Constructor(_)));
            assert!(matches!(&c.members[3], ClassMember::Operator(o) if o.op == BinaryOp::Add));
            assert!(matches!(&c.members[4], ClassMember::Method(_)));
            assert!(matches!(&c.members[5], ClassMember::ProcMethod(_)));
        }
        other => panic!("expected class, got {other:?}"),
    }
}

#[test]
fn member_assignment_is_rejected() {
    let (_, diags) =
        parse_src("class C { let u64 x; fn m() void { self.x = 1; } }");
    assert!(diags
        .iter()
        .any(|d| d.message.contains("invalid assignment target")));
}

#[test]
fn new_array_and_new_constructor() {
    let program =
        parse_clean("fn t() void { final a = new u64[10]; final p = new Point(1); }");
    let f = first_function(&program);
    match &f.body.statements[0] {
        Stmt::VarDecl(decl) => {
            assert!(matches!(
                decl.bindings[0].init.as_ref().unwrap().kind,
                ExprKind::ArrayAlloc { .. }
            ));
        }
        other => panic!("expected var decl, got {other:?}"),
    }
    match &f.body.statements[1] {
        Stmt::VarDecl(decl) => match &decl.bindings[0].init.as_ref().unwrap().kind {
            ExprKind::ConstructorCall { class, args } => {
                assert_eq!(class.name, "Point");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected constructor call, got {other:?}"),
        },
        other => panic!("expected var decl, got {other:?}"),
    }
}

#[test]
fn array_literal_and_index() {
    let program = parse_clean("fn t() void { final xs = [1, 2, 3]; xs[0]; }");
    let f = first_function(&program);
    match &f.body.statements[1] {
        Stmt::Expr(e) => assert!(matches!(e.kind, ExprKind::Index { .. })),
        other => panic!("expected expression statement, got {other:?}"),
    }
}

#[test]
fn interpolated_string_sub_parses() {
    let program = parse_clean(r#"fn t() string { return "v=${1 + 2}"; }"#);
    let value = return_value(first_function(&program), 0);
    match &value.kind {
        ExprKind::Interpolation(parts) => {
            assert_eq!(parts.len(), 2);
            match &parts[1] {
                InterpPart::Expr(e) => assert!(matches!(e.kind, ExprKind::Binary { .. })),
                other => panic!("expected expression part, got {other:?}"),
            }
        }
        other => panic!("expected interpolation, got {other:?}"),
    }
}

#[test]
fn function_type_spec() {
    let program = parse_clean("fn t((u64) => u64 f) u64 { return f(1); }");
    let f = first_function(&program);
    assert!(matches!(
        f.params[0].ty.kind,
        TypeSpecKind::Function { .. }
    ));
}

#[test]
fn generic_type_spec() {
    let program = parse_clean("fn t(array<u64> xs) void { }");
    let f = first_function(&program);
    match &f.params[0].ty.kind {
        TypeSpecKind::Generic { name, args } => {
            assert_eq!(name, "array");
            assert_eq!(args.len(), 1);
        }
        other => panic!("expected generic type, got {other:?}"),
    }
}

#[test]
fn imports_are_parsed_and_kept() {
    let program = parse_clean("import std.io; import \"vendor/lib\"; const x = 1;");
    assert_eq!(program.imports.len(), 2);
    assert_eq!(program.imports[0].path, "std.io");
    assert_eq!(program.imports[1].path, "vendor/lib");
}

#[test]
fn parser_recovers_after_broken_declaration() {
    let (program, diags) = parse_src("fn t( u64 { } fn u() void { }");
    assert!(!diags.is_empty());
    assert!(program.declarations.iter().any(|d| matches!(
        d,
        Declaration::Function(f) if f.name.name == "u"
    )));
}
