mod harness;

use plasm_core::lexer::tokenize;
use plasm_core::span::FileId;
use plasm_core::token::{InterpSeg, TokenKind};

fn kinds(src: &str) -> Vec<TokenKind> {
    tokenize(FileId(0), src)
        .tokens
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn keywords_identifiers_and_positions() {
    let lex = tokenize(FileId(0), "const x = 42;");
    let tokens = &lex.tokens;
    assert!(lex.diagnostics.is_empty());
    assert_eq!(tokens[0].kind, TokenKind::KwConst);
    assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
    assert_eq!(tokens[1].kind, TokenKind::Ident("x".to_string()));
    assert_eq!((tokens[1].line, tokens[1].column), (1, 7));
    assert_eq!(tokens[2].kind, TokenKind::Assign);
    assert_eq!((tokens[2].line, tokens[2].column), (1, 9));
    assert_eq!(tokens[3].kind, TokenKind::IntLiteral(42));
    assert_eq!((tokens[3].line, tokens[3].column), (1, 11));
    assert_eq!(tokens[4].kind, TokenKind::Semicolon);
    assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
}

#[test]
fn line_tracking_resets_column() {
    let lex = tokenize(FileId(0), "fn\n  add");
    assert_eq!((lex.tokens[0].line, lex.tokens[0].column), (1, 1));
    assert_eq!((lex.tokens[1].line, lex.tokens[1].column), (2, 3));
}

#[test]
fn compound_operators() {
    assert_eq!(
        kinds("== != <= >= && || => = ! < >"),
        vec![
            TokenKind::EqEq,
            TokenKind::NotEq,
            TokenKind::LtEq,
            TokenKind::GtEq,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::FatArrow,
            TokenKind::Assign,
            TokenKind::Not,
            TokenKind::Lt,
            TokenKind::Gt,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn numeric_literals() {
    assert_eq!(
        kinds("1 23 4.5"),
        vec![
            TokenKind::IntLiteral(1),
            TokenKind::IntLiteral(23),
            TokenKind::FloatLiteral(4.5),
            TokenKind::Eof,
        ]
    );
    // A dot not followed by a digit stays a member access.
    assert_eq!(
        kinds("1.x"),
        vec![
            TokenKind::IntLiteral(1),
            TokenKind::Dot,
            TokenKind::Ident("x".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn type_keywords_and_bool_literals() {
    let ks = kinds("u8 i64 f32 bool string true false");
    assert!(matches!(ks[0], TokenKind::TypeName(_)));
    assert!(matches!(ks[4], TokenKind::TypeName(_)));
    assert_eq!(ks[5], TokenKind::BoolLiteral(true));
    assert_eq!(ks[6], TokenKind::BoolLiteral(false));
}

#[test]
fn string_escapes_are_decoded() {
    let ks = kinds(r#""a\nb\t\\\"""#);
    assert_eq!(
        ks[0],
        TokenKind::StringLiteral("a\nb\t\\\"".to_string())
    );
}

#[test]
fn unterminated_string_reports_and_continues() {
    let lex = tokenize(FileId(0), "\"abc\nfn");
    assert!(lex
        .diagnostics
        .iter()
        .any(|d| d.message.contains("unterminated string literal")));
    assert!(lex.tokens.iter().any(|t| t.kind == TokenKind::Error));
    assert_eq!(lex.tokens.last().unwrap().kind, TokenKind::Eof);
}

#[test]
fn unexpected_character_is_skipped() {
    let lex = tokenize(FileId(0), "# fn");
    assert!(lex
        .diagnostics
        .iter()
        .any(|d| d.message.contains("Unexpected character: #")));
    assert_eq!(lex.tokens[0].kind, TokenKind::KwFn);
}

#[test]
fn comments_are_skipped() {
    assert_eq!(
        kinds("// line\nfn /* block */ x"),
        vec![
            TokenKind::KwFn,
            TokenKind::Ident("x".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn unterminated_block_comment_reports() {
    let lex = tokenize(FileId(0), "/* never closed");
    assert!(lex
        .diagnostics
        .iter()
        .any(|d| d.message.contains("unterminated block comment")));
}

#[test]
fn procedure_identifiers() {
    assert_eq!(
        kinds("$foo $ bar"),
        vec![
            TokenKind::ProcIdent("$foo".to_string()),
            TokenKind::Dollar,
            TokenKind::Ident("bar".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn interpolated_string_segments() {
    let lex = tokenize(FileId(0), r#""v=${a} end""#);
    match &lex.tokens[0].kind {
        TokenKind::InterpString(segments) => {
            assert_eq!(segments.len(), 3);
            assert_eq!(segments[0], InterpSeg::Text("v=".to_string()));
            match &segments[1] {
                InterpSeg::Source { text, .. } => assert_eq!(text, "a"),
                other => panic!("expected source segment, got {other:?}"),
            }
            assert_eq!(segments[2], InterpSeg::Text(" end".to_string()));
        }
        other => panic!("expected interpolated string, got {other:?}"),
    }
}

#[test]
fn relex_of_token_slices_is_stable() {
    let src = "fn add(u64 a, u64 b) u64 { return a + b * 2; }";
    let lex = tokenize(FileId(0), src);
    assert!(lex.diagnostics.is_empty());
    for token in &lex.tokens {
        if token.kind == TokenKind::Eof {
            continue;
        }
        assert!((token.span.start as usize) < src.len());
        assert!(token.line >= 1 && token.column >= 1);
        let slice = &src[token.span.start as usize..token.span.end as usize];
        assert_eq!(slice, token.text);
        let again = tokenize(FileId(0), slice);
        assert_eq!(again.tokens[0].kind, token.kind);
    }
}
