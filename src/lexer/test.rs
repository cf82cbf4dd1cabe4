use super::*;

fn lex_just_tokens(source: &str) -> Vec<Token> {
    let (tokens, errors) = lex(source, "test.pas".into());
    assert!(errors.is_empty(), "unexpected lexer errors: {:?}", errors);
    tokens.into_iter().map(|(token, _)| token).collect()
}

fn lex_defined(source: &str, defines: &[&str]) -> Vec<Token> {
    let (tokens, errors) = lex_with(source, "test.pas".into(), &mut Preprocessor::new(defines));
    assert!(errors.is_empty(), "unexpected lexer errors: {:?}", errors);
    tokens.into_iter().map(|(token, _)| token).collect()
}

// --- happy path ---

#[test]
fn test_keywords_are_case_insensitive_and_identifiers_lowercased() {
    let tokens = lex_just_tokens("BEGIN MyVar := 1; End");
    assert_eq!(
        tokens,
        vec![
            Token::Begin,
            Token::Ident("myvar".to_string()),
            Token::Assign,
            Token::Integer(1),
            Token::Semicolon,
            Token::End,
        ]
    );
}

#[test]
fn test_range_is_not_a_real_literal() {
    let tokens = lex_just_tokens("array[1..3] of integer");
    assert_eq!(
        tokens,
        vec![
            Token::Array,
            Token::LBracket,
            Token::Integer(1),
            Token::DotDot,
            Token::Integer(3),
            Token::RBracket,
            Token::Of,
            Token::Ident("integer".to_string()),
        ]
    );
}

#[test]
fn test_numeric_literals() {
    let tokens = lex_just_tokens("42 $ff 1.5 2e3");
    assert_eq!(tokens, vec![Token::Integer(42), Token::Integer(255), Token::Real(1.5), Token::Real(2000.0)]);
}

#[test]
fn test_string_escapes_and_concatenated_char_codes() {
    let tokens = lex_just_tokens("'it''s' 'a'#10'b' #65");
    assert_eq!(
        tokens,
        vec![Token::String(b"it's".to_vec()), Token::String(b"a\nb".to_vec()), Token::CharCode(65)]
    );
}

#[test]
fn test_high_char_codes_merge_as_single_bytes() {
    let (tokens, errors) = lex("'a'#200#$ff", "test.pas".into());
    assert!(errors.is_empty(), "unexpected lexer errors: {:?}", errors);
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].0, Token::String(vec![b'a', 200, 255]));
    assert_eq!(tokens[0].1.len, 11);
}

#[test]
fn test_paren_comments_with_stars_inside() {
    let source = "a (* one * two ** three *) b (**) c (* x\n*y* *) d";
    assert_eq!(
        lex_just_tokens(source),
        vec![Token::Ident("a".into()), Token::Ident("b".into()), Token::Ident("c".into()), Token::Ident("d".into())]
    );
}

#[test]
fn test_all_comment_styles_are_skipped() {
    let source = "{ brace } x (* paren\n comment *) // line\n y";
    assert_eq!(lex_just_tokens(source), vec![Token::Ident("x".into()), Token::Ident("y".into())]);
}

#[test]
fn test_locations_are_one_based() {
    let (tokens, _) = lex("var\n  x", "f.pas".into());
    let (_, loc) = &tokens[1];
    assert_eq!((loc.row, loc.col, loc.offset, loc.len), (2, 3, 6, 1));
    assert_eq!(loc.to_string(), "f.pas:2:3");
}

// --- conditional directives ---

#[test]
fn test_ifdef_selects_branch() {
    let source = "{$ifdef DEBUG} a {$else} b {$endif} c";
    assert_eq!(lex_defined(source, &["debug"]), vec![Token::Ident("a".into()), Token::Ident("c".into())]);
    assert_eq!(lex_defined(source, &[]), vec![Token::Ident("b".into()), Token::Ident("c".into())]);
}

#[test]
fn test_define_inside_inactive_region_is_ignored() {
    let source = "{$ifdef nope}{$define x}{$endif}{$ifdef x} hidden {$endif}{$ifndef x} shown {$endif}";
    assert_eq!(lex_defined(source, &[]), vec![Token::Ident("shown".into())]);
}

#[test]
fn test_compiler_symbol_is_predefined() {
    assert_eq!(lex_defined("{$ifdef PASCALC} yes {$endif}", &[]), vec![Token::Ident("yes".into())]);
}

#[test]
fn test_unknown_directive_is_ignored() {
    assert_eq!(lex_just_tokens("{$mode objfpc} x"), vec![Token::Ident("x".into())]);
}

// --- sad path ---

#[test]
fn test_unrecognized_character() {
    let (_, errors) = lex("x ? y", "test.pas".into());
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        CompilerError::Lexical(LexerError::UnrecognizedToken { text, loc }) => {
            assert_eq!(text, "?");
            assert_eq!(loc.col, 3);
        }
        other => panic!("expected an unrecognized token error, got {:?}", other),
    }
}

#[test]
fn test_oversized_char_code_is_invalid_literal() {
    let (_, errors) = lex("#300", "test.pas".into());
    assert!(matches!(
        errors.as_slice(),
        [CompilerError::Lexical(LexerError::InvalidLiteral { kind: "character", .. })]
    ));
}

#[test]
fn test_unterminated_paren_comment_is_reported() {
    let (tokens, errors) = lex("x (* never closed", "test.pas".into());
    assert_eq!(tokens.len(), 1);
    match errors.as_slice() {
        [CompilerError::Lexical(LexerError::UnterminatedComment { loc })] => assert_eq!(loc.col, 3),
        other => panic!("expected an unterminated comment error, got {:?}", other),
    }
}

#[test]
fn test_unbalanced_directives_are_errors() {
    let (_, errors) = lex("{$endif}", "test.pas".into());
    assert_eq!(errors.len(), 1);
    let (_, errors) = lex("{$ifdef x} a", "test.pas".into());
    assert!(matches!(errors.as_slice(), [CompilerError::Lexical(LexerError::Directive { .. })]));
}
