use opql_ast::{Operator, TokenKind};

use super::lex;
use crate::error::LexError;

fn kinds(src: &str) -> Vec<TokenKind> {
    lex(src).unwrap().into_iter().map(|t| t.kind).collect()
}

#[test]
fn lexes_identifiers_and_keywords() {
    assert_eq!(
        kinds("FIND status"),
        vec![
            TokenKind::Keyword("FIND".into()),
            TokenKind::Identifier("status".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn keyword_match_is_case_insensitive() {
    assert_eq!(kinds("find")[0], TokenKind::Keyword("FIND".into()));
}

#[test]
fn lexes_strings_with_escapes() {
    assert_eq!(
        kinds(r#"'it\'s'"#)[0],
        TokenKind::String("it's".into())
    );
    assert_eq!(kinds(r#""a\\b""#)[0], TokenKind::String("a\\b".into()));
}

#[test]
fn unterminated_string_errors_with_offset() {
    let err = lex("'abc").unwrap_err();
    assert_eq!(err, LexError::UnterminatedString { offset: 0 });
}

#[test]
fn lexes_duration_literal() {
    assert_eq!(kinds("7d")[0], TokenKind::DurationLiteral("7d".into()));
    assert_eq!(kinds("3mo")[0], TokenKind::DurationLiteral("3mo".into()));
    assert_eq!(kinds("1.5h")[0], TokenKind::DurationLiteral("1.5h".into()));
}

#[test]
fn plain_number_without_unit_suffix() {
    assert_eq!(kinds("42")[0], TokenKind::Number("42".into()));
}

#[test]
fn multi_char_operators_match_greedily() {
    assert_eq!(kinds("!=")[0], TokenKind::Operator(Operator::Ne));
    assert_eq!(kinds("<>")[0], TokenKind::Operator(Operator::NeAlt));
    assert_eq!(kinds("<=")[0], TokenKind::Operator(Operator::Le));
    assert_eq!(kinds(">=")[0], TokenKind::Operator(Operator::Ge));
    assert_eq!(kinds("::")[0], TokenKind::Operator(Operator::Cast));
    assert_eq!(kinds("!~")[0], TokenKind::Operator(Operator::NotMatch));
}

#[test]
fn unexpected_byte_errors_with_offset() {
    let err = lex("status = ? 1").unwrap_err();
    assert_eq!(err, LexError::Unexpected { ch: '?', offset: 9 });
}

#[test]
fn at_and_dollar_allowed_in_identifiers() {
    assert_eq!(
        kinds("@currentUser")[0],
        TokenKind::Identifier("@currentUser".into())
    );
    assert_eq!(
        kinds("cf-$legacy")[0],
        TokenKind::Identifier("cf-$legacy".into())
    );
}
