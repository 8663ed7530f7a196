//! Lexer and parser for OPQL query text, turning a source string into the
//! [`opql_ast::Stmt`] tree. Split the way the teacher splits lexing from
//! parsing: a hand-rolled single-pass scanner (spec.md §4.1) feeds a
//! recursive-descent, precedence-climbing parser (spec.md §4.2). Neither
//! stage recovers from an error; the first one aborts the whole parse.

pub mod error;
pub mod lexer;
pub mod parser;

pub use error::{Expected, LexError, ParseError};
pub use lexer::lex;
pub use opql_ast::{Stmt, Token};
pub use parser::parse;

use std::fmt;

/// Either stage's failure, for callers that just want "did this query
/// parse" without caring which phase rejected it.
#[derive(Debug, Clone, PartialEq)]
pub enum OpqlSyntaxError {
    Lex(LexError),
    Parse(ParseError),
}

impl OpqlSyntaxError {
    pub fn offset(&self) -> usize {
        match self {
            OpqlSyntaxError::Lex(LexError::Unexpected { offset, .. })
            | OpqlSyntaxError::Lex(LexError::UnterminatedString { offset }) => *offset,
            OpqlSyntaxError::Parse(e) => e.offset(),
        }
    }
}

impl fmt::Display for OpqlSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpqlSyntaxError::Lex(e) => write!(f, "{e}"),
            OpqlSyntaxError::Parse(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OpqlSyntaxError {}

impl From<LexError> for OpqlSyntaxError {
    fn from(e: LexError) -> Self {
        OpqlSyntaxError::Lex(e)
    }
}

impl From<ParseError> for OpqlSyntaxError {
    fn from(e: ParseError) -> Self {
        OpqlSyntaxError::Parse(e)
    }
}

/// Lexes then parses `source` in one step.
pub fn parse_opql(source: &str) -> Result<Stmt, OpqlSyntaxError> {
    let tokens = lex(source)?;
    Ok(parse(&tokens)?)
}

#[cfg(test)]
mod test {
    use super::parse_opql;

    #[test]
    fn parse_opql_reports_lex_errors_with_offset() {
        let err = parse_opql("FIND * FROM t WHERE a = ?").unwrap_err();
        assert_eq!(err.offset(), 24);
    }

    #[test]
    fn parse_opql_reports_parse_errors() {
        let err = parse_opql("FIND FROM t").unwrap_err();
        assert!(matches!(err, super::OpqlSyntaxError::Parse(_)));
    }
}
