use serde::{Deserialize, Serialize};

use crate::Span;

/// A single lexeme produced by the OPQL lexer, carrying its source offset so
/// the parser and error reporting can point back into the original text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    /// The raw text this token was lexed from, as it would be re-lexed.
    pub fn text(&self) -> &str {
        self.kind.text()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::AsRefStr)]
pub enum TokenKind {
    Identifier(String),
    /// A keyword is an identifier that matched the reserved word table; its
    /// value is stored uppercased, as the lexer leaves case normalization to
    /// itself rather than pushing it onto the parser.
    Keyword(String),
    String(String),
    Number(String),
    /// A numeric lexeme immediately followed by a duration unit, e.g. `7d`.
    /// Disambiguated from a plain number by the parser, not the lexer.
    DurationLiteral(String),
    Operator(Operator),
    Comma,
    Dot,
    LParen,
    RParen,
    Colon,
    Asterisk,
    Arrow,
    Eof,
}

impl TokenKind {
    pub fn text(&self) -> &str {
        match self {
            TokenKind::Identifier(s) | TokenKind::Keyword(s) => s,
            TokenKind::String(s) => s,
            TokenKind::Number(s) => s,
            TokenKind::DurationLiteral(s) => s,
            TokenKind::Operator(op) => op.as_text(),
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Colon => ":",
            TokenKind::Asterisk => "*",
            TokenKind::Arrow => "->",
            TokenKind::Eof => "<eof>",
        }
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(self, TokenKind::Keyword(k) if k.eq_ignore_ascii_case(word))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Operator {
    #[strum(to_string = "=")]
    Eq,
    #[strum(to_string = "!=")]
    Ne,
    #[strum(to_string = "<>")]
    NeAlt,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Le,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Ge,
    #[strum(to_string = "~")]
    Match,
    #[strum(to_string = "!~")]
    NotMatch,
    #[strum(to_string = "::")]
    Cast,
    #[strum(to_string = "+")]
    Plus,
    #[strum(to_string = "-")]
    Minus,
    #[strum(to_string = "*")]
    Star,
    #[strum(to_string = "/")]
    Slash,
    #[strum(to_string = "%")]
    Percent,
}

impl Operator {
    pub fn as_text(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::NeAlt => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Match => "~",
            Operator::NotMatch => "!~",
            Operator::Cast => "::",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Percent => "%",
        }
    }
}

/// The fixed set of reserved words the lexer reclassifies identifiers into,
/// per the grammar in spec.md §4.1. Stored once as a read-only table.
pub const KEYWORDS: &[&str] = &[
    "FIND", "COUNT", "AGGREGATE", "UPDATE", "EXPLAIN", "FROM", "WHERE", "ORDER", "BY", "GROUP",
    "HAVING", "LIMIT", "OFFSET", "CURSOR", "RETURNING", "JOIN", "RELATE", "SECURE", "PAGINATE",
    "PAGE", "GRAPH", "AND", "OR", "NOT", "IN", "IS", "EMPTY", "NULL", "BETWEEN", "WAS", "CHANGED",
    "TO", "BEFORE", "AFTER", "ON", "DURING", "NULLS", "FIRST", "LAST", "DISTINCT", "ASC", "DESC",
    "INBOUND", "OUTBOUND", "BIDIRECTIONAL", "DEPTH", "CAP", "VERBOSE", "AS", "INNER", "LEFT",
    "RIGHT", "FULL", "LIKE", "ILIKE", "CONTAINS", "MATCH", "TRUE", "FALSE",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}
