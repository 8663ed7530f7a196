//! Recursive-descent / precedence-climbing parser over the OPQL token
//! stream, per spec.md §4.2. Split the way the teacher splits its parser
//! into expression grammar (`expr`) and statement grammar (`stmt`), sharing
//! a token-cursor helper (this module).

pub mod expr;
pub mod stmt;
#[cfg(test)]
mod test;

use opql_ast::{Operator, Stmt, Token, TokenKind};

use crate::error::{Expected, ParseError};

pub fn parse(tokens: &[Token]) -> Result<Stmt, ParseError> {
    let mut cursor = Cursor::new(tokens);
    let stmt = stmt::parse_statement(&mut cursor)?;
    cursor.expect_eof()?;
    Ok(stmt)
}

pub(crate) struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Cursor { tokens, pos: 0 }
    }

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn offset(&self) -> usize {
        self.current().span.start
    }

    pub(crate) fn bump(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn is_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    pub(crate) fn expect_eof(&self) -> Result<(), ParseError> {
        if self.is_eof() {
            Ok(())
        } else {
            Err(ParseError::unexpected(
                self.offset(),
                Expected::Description("end of query"),
                self.current(),
            ))
        }
    }

    pub(crate) fn is_keyword(&self, word: &'static str) -> bool {
        self.current().kind.is_keyword(word)
    }

    pub(crate) fn is_any_keyword(&self, words: &[&'static str]) -> bool {
        words.iter().any(|w| self.is_keyword(w))
    }

    pub(crate) fn eat_keyword(&mut self, word: &'static str) -> bool {
        if self.is_keyword(word) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, word: &'static str) -> Result<(), ParseError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(ParseError::ExpectedKeyword {
                offset: self.offset(),
                keyword: word,
                found: self.current().kind.clone(),
            })
        }
    }

    pub(crate) fn is_operator(&self, op: Operator) -> bool {
        matches!(self.current().kind, TokenKind::Operator(o) if o == op)
    }

    pub(crate) fn eat_operator(&mut self, op: Operator) -> bool {
        if self.is_operator(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn peek_operator(&self) -> Option<Operator> {
        match self.current().kind {
            TokenKind::Operator(op) => Some(op),
            _ => None,
        }
    }

    pub(crate) fn is_kind(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    pub(crate) fn eat_kind(&mut self, kind: &TokenKind) -> bool {
        if self.is_kind(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_kind(&mut self, kind: TokenKind, desc: &'static str) -> Result<(), ParseError> {
        if self.eat_kind(&kind) {
            Ok(())
        } else {
            Err(ParseError::unexpected(
                self.offset(),
                Expected::Token(desc),
                self.current(),
            ))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.current().kind.clone() {
            TokenKind::Identifier(name) => {
                self.bump();
                Ok(name)
            }
            _ => Err(ParseError::unexpected(
                self.offset(),
                Expected::Identifier,
                self.current(),
            )),
        }
    }

    /// An identifier position that also accepts a bare keyword as a name
    /// (field names can collide with reserved words, e.g. `status`). Per
    /// spec.md §9, whether a bare keyword is read as a function name or an
    /// identifier depends on whether `(` follows; callers check that
    /// themselves via `peek_is_lparen`.
    pub(crate) fn expect_identifier_or_keyword_as_name(&mut self) -> Result<String, ParseError> {
        match self.current().kind.clone() {
            TokenKind::Identifier(name) => {
                self.bump();
                Ok(name)
            }
            TokenKind::Keyword(name) => {
                self.bump();
                Ok(name.to_lowercase())
            }
            _ => Err(ParseError::unexpected(
                self.offset(),
                Expected::Identifier,
                self.current(),
            )),
        }
    }

    pub(crate) fn peek_is_lparen_immediately_after(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::LParen)
        )
    }

    /// Looks `ahead` tokens past the current one and checks whether it is
    /// the given keyword, without consuming anything. Used to disambiguate
    /// `NOT BETWEEN` / `NOT IN` from a standalone unary `NOT`.
    pub(crate) fn peek_keyword_at(&self, ahead: usize, word: &'static str) -> bool {
        self.tokens
            .get(self.pos + ahead)
            .is_some_and(|t| t.kind.is_keyword(word))
    }

    pub(crate) fn peek_kind_at(&self, ahead: usize, pred: impl Fn(&TokenKind) -> bool) -> bool {
        self.tokens.get(self.pos + ahead).is_some_and(|t| pred(&t.kind))
    }
}
