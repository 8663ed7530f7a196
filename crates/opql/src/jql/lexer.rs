//! Single-pass scanner for JQL source text, spec.md §4.5. Deliberately
//! separate from `opql_parser::lexer`: JQL has its own keyword set
//! (`WAS`/`CHANGED`/`EMPTY`/…) and its own custom-field syntax (`cf[12345]`)
//! that OPQL's lexer has no reason to know about.

use super::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum JqlToken {
    Identifier(String),
    /// `cf[12345]`, carrying just the digits.
    CustomField(String),
    String(String),
    Number(String),
    Keyword(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
    LParen,
    RParen,
    Comma,
    Eof,
}

const KEYWORDS: &[&str] = &[
    "AND", "OR", "NOT", "IN", "IS", "EMPTY", "NULL", "WAS", "CHANGED", "BY", "AFTER", "BEFORE",
    "DURING", "ORDER", "ASC", "DESC", "TRUE", "FALSE",
];

pub fn lex(source: &str) -> Result<Vec<(JqlToken, usize)>, CompileError> {
    Lexer { src: source, pos: 0 }.run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn run(mut self) -> Result<Vec<(JqlToken, usize)>, CompileError> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(ch) = self.peek() else {
                out.push((JqlToken::Eof, start));
                break;
            };

            let tok = if ch == '\'' || ch == '"' {
                self.lex_string(ch)?
            } else if ch.is_ascii_digit() {
                self.lex_number()
            } else if is_ident_start(ch) {
                self.lex_identifier()
            } else if self.starts_with("!~") {
                self.pos += 2;
                JqlToken::NotMatch
            } else if self.starts_with("!=") {
                self.pos += 2;
                JqlToken::Ne
            } else if self.starts_with("<>") {
                self.pos += 2;
                JqlToken::Ne
            } else if self.starts_with("<=") {
                self.pos += 2;
                JqlToken::Le
            } else if self.starts_with(">=") {
                self.pos += 2;
                JqlToken::Ge
            } else {
                self.bump();
                match ch {
                    '=' => JqlToken::Eq,
                    '<' => JqlToken::Lt,
                    '>' => JqlToken::Gt,
                    '~' => JqlToken::Match,
                    '(' => JqlToken::LParen,
                    ')' => JqlToken::RParen,
                    ',' => JqlToken::Comma,
                    _ => return Err(CompileError::UnexpectedChar { ch, offset: start }),
                }
            };
            out.push((tok, start));
        }
        Ok(out)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn lex_string(&mut self, delim: char) -> Result<JqlToken, CompileError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(CompileError::UnterminatedString { offset: start }),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(CompileError::UnterminatedString { offset: start }),
                },
                Some(c) if c == delim => break,
                Some(c) => out.push(c),
            }
        }
        Ok(JqlToken::String(out))
    }

    fn lex_number(&mut self) -> JqlToken {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        JqlToken::Number(self.src[start..self.pos].to_string())
    }

    /// `cf[12345]` is its own token shape; every other identifier falls
    /// through to the keyword table.
    fn lex_identifier(&mut self) -> JqlToken {
        let start = self.pos;
        self.bump();
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.bump();
        }
        let text = self.src[start..self.pos].to_string();

        if text.eq_ignore_ascii_case("cf") && self.peek() == Some('[') {
            self.bump();
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
            let digits = self.src[digits_start..self.pos].to_string();
            if self.peek() == Some(']') {
                self.bump();
            }
            return JqlToken::CustomField(digits);
        }

        if KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(&text)) {
            JqlToken::Keyword(text.to_uppercase())
        } else {
            JqlToken::Identifier(text)
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}
