//! Single-pass, offset-preserving scanner over UTF-8 text, per spec.md §4.1.

#[cfg(test)]
mod test;

use opql_ast::{is_keyword, Operator, Span, Token, TokenKind};

use crate::error::LexError;

pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src, bytes: src.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(ch) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, Span::new(start, start)));
                break;
            };

            let kind = if ch == '\'' || ch == '"' {
                self.lex_string(ch)?
            } else if ch.is_ascii_digit() {
                self.lex_number()
            } else if is_ident_start(ch) {
                self.lex_identifier()
            } else if let Some((kind, len)) = self.lex_multi_char_operator() {
                self.pos += len;
                kind
            } else {
                self.lex_single_char()?
            };

            let end = self.pos;
            tokens.push(Token::new(kind, Span::new(start, end)));
        }
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    fn lex_string(&mut self, delim: char) -> Result<TokenKind, LexError> {
        let start = self.pos;
        self.bump(); // consume opening delimiter
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(LexError::UnterminatedString { offset: start }),
                Some('\\') => match self.bump() {
                    Some(c) if c == delim || c == '\\' => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(LexError::UnterminatedString { offset: start }),
                },
                Some(c) if c == delim => break,
                Some(c) => out.push(c),
            }
        }
        Ok(TokenKind::String(out))
    }

    fn lex_number(&mut self) -> TokenKind {
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
        let number_text = self.src[start..self.pos].to_string();

        if let Some(unit_len) = self.match_duration_unit() {
            let unit_start = self.pos;
            self.pos += unit_len;
            let combined = format!("{number_text}{}", &self.src[unit_start..self.pos]);
            return TokenKind::DurationLiteral(combined);
        }
        TokenKind::Number(number_text)
    }

    /// Returns the byte length of a duration unit (`s|m|h|d|w|mo|y`) at the
    /// current position, if the number is immediately followed by one and
    /// not by further identifier characters (so `7days` stays a plain
    /// identifier boundary error rather than a silently-truncated `7d`).
    fn match_duration_unit(&self) -> Option<usize> {
        const UNITS: &[&str] = &["mo", "s", "m", "h", "d", "w", "y"];
        for unit in UNITS {
            if self.src[self.pos..].starts_with(unit) {
                let after = self.pos + unit.len();
                let next_is_ident = self.src[after..].chars().next().is_some_and(is_ident_continue);
                if !next_is_ident {
                    return Some(unit.len());
                }
            }
        }
        None
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        self.bump();
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.bump();
        }
        let text = self.src[start..self.pos].to_string();
        if is_keyword(&text) {
            TokenKind::Keyword(text.to_uppercase())
        } else {
            TokenKind::Identifier(text)
        }
    }

    /// Multi-char operators are matched greedily before single-char ones,
    /// per spec.md §4.1.
    fn lex_multi_char_operator(&self) -> Option<(TokenKind, usize)> {
        const MULTI: &[(&str, Operator)] = &[
            ("!=", Operator::Ne),
            ("<>", Operator::NeAlt),
            ("<=", Operator::Le),
            (">=", Operator::Ge),
            ("::", Operator::Cast),
            ("!~", Operator::NotMatch),
        ];
        for (text, op) in MULTI {
            if self.starts_with(text) {
                return Some((TokenKind::Operator(*op), text.len()));
            }
        }
        if self.starts_with("->") {
            return Some((TokenKind::Arrow, 2));
        }
        None
    }

    fn lex_single_char(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos;
        let ch = self.bump().expect("checked by caller");
        let kind = match ch {
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ':' => TokenKind::Colon,
            '*' => TokenKind::Asterisk,
            '=' => TokenKind::Operator(Operator::Eq),
            '<' => TokenKind::Operator(Operator::Lt),
            '>' => TokenKind::Operator(Operator::Gt),
            '~' => TokenKind::Operator(Operator::Match),
            '+' => TokenKind::Operator(Operator::Plus),
            '-' => TokenKind::Operator(Operator::Minus),
            '/' => TokenKind::Operator(Operator::Slash),
            '%' => TokenKind::Operator(Operator::Percent),
            _ => return Err(LexError::Unexpected { ch, offset: start }),
        };
        Ok(kind)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '@'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '$' | '-')
}
