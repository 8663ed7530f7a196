//! Recursive-descent parser over the JQL token stream, spec.md §4.5. Builds
//! a small JQL-native AST; lowering that AST to OPQL text is `jql::compile`'s
//! job, kept separate so this module stays a pure grammar.

use super::lexer::JqlToken;
use super::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum JqlField {
    Named(String),
    /// `cf[12345]`.
    Custom(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JqlCmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JqlValue {
    String(String),
    Number(f64),
    Bool(bool),
    Function(String, Vec<JqlValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JqlQualifier {
    By(JqlValue),
    After(JqlValue),
    Before(JqlValue),
    During(JqlValue, JqlValue),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JqlExpr {
    And(Box<JqlExpr>, Box<JqlExpr>),
    Or(Box<JqlExpr>, Box<JqlExpr>),
    Not(Box<JqlExpr>),
    Compare { field: JqlField, op: JqlCmp, value: JqlValue },
    In { field: JqlField, negated: bool, values: Vec<JqlValue> },
    TextMatch { field: JqlField, negated: bool, value: JqlValue },
    IsEmpty { field: JqlField, negated: bool },
    IsNull { field: JqlField, negated: bool },
    Was { field: JqlField, negated: bool, value: JqlValue, qualifiers: Vec<JqlQualifier> },
    WasIn { field: JqlField, negated: bool, values: Vec<JqlValue>, qualifiers: Vec<JqlQualifier> },
    Changed { field: JqlField, qualifiers: Vec<JqlQualifier> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JqlOrder {
    pub field: JqlField,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JqlQuery {
    pub where_: Option<JqlExpr>,
    pub order_by: Vec<JqlOrder>,
}

pub fn parse(tokens: &[(JqlToken, usize)]) -> Result<JqlQuery, CompileError> {
    Parser { tokens, pos: 0 }.parse_query()
}

struct Parser<'a> {
    tokens: &'a [(JqlToken, usize)],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &JqlToken {
        &self.tokens[self.pos].0
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn bump(&mut self) -> JqlToken {
        let t = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), JqlToken::Keyword(k) if k == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &'static str) -> Result<(), CompileError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(kw))
        }
    }

    fn unexpected(&self, expected: &'static str) -> CompileError {
        CompileError::UnexpectedToken { offset: self.offset(), expected, found: format!("{:?}", self.peek()) }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), JqlToken::Eof)
    }

    fn parse_query(&mut self) -> Result<JqlQuery, CompileError> {
        let where_ = if self.at_eof() || self.is_keyword("ORDER") { None } else { Some(self.parse_or()?) };

        let order_by = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            self.parse_order_list()?
        } else {
            Vec::new()
        };

        if !self.at_eof() {
            return Err(self.unexpected("end of input"));
        }
        Ok(JqlQuery { where_, order_by })
    }

    fn parse_order_list(&mut self) -> Result<Vec<JqlOrder>, CompileError> {
        let mut items = vec![self.parse_order_item()?];
        while matches!(self.peek(), JqlToken::Comma) {
            self.bump();
            items.push(self.parse_order_item()?);
        }
        Ok(items)
    }

    fn parse_order_item(&mut self) -> Result<JqlOrder, CompileError> {
        let field = self.parse_field()?;
        let desc = if self.eat_keyword("DESC") {
            true
        } else {
            self.eat_keyword("ASC");
            false
        };
        Ok(JqlOrder { field, desc })
    }

    fn parse_or(&mut self) -> Result<JqlExpr, CompileError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = JqlExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<JqlExpr, CompileError> {
        let mut left = self.parse_unary()?;
        while self.eat_keyword("AND") {
            let right = self.parse_unary()?;
            left = JqlExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<JqlExpr, CompileError> {
        if self.eat_keyword("NOT") {
            return Ok(JqlExpr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<JqlExpr, CompileError> {
        if matches!(self.peek(), JqlToken::LParen) {
            self.bump();
            let inner = self.parse_or()?;
            self.expect_rparen()?;
            return Ok(inner);
        }
        self.parse_predicate()
    }

    fn expect_rparen(&mut self) -> Result<(), CompileError> {
        if matches!(self.peek(), JqlToken::RParen) {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected(")"))
        }
    }

    fn parse_predicate(&mut self) -> Result<JqlExpr, CompileError> {
        let field = self.parse_field()?;

        if self.eat_keyword("WAS") {
            let negated = self.eat_keyword("NOT");
            let expr = if matches!(self.peek(), JqlToken::Keyword(k) if k == "IN") {
                self.bump();
                let values = self.parse_value_list()?;
                JqlExpr::WasIn { field, negated, values, qualifiers: self.parse_qualifiers()? }
            } else {
                let value = self.parse_value()?;
                JqlExpr::Was { field, negated, value, qualifiers: self.parse_qualifiers()? }
            };
            return Ok(expr);
        }

        if self.eat_keyword("CHANGED") {
            return Ok(JqlExpr::Changed { field, qualifiers: self.parse_qualifiers()? });
        }

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            if self.eat_keyword("EMPTY") {
                return Ok(JqlExpr::IsEmpty { field, negated });
            }
            if self.eat_keyword("NULL") {
                return Ok(JqlExpr::IsNull { field, negated });
            }
            return Err(self.unexpected("EMPTY or NULL"));
        }

        if self.eat_keyword("NOT") {
            self.expect_keyword("IN")?;
            let values = self.parse_value_list()?;
            return Ok(JqlExpr::In { field, negated: true, values });
        }
        if matches!(self.peek(), JqlToken::Keyword(k) if k == "IN") {
            self.bump();
            let values = self.parse_value_list()?;
            return Ok(JqlExpr::In { field, negated: false, values });
        }

        match self.peek() {
            JqlToken::Match => {
                self.bump();
                Ok(JqlExpr::TextMatch { field, negated: false, value: self.parse_value()? })
            }
            JqlToken::NotMatch => {
                self.bump();
                Ok(JqlExpr::TextMatch { field, negated: true, value: self.parse_value()? })
            }
            JqlToken::Eq | JqlToken::Ne | JqlToken::Lt | JqlToken::Le | JqlToken::Gt | JqlToken::Ge => {
                let op = match self.bump() {
                    JqlToken::Eq => JqlCmp::Eq,
                    JqlToken::Ne => JqlCmp::Ne,
                    JqlToken::Lt => JqlCmp::Lt,
                    JqlToken::Le => JqlCmp::Le,
                    JqlToken::Gt => JqlCmp::Gt,
                    JqlToken::Ge => JqlCmp::Ge,
                    _ => unreachable!(),
                };
                Ok(JqlExpr::Compare { field, op, value: self.parse_value()? })
            }
            _ => Err(self.unexpected("a comparator, IN, IS, WAS, or CHANGED")),
        }
    }

    fn parse_qualifiers(&mut self) -> Result<Vec<JqlQualifier>, CompileError> {
        let mut qualifiers = Vec::new();
        loop {
            if self.eat_keyword("BY") {
                qualifiers.push(JqlQualifier::By(self.parse_value()?));
            } else if self.eat_keyword("AFTER") {
                qualifiers.push(JqlQualifier::After(self.parse_value()?));
            } else if self.eat_keyword("BEFORE") {
                qualifiers.push(JqlQualifier::Before(self.parse_value()?));
            } else if self.eat_keyword("DURING") {
                if !matches!(self.peek(), JqlToken::LParen) {
                    return Err(self.unexpected("("));
                }
                self.bump();
                let start = self.parse_value()?;
                self.expect_keyword("AND")?;
                let end = self.parse_value()?;
                self.expect_rparen()?;
                qualifiers.push(JqlQualifier::During(start, end));
            } else {
                break;
            }
        }
        Ok(qualifiers)
    }

    fn parse_value_list(&mut self) -> Result<Vec<JqlValue>, CompileError> {
        if !matches!(self.peek(), JqlToken::LParen) {
            return Err(self.unexpected("("));
        }
        self.bump();
        let mut values = vec![self.parse_value()?];
        while matches!(self.peek(), JqlToken::Comma) {
            self.bump();
            values.push(self.parse_value()?);
        }
        self.expect_rparen()?;
        Ok(values)
    }

    /// A bare word in value position (`status = Done`) is an implicit
    /// string literal unless it's immediately followed by `(`, in which
    /// case it's a function call (`currentUser()`).
    fn parse_value(&mut self) -> Result<JqlValue, CompileError> {
        match self.peek().clone() {
            JqlToken::String(s) => {
                self.bump();
                Ok(JqlValue::String(s))
            }
            JqlToken::Number(n) => {
                self.bump();
                Ok(JqlValue::Number(n.parse().unwrap_or(0.0)))
            }
            JqlToken::Keyword(k) if k == "TRUE" => {
                self.bump();
                Ok(JqlValue::Bool(true))
            }
            JqlToken::Keyword(k) if k == "FALSE" => {
                self.bump();
                Ok(JqlValue::Bool(false))
            }
            JqlToken::Identifier(name) => {
                self.bump();
                if matches!(self.peek(), JqlToken::LParen) {
                    Ok(JqlValue::Function(name, self.parse_arg_list()?))
                } else {
                    Ok(JqlValue::String(name))
                }
            }
            JqlToken::CustomField(digits) => {
                self.bump();
                Ok(JqlValue::String(format!("cf[{digits}]")))
            }
            _ => Err(self.unexpected("a value")),
        }
    }

    fn parse_arg_list(&mut self) -> Result<Vec<JqlValue>, CompileError> {
        self.bump(); // '('
        if matches!(self.peek(), JqlToken::RParen) {
            self.bump();
            return Ok(Vec::new());
        }
        let mut args = vec![self.parse_value()?];
        while matches!(self.peek(), JqlToken::Comma) {
            self.bump();
            args.push(self.parse_value()?);
        }
        self.expect_rparen()?;
        Ok(args)
    }

    fn parse_field(&mut self) -> Result<JqlField, CompileError> {
        match self.peek().clone() {
            JqlToken::Identifier(name) => {
                self.bump();
                Ok(JqlField::Named(name))
            }
            JqlToken::CustomField(digits) => {
                self.bump();
                Ok(JqlField::Custom(digits))
            }
            _ => Err(self.unexpected("a field name")),
        }
    }
}
