//! Expression grammar, spec.md §4.2. Precedence (high binds first,
//! mirroring the table there):
//! `7 * / %`, `6 + -`, `5 comparison/text-match/cast`,
//! `4 BETWEEN | IN | parens`, `3 NOT (unary)`, `2 AND`, `1 OR`.

use opql_ast::{
    BinOp, Between, DateMath, DateMathOp, Duration, DurationUnit, Expr, ExprKind, Function,
    HistoryComparison, HistoryPredicate, HistoryQualifier, HistoryValueComparison, HistoryVerb,
    Ident, In, Literal, LiteralValue, Operator, Span, Temporal, TemporalOperator, TemporalRange,
    TokenKind, UnOp, UnaryExpr,
};

use crate::error::{Expected, ParseError};

use super::Cursor;

pub fn parse_expr(cur: &mut Cursor) -> Result<Expr, ParseError> {
    parse_or(cur)
}

fn parse_or(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut left = parse_and(cur)?;
    while cur.eat_keyword("OR") {
        let right = parse_and(cur)?;
        left = binary(left, BinOp::Or, right);
    }
    Ok(left)
}

fn parse_and(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut left = parse_not(cur)?;
    while cur.eat_keyword("AND") {
        let right = parse_not(cur)?;
        left = binary(left, BinOp::And, right);
    }
    Ok(left)
}

/// NOT is unary at precedence 3; its operand is parsed at precedence 5
/// (straight to comparison level), so `NOT A AND B` parses as
/// `(NOT A) AND B` (spec.md §8 property 5).
fn parse_not(cur: &mut Cursor) -> Result<Expr, ParseError> {
    if cur.eat_keyword("NOT") {
        let operand = parse_compare(cur)?;
        return Ok(Expr::new(UnaryExpr { op: UnOp::Not, operand: Box::new(operand) }));
    }
    parse_between_in_temporal(cur)
}

/// Level 4: `BETWEEN`, `IN`, and `DURING` all wrap an already-parsed
/// comparison-level value.
fn parse_between_in_temporal(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let value = parse_compare(cur)?;

    if cur.is_keyword("BETWEEN") || (cur.is_keyword("NOT") && peek_keyword_after_not(cur, "BETWEEN")) {
        let negated = cur.eat_keyword("NOT");
        cur.expect_keyword("BETWEEN")?;
        let lower = parse_add(cur)?;
        cur.expect_keyword("AND")?;
        let upper = parse_add(cur)?;
        return Ok(Expr::new(Between {
            value: Box::new(value),
            lower: Box::new(lower),
            upper: Box::new(upper),
            negated,
        }));
    }

    if cur.is_keyword("IN") || (cur.is_keyword("NOT") && peek_keyword_after_not(cur, "IN")) {
        let negated = cur.eat_keyword("NOT");
        cur.expect_keyword("IN")?;
        let options = parse_in_options(cur)?;
        return Ok(Expr::new(In { value: Box::new(value), options, negated }));
    }

    if cur.is_keyword("DURING") {
        cur.bump();
        let range = parse_temporal_range(cur)?;
        return Ok(Expr::new(Temporal {
            operator: TemporalOperator::During,
            value: Box::new(value),
            range,
        }));
    }

    Ok(value)
}

fn peek_keyword_after_not(cur: &Cursor, word: &'static str) -> bool {
    cur.peek_keyword_at(1, word)
}

fn parse_in_options(cur: &mut Cursor) -> Result<Vec<Expr>, ParseError> {
    // "parenthesized comma list; single value also accepted"
    if cur.eat_kind(&TokenKind::LParen) {
        let mut options = Vec::new();
        if !cur.is_kind(&TokenKind::RParen) {
            loop {
                options.push(parse_add(cur)?);
                if !cur.eat_kind(&TokenKind::Comma) {
                    break;
                }
            }
        }
        cur.expect_kind(TokenKind::RParen, ")")?;
        Ok(options)
    } else {
        Ok(vec![parse_add(cur)?])
    }
}

fn parse_temporal_range(cur: &mut Cursor) -> Result<TemporalRange, ParseError> {
    let has_paren = cur.eat_kind(&TokenKind::LParen);
    let start = parse_add(cur)?;
    if !(cur.eat_keyword("AND") || cur.eat_keyword("TO") || cur.eat_kind(&TokenKind::Comma)) {
        return Err(ParseError::unexpected(
            cur.offset(),
            Expected::Description("AND, TO, or `,` in DURING range"),
            cur.current(),
        ));
    }
    let end = parse_add(cur)?;
    if has_paren {
        cur.expect_kind(TokenKind::RParen, ")")?;
    }
    Ok(TemporalRange { start: Box::new(start), end: Box::new(end) })
}

/// Level 5: comparison, text-match, `IS`, `BEFORE`/`AFTER`/`ON`, `::`.
fn parse_compare(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let left = parse_add(cur)?;

    if let Some(op) = cur.peek_operator() {
        let bin_op = match op {
            Operator::Eq => Some(BinOp::Eq),
            Operator::Ne | Operator::NeAlt => Some(BinOp::Ne),
            Operator::Lt => Some(BinOp::Lt),
            Operator::Le => Some(BinOp::Le),
            Operator::Gt => Some(BinOp::Gt),
            Operator::Ge => Some(BinOp::Ge),
            Operator::Match => Some(BinOp::Match),
            Operator::NotMatch => Some(BinOp::NotMatch),
            Operator::Cast => Some(BinOp::Cast),
            _ => None,
        };
        if let Some(bin_op) = bin_op {
            cur.bump();
            let right = parse_add(cur)?;
            return Ok(binary(left, bin_op, right));
        }
    }

    if cur.is_keyword("LIKE") {
        cur.bump();
        let right = parse_add(cur)?;
        return Ok(binary(left, BinOp::Like, right));
    }
    if cur.is_keyword("ILIKE") {
        cur.bump();
        let right = parse_add(cur)?;
        return Ok(binary(left, BinOp::ILike, right));
    }
    if cur.is_keyword("CONTAINS") {
        cur.bump();
        let right = parse_add(cur)?;
        return Ok(binary(left, BinOp::Contains, right));
    }
    if cur.is_keyword("MATCH") {
        cur.bump();
        let right = parse_add(cur)?;
        return Ok(binary(left, BinOp::Match, right));
    }
    if cur.is_keyword("BEFORE") {
        cur.bump();
        let right = parse_add(cur)?;
        return Ok(binary(left, BinOp::Before, right));
    }
    if cur.is_keyword("AFTER") {
        cur.bump();
        let right = parse_add(cur)?;
        return Ok(binary(left, BinOp::After, right));
    }
    if cur.is_keyword("ON") {
        cur.bump();
        let right = parse_add(cur)?;
        return Ok(binary(left, BinOp::OnDate, right));
    }

    if cur.is_keyword("IS") {
        cur.bump();
        let negated = cur.eat_keyword("NOT");
        let op = if negated { BinOp::IsNot } else { BinOp::Is };
        if cur.eat_keyword("EMPTY") {
            return Ok(binary(left, op, Expr::new(Function { name: "EMPTY".into(), args: vec![] })));
        }
        if cur.eat_keyword("NULL") {
            return Ok(binary(left, op, Expr::null()));
        }
        let right = parse_add(cur)?;
        return Ok(binary(left, op, right));
    }

    Ok(left)
}

fn parse_add(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut left = parse_mul(cur)?;
    loop {
        let op = match cur.peek_operator() {
            Some(Operator::Plus) => Some(DateMathOp::Add),
            Some(Operator::Minus) => Some(DateMathOp::Sub),
            _ => None,
        };
        let Some(date_math_op) = op else { break };

        // `now() - 7d` / `<date-expr> + 7d` builds a DateMath node instead
        // of generic arithmetic when the right-hand side is a duration
        // literal, per spec.md §3/§4.7.
        if cur.peek_kind_at(1, |k| matches!(k, TokenKind::DurationLiteral(_))) {
            cur.bump();
            let offset = parse_duration_literal(cur)?;
            left = Expr::new(DateMath { base: Box::new(left), op: date_math_op, offset });
            continue;
        }

        let bin_op = match date_math_op {
            DateMathOp::Add => BinOp::Add,
            DateMathOp::Sub => BinOp::Sub,
        };
        cur.bump();
        let right = parse_mul(cur)?;
        left = binary(left, bin_op, right);
    }
    Ok(left)
}

fn parse_mul(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut left = parse_unary_neg(cur)?;
    loop {
        // `*` lexes as the standalone `Asterisk` token (it also stands for
        // the projection wildcard in `FIND *` / `COUNT(*)`), so multiplication
        // is recognized there too, not just via `Operator::Star`.
        let bin_op = if cur.is_kind(&TokenKind::Asterisk) {
            BinOp::Mul
        } else {
            match cur.peek_operator() {
                Some(Operator::Slash) => BinOp::Div,
                Some(Operator::Percent) => BinOp::Mod,
                _ => break,
            }
        };
        cur.bump();
        let right = parse_unary_neg(cur)?;
        left = binary(left, bin_op, right);
    }
    Ok(left)
}

/// Unary `-` at precedence 6: its operand is parsed at precedence 6 as well
/// (spec.md §4.2), i.e. one level below `* / %`.
fn parse_unary_neg(cur: &mut Cursor) -> Result<Expr, ParseError> {
    if cur.eat_operator(Operator::Minus) {
        let operand = parse_mul(cur)?;
        return Ok(Expr::new(UnaryExpr { op: UnOp::Neg, operand: Box::new(operand) }));
    }
    parse_term(cur)
}

fn parse_term(cur: &mut Cursor) -> Result<Expr, ParseError> {
    if cur.eat_kind(&TokenKind::LParen) {
        let inner = parse_or(cur)?;
        cur.expect_kind(TokenKind::RParen, ")")?;
        return Ok(inner);
    }

    let start = cur.offset();

    if let TokenKind::DurationLiteral(_) = cur.current().kind {
        let duration = parse_duration_literal(cur)?;
        return Ok(Expr::spanned(duration, Span::new(start, cur.offset())));
    }

    match cur.current().kind.clone() {
        TokenKind::String(s) => {
            cur.bump();
            Ok(Expr::spanned(
                Literal { value: LiteralValue::String(s) },
                Span::new(start, cur.offset()),
            ))
        }
        TokenKind::Number(n) => {
            cur.bump();
            let value: f64 = n.parse().map_err(|_| ParseError::UnsupportedConstruct {
                offset: start,
                description: format!("invalid numeric literal `{n}`"),
            })?;
            Ok(Expr::spanned(
                Literal { value: LiteralValue::Number(value) },
                Span::new(start, cur.offset()),
            ))
        }
        TokenKind::Keyword(ref kw) if kw == "TRUE" || kw == "FALSE" => {
            cur.bump();
            Ok(Expr::spanned(
                Literal { value: LiteralValue::Boolean(kw == "TRUE") },
                Span::new(start, cur.offset()),
            ))
        }
        TokenKind::Keyword(ref kw) if kw == "NULL" => {
            cur.bump();
            Ok(Expr::spanned(Literal { value: LiteralValue::Null }, Span::new(start, cur.offset())))
        }
        TokenKind::Colon => {
            cur.bump();
            let name = cur.expect_identifier_or_keyword_as_name()?;
            Ok(Expr::spanned(ExprKind::Param(name), Span::new(start, cur.offset())))
        }
        TokenKind::Identifier(_) | TokenKind::Keyword(_) => parse_ident_or_call(cur),
        _ => Err(ParseError::unexpected(start, Expected::Description("an expression"), cur.current())),
    }
}

fn parse_duration_literal(cur: &mut Cursor) -> Result<Duration, ParseError> {
    let TokenKind::DurationLiteral(text) = cur.current().kind.clone() else {
        return Err(ParseError::unexpected(cur.offset(), Expected::Description("a duration literal"), cur.current()));
    };
    let offset = cur.offset();
    cur.bump();
    split_duration(&text, offset)
}

fn split_duration(text: &str, offset: usize) -> Result<Duration, ParseError> {
    let unit_start = text.find(|c: char| c.is_ascii_alphabetic()).ok_or_else(|| {
        ParseError::UnsupportedConstruct { offset, description: format!("malformed duration `{text}`") }
    })?;
    let (number, unit) = text.split_at(unit_start);
    let value: f64 = number.parse().map_err(|_| ParseError::UnsupportedConstruct {
        offset,
        description: format!("malformed duration `{text}`"),
    })?;
    let unit: DurationUnit = match unit {
        "mo" => DurationUnit::Month,
        "s" => DurationUnit::Second,
        "m" => DurationUnit::Minute,
        "h" => DurationUnit::Hour,
        "d" => DurationUnit::Day,
        "w" => DurationUnit::Week,
        "y" => DurationUnit::Year,
        _ => {
            return Err(ParseError::UnsupportedConstruct {
                offset,
                description: format!("unknown duration unit `{unit}`"),
            })
        }
    };
    Ok(Duration { value, unit })
}

/// Reads a dotted identifier path (`alias.field.nested`); if a bare name is
/// immediately followed by `(`, it is read as a function call instead, per
/// spec.md §9's note on `peekValue("(")`. If the identifier turns out to be
/// a bare `field` and the next keyword is `WAS`/`CHANGED`, this hands off
/// to the history-predicate grammar.
fn parse_ident_or_call(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let start = cur.offset();
    let first = cur.expect_identifier_or_keyword_as_name()?;

    if cur.is_kind(&TokenKind::LParen) {
        return parse_function_call(cur, first, start);
    }

    let mut path = vec![first];
    while cur.is_kind(&TokenKind::Dot) {
        cur.bump();
        path.push(cur.expect_identifier_or_keyword_as_name()?);
    }
    let ident = Ident::from_path(path);

    if !ident.is_qualified() && (cur.is_keyword("WAS") || cur.is_keyword("CHANGED")) {
        return parse_history_predicate(cur, ident, start);
    }

    Ok(Expr::spanned(ident, Span::new(start, cur.offset())))
}

fn parse_function_call(cur: &mut Cursor, name: String, start: usize) -> Result<Expr, ParseError> {
    cur.expect_kind(TokenKind::LParen, "(")?;
    let mut args = Vec::new();
    if !cur.is_kind(&TokenKind::RParen) {
        loop {
            args.push(parse_or(cur)?);
            if !cur.eat_kind(&TokenKind::Comma) {
                break;
            }
        }
    }
    cur.expect_kind(TokenKind::RParen, ")")?;
    Ok(Expr::spanned(Function { name, args }, Span::new(start, cur.offset())))
}

fn parse_history_predicate(cur: &mut Cursor, field: Ident, start: usize) -> Result<Expr, ParseError> {
    if cur.eat_keyword("WAS") {
        let negated = cur.eat_keyword("NOT");
        let comparison = parse_history_value_comparison(cur, negated)?;
        let (qualifiers, temporal) = parse_history_qualifiers(cur)?;
        return Ok(Expr::spanned(
            HistoryPredicate {
                field,
                verb: HistoryVerb::Was,
                negated,
                comparison: Some(comparison),
                change: None,
                temporal: temporal.map(Box::new),
                qualifiers,
            },
            Span::new(start, cur.offset()),
        ));
    }

    cur.expect_keyword("CHANGED")?;
    let mut to = None;
    let mut from = None;
    if cur.eat_keyword("TO") {
        to = Some(parse_history_value_comparison(cur, false)?);
    }
    if cur.eat_keyword("FROM") {
        from = Some(parse_history_value_comparison(cur, false)?);
    }
    let (qualifiers, temporal) = parse_history_qualifiers(cur)?;
    Ok(Expr::spanned(
        HistoryPredicate {
            field,
            verb: HistoryVerb::Changed,
            negated: false,
            comparison: None,
            change: Some(HistoryComparison { to, from }),
            temporal: temporal.map(Box::new),
            qualifiers,
        },
        Span::new(start, cur.offset()),
    ))
}

/// `<value|IN list|EMPTY|NULL>`, optionally already-negated by a leading
/// `NOT` the caller consumed.
fn parse_history_value_comparison(
    cur: &mut Cursor,
    negated: bool,
) -> Result<HistoryValueComparison, ParseError> {
    if cur.eat_keyword("IN") {
        let options = parse_in_options(cur)?;
        return Ok(HistoryValueComparison::In { options, negated });
    }
    if cur.eat_keyword("EMPTY") {
        return Ok(HistoryValueComparison::Empty { negated });
    }
    if cur.eat_keyword("NULL") {
        return Ok(HistoryValueComparison::IsNull { negated });
    }
    let value = parse_add(cur)?;
    Ok(HistoryValueComparison::Equals { value: Box::new(value), negated })
}

/// Qualifiers compose in any order: `BY`, `AFTER`, `BEFORE`, `ON`, `DURING`.
/// Returns the qualifier list plus a synthesized `Temporal` if a `DURING`
/// qualifier was present, so the evaluator can restrict scanned
/// segments/events to the intersecting range (spec.md §4.9).
fn parse_history_qualifiers(
    cur: &mut Cursor,
) -> Result<(Vec<HistoryQualifier>, Option<Temporal>), ParseError> {
    let mut qualifiers = Vec::new();
    let mut temporal = None;
    loop {
        if cur.eat_keyword("BY") {
            qualifiers.push(HistoryQualifier::By(Box::new(parse_add(cur)?)));
        } else if cur.eat_keyword("AFTER") {
            qualifiers.push(HistoryQualifier::After(Box::new(parse_add(cur)?)));
        } else if cur.eat_keyword("BEFORE") {
            qualifiers.push(HistoryQualifier::Before(Box::new(parse_add(cur)?)));
        } else if cur.eat_keyword("ON") {
            qualifiers.push(HistoryQualifier::On(Box::new(parse_add(cur)?)));
        } else if cur.eat_keyword("DURING") {
            let range = parse_temporal_range(cur)?;
            temporal = Some(Temporal {
                operator: TemporalOperator::During,
                value: Box::new(Expr::null()),
                range: TemporalRange { start: range.start.clone(), end: range.end.clone() },
            });
            qualifiers.push(HistoryQualifier::During(range.start, range.end));
        } else {
            break;
        }
    }
    Ok((qualifiers, temporal))
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::new(opql_ast::BinaryExpr { left: Box::new(left), op, right: Box::new(right) })
}
