//! Statement grammar, spec.md §4.2: the entry point selects a statement
//! kind by its leading keyword, then every statement reads the same pool
//! of base clauses (`JOIN`, `RELATE`/`GRAPH`, `WHERE`, `GROUP BY`,
//! `HAVING`, `ORDER BY`, `LIMIT`, `OFFSET`, `CURSOR`, `RETURNING`,
//! `SECURE`, `PAGINATE`/`PAGE`) in whatever order they appear.

use opql_ast::{
    Aggregate, AggregateFunc, AggregateItem, Assignment, Count, Explain, Find, Ident, Join,
    JoinKind, NullsOrder, OrderByItem, Relation, RelationDirection, SecurityClause, SortDirection,
    Stmt, StmtKind, TokenKind, Update,
};

use crate::error::{Expected, ParseError};

use super::expr::parse_expr;
use super::Cursor;

pub(crate) fn parse_statement(cur: &mut Cursor) -> Result<Stmt, ParseError> {
    if cur.is_keyword("EXPLAIN") {
        cur.bump();
        let verbose = cur.eat_keyword("VERBOSE");
        let target = parse_statement(cur)?;
        let source = target.source.clone();
        return Ok(Stmt::new(source, StmtKind::Explain(Explain { target: Box::new(target), verbose })));
    }
    if cur.is_keyword("FIND") {
        return parse_find(cur);
    }
    if cur.is_keyword("COUNT") {
        return parse_count(cur);
    }
    if cur.is_keyword("AGGREGATE") {
        return parse_aggregate(cur);
    }
    if cur.is_keyword("UPDATE") {
        return parse_update(cur);
    }
    Err(ParseError::unexpected(
        cur.offset(),
        Expected::OneOfKeywords(vec!["FIND", "COUNT", "AGGREGATE", "UPDATE", "EXPLAIN"]),
        cur.current(),
    ))
}

fn parse_find(cur: &mut Cursor) -> Result<Stmt, ParseError> {
    cur.expect_keyword("FIND")?;
    let distinct = cur.eat_keyword("DISTINCT");
    let projections = parse_projection_list(cur)?;
    cur.expect_keyword("FROM")?;
    let source = cur.expect_identifier_or_keyword_as_name()?;
    let mut stmt = Stmt::new(source, StmtKind::Find(Find { projections, distinct }));
    stmt.alias = parse_as_alias(cur)?;
    parse_clauses(cur, &mut stmt)?;
    Ok(stmt)
}

fn parse_count(cur: &mut Cursor) -> Result<Stmt, ParseError> {
    cur.expect_keyword("COUNT")?;
    let distinct = cur.eat_keyword("DISTINCT");
    let projections = if cur.eat_kind(&TokenKind::LParen) {
        let list = if cur.eat_kind(&TokenKind::Asterisk) {
            None
        } else {
            let mut cols = vec![parse_projection_name(cur)?];
            while cur.eat_kind(&TokenKind::Comma) {
                cols.push(parse_projection_name(cur)?);
            }
            Some(cols)
        };
        cur.expect_kind(TokenKind::RParen, ")")?;
        list
    } else {
        None
    };
    cur.expect_keyword("FROM")?;
    let source = cur.expect_identifier_or_keyword_as_name()?;
    let mut stmt = Stmt::new(source, StmtKind::Count(Count { distinct, projections }));
    stmt.alias = parse_as_alias(cur)?;
    parse_clauses(cur, &mut stmt)?;
    Ok(stmt)
}

fn parse_aggregate(cur: &mut Cursor) -> Result<Stmt, ParseError> {
    cur.expect_keyword("AGGREGATE")?;
    let mut aggregates = vec![parse_aggregate_item(cur)?];
    while cur.eat_kind(&TokenKind::Comma) {
        aggregates.push(parse_aggregate_item(cur)?);
    }
    cur.expect_keyword("FROM")?;
    let source = cur.expect_identifier_or_keyword_as_name()?;
    let mut stmt = Stmt::new(
        source,
        StmtKind::Aggregate(Aggregate { aggregates, group_by: Vec::new(), having: None }),
    );
    stmt.alias = parse_as_alias(cur)?;
    let tail = parse_clauses(cur, &mut stmt)?;
    if let StmtKind::Aggregate(ref mut agg) = stmt.kind {
        agg.group_by = tail.group_by;
        agg.having = tail.having;
    }
    Ok(stmt)
}

fn parse_update(cur: &mut Cursor) -> Result<Stmt, ParseError> {
    cur.expect_keyword("UPDATE")?;
    let source = cur.expect_identifier_or_keyword_as_name()?;
    let alias = parse_as_alias(cur)?;
    let mut assignments = vec![parse_assignment(cur)?];
    while cur.eat_kind(&TokenKind::Comma) {
        assignments.push(parse_assignment(cur)?);
    }
    let mut stmt = Stmt::new(source, StmtKind::Update(Update { assignments, returning: None }));
    stmt.alias = alias;
    let tail = parse_clauses(cur, &mut stmt)?;
    if let StmtKind::Update(ref mut update) = stmt.kind {
        update.returning = tail.returning;
    }
    Ok(stmt)
}

fn parse_assignment(cur: &mut Cursor) -> Result<Assignment, ParseError> {
    let mut path = vec![cur.expect_identifier_or_keyword_as_name()?];
    while cur.is_kind(&TokenKind::Dot) {
        cur.bump();
        path.push(cur.expect_identifier_or_keyword_as_name()?);
    }
    let field = Ident::from_path(path);
    if !cur.eat_operator(opql_ast::Operator::Eq) {
        return Err(ParseError::ExpectedOperator { offset: cur.offset(), found: cur.current().kind.clone() });
    }
    let value = parse_expr(cur)?;
    Ok(Assignment { field, value })
}

fn parse_aggregate_item(cur: &mut Cursor) -> Result<AggregateItem, ParseError> {
    let offset = cur.offset();
    let name = cur.expect_identifier_or_keyword_as_name()?.to_uppercase();
    let func = match name.as_str() {
        "COUNT" => AggregateFunc::Count,
        "SUM" => AggregateFunc::Sum,
        "AVG" => AggregateFunc::Avg,
        "MIN" => AggregateFunc::Min,
        "MAX" => AggregateFunc::Max,
        "ARRAY_AGG" => AggregateFunc::ArrayAgg,
        _ => {
            return Err(ParseError::UnsupportedConstruct {
                offset,
                description: format!("unknown aggregate function `{name}`"),
            })
        }
    };
    cur.expect_kind(TokenKind::LParen, "(")?;
    let arg = if cur.eat_kind(&TokenKind::Asterisk) { None } else { Some(parse_expr(cur)?) };
    cur.expect_kind(TokenKind::RParen, ")")?;
    let alias = if cur.eat_keyword("AS") { Some(cur.expect_identifier_or_keyword_as_name()?) } else { None };
    Ok(AggregateItem { func, arg, alias })
}

/// Trailing pieces only some statement kinds store, collected out of the
/// shared clause loop so `parse_clauses` can stay generic over `Stmt`.
struct ClausesTail {
    group_by: Vec<opql_ast::Expr>,
    having: Option<opql_ast::Expr>,
    returning: Option<Vec<String>>,
}

fn parse_clauses(cur: &mut Cursor, stmt: &mut Stmt) -> Result<ClausesTail, ParseError> {
    let mut group_by = Vec::new();
    let mut having = None;
    let mut returning = None;

    loop {
        if cur.is_keyword("JOIN") || cur.is_any_keyword(&["INNER", "LEFT", "RIGHT", "FULL"]) {
            stmt.joins.push(parse_join(cur)?);
        } else if cur.is_keyword("RELATE") || cur.is_keyword("GRAPH") {
            stmt.relations.push(parse_relation(cur)?);
        } else if cur.is_keyword("WHERE") {
            cur.bump();
            stmt.where_ = Some(parse_expr(cur)?);
        } else if cur.is_keyword("GROUP") {
            cur.bump();
            cur.expect_keyword("BY")?;
            group_by.push(parse_expr(cur)?);
            while cur.eat_kind(&TokenKind::Comma) {
                group_by.push(parse_expr(cur)?);
            }
        } else if cur.is_keyword("HAVING") {
            cur.bump();
            having = Some(parse_expr(cur)?);
        } else if cur.is_keyword("ORDER") {
            cur.bump();
            cur.expect_keyword("BY")?;
            stmt.order_by.push(parse_order_item(cur)?);
            while cur.eat_kind(&TokenKind::Comma) {
                stmt.order_by.push(parse_order_item(cur)?);
            }
        } else if cur.is_keyword("LIMIT") {
            cur.bump();
            stmt.limit = Some(parse_int_literal(cur)?);
        } else if cur.is_keyword("OFFSET") {
            cur.bump();
            stmt.offset = Some(parse_int_literal(cur)?);
        } else if cur.is_keyword("CURSOR") {
            cur.bump();
            stmt.cursor = Some(parse_string_literal(cur)?);
        } else if cur.is_keyword("RETURNING") {
            cur.bump();
            returning = Some(parse_projection_list(cur)?);
        } else if cur.is_keyword("SECURE") {
            cur.bump();
            stmt.security = Some(parse_security(cur)?);
        } else if cur.is_keyword("PAGINATE") || cur.is_keyword("PAGE") {
            parse_pagination(cur, stmt)?;
        } else {
            break;
        }
    }

    Ok(ClausesTail { group_by, having, returning })
}

fn parse_join(cur: &mut Cursor) -> Result<Join, ParseError> {
    let kind = if cur.eat_keyword("INNER") {
        JoinKind::Inner
    } else if cur.eat_keyword("LEFT") {
        JoinKind::Left
    } else if cur.eat_keyword("RIGHT") {
        JoinKind::Right
    } else if cur.eat_keyword("FULL") {
        JoinKind::Full
    } else {
        JoinKind::Inner
    };
    cur.expect_keyword("JOIN")?;
    let source = cur.expect_identifier_or_keyword_as_name()?;
    let alias = parse_as_alias(cur)?;
    cur.expect_keyword("ON")?;
    let condition = parse_expr(cur)?;
    Ok(Join { kind, source, alias, condition })
}

fn parse_relation(cur: &mut Cursor) -> Result<Relation, ParseError> {
    cur.bump(); // RELATE or GRAPH
    let name = cur.expect_identifier_or_keyword_as_name()?;
    let direction = if cur.eat_keyword("INBOUND") {
        RelationDirection::Inbound
    } else if cur.eat_keyword("OUTBOUND") {
        RelationDirection::Outbound
    } else if cur.eat_keyword("BIDIRECTIONAL") {
        RelationDirection::Bidirectional
    } else {
        RelationDirection::Outbound
    };
    let depth = if cur.eat_keyword("DEPTH") { Some(parse_int_literal(cur)? as u32) } else { None };
    let cap = if cur.eat_keyword("CAP") { Some(parse_int_literal(cur)? as u32) } else { None };
    Ok(Relation { name, direction, depth, cap })
}

fn parse_order_item(cur: &mut Cursor) -> Result<OrderByItem, ParseError> {
    let expr = parse_expr(cur)?;
    let direction = if cur.eat_keyword("DESC") {
        SortDirection::Desc
    } else {
        cur.eat_keyword("ASC");
        SortDirection::Asc
    };
    let nulls = if cur.eat_keyword("NULLS") {
        if cur.eat_keyword("FIRST") {
            Some(NullsOrder::First)
        } else {
            cur.expect_keyword("LAST")?;
            Some(NullsOrder::Last)
        }
    } else {
        None
    };
    Ok(OrderByItem { expr, direction, nulls })
}

fn parse_security(cur: &mut Cursor) -> Result<SecurityClause, ParseError> {
    let has_paren = cur.eat_kind(&TokenKind::LParen);
    let mut permissions = vec![cur.expect_identifier_or_keyword_as_name()?];
    while cur.eat_kind(&TokenKind::Comma) {
        permissions.push(cur.expect_identifier_or_keyword_as_name()?);
    }
    if has_paren {
        cur.expect_kind(TokenKind::RParen, ")")?;
    }
    Ok(SecurityClause { permissions })
}

fn parse_pagination(cur: &mut Cursor, stmt: &mut Stmt) -> Result<(), ParseError> {
    cur.bump(); // PAGINATE or PAGE
    loop {
        if cur.eat_keyword("LIMIT") {
            stmt.limit = Some(parse_int_literal(cur)?);
        } else if cur.eat_keyword("AFTER") || cur.eat_keyword("CURSOR") {
            stmt.cursor = Some(parse_string_literal(cur)?);
        } else {
            break;
        }
    }
    Ok(())
}

fn parse_as_alias(cur: &mut Cursor) -> Result<Option<String>, ParseError> {
    if cur.eat_keyword("AS") {
        Ok(Some(cur.expect_identifier_or_keyword_as_name()?))
    } else {
        Ok(None)
    }
}

fn parse_projection_name(cur: &mut Cursor) -> Result<String, ParseError> {
    let mut parts = vec![cur.expect_identifier_or_keyword_as_name()?];
    while cur.is_kind(&TokenKind::Dot) {
        cur.bump();
        parts.push(cur.expect_identifier_or_keyword_as_name()?);
    }
    Ok(parts.join("."))
}

fn parse_projection_list(cur: &mut Cursor) -> Result<Vec<String>, ParseError> {
    if cur.eat_kind(&TokenKind::Asterisk) {
        return Ok(vec!["*".to_string()]);
    }
    let mut cols = vec![parse_projection_name(cur)?];
    while cur.eat_kind(&TokenKind::Comma) {
        cols.push(parse_projection_name(cur)?);
    }
    Ok(cols)
}

fn parse_int_literal(cur: &mut Cursor) -> Result<i64, ParseError> {
    let offset = cur.offset();
    match cur.current().kind.clone() {
        TokenKind::Number(n) => {
            cur.bump();
            n.parse::<i64>().map_err(|_| ParseError::UnsupportedConstruct {
                offset,
                description: format!("invalid integer `{n}`"),
            })
        }
        _ => Err(ParseError::unexpected(offset, Expected::Literal, cur.current())),
    }
}

fn parse_string_literal(cur: &mut Cursor) -> Result<String, ParseError> {
    let offset = cur.offset();
    match cur.current().kind.clone() {
        TokenKind::String(s) => {
            cur.bump();
            Ok(s)
        }
        _ => Err(ParseError::unexpected(offset, Expected::Literal, cur.current())),
    }
}
