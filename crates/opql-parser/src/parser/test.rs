use opql_ast::{BinOp, ExprKind, JoinKind, RelationDirection, SortDirection, StmtKind};

use crate::lex;

use super::parse;

fn parse_ok(src: &str) -> opql_ast::Stmt {
    parse(&lex(src).expect("lex")).expect("parse")
}

#[test]
fn parses_simple_find_with_where() {
    let stmt = parse_ok("FIND * FROM tickets WHERE status = 'open'");
    assert_eq!(stmt.source, "tickets");
    let find = stmt.kind.as_find().unwrap();
    assert_eq!(find.projections, vec!["*".to_string()]);
    let bin = stmt.where_.unwrap();
    let bin = bin.kind.as_binary().unwrap();
    assert_eq!(bin.op, BinOp::Eq);
}

#[test]
fn distinct_projections_and_order_by() {
    let stmt = parse_ok("FIND DISTINCT id, status FROM tickets ORDER BY status DESC NULLS LAST");
    let find = stmt.kind.as_find().unwrap();
    assert!(find.distinct);
    assert_eq!(find.projections, vec!["id".to_string(), "status".to_string()]);
    assert_eq!(stmt.order_by.len(), 1);
    assert_eq!(stmt.order_by[0].direction, SortDirection::Desc);
}

#[test]
fn and_or_not_precedence() {
    // `NOT A AND B` must parse as `(NOT A) AND B`, not `NOT (A AND B)`.
    let stmt = parse_ok("FIND * FROM t WHERE NOT a = 1 AND b = 2");
    let top = stmt.where_.unwrap();
    let top = top.kind.as_binary().unwrap();
    assert_eq!(top.op, BinOp::And);
    assert!(matches!(top.left.kind, ExprKind::Unary(_)));
}

#[test]
fn between_and_in_clauses() {
    let stmt = parse_ok("FIND * FROM t WHERE score BETWEEN 1 AND 10 AND tier NOT IN ('a', 'b')");
    let top = stmt.where_.unwrap();
    let top = top.kind.as_binary().unwrap();
    assert!(matches!(top.left.kind, ExprKind::Between(_)));
    let right = top.right.kind.as_in().unwrap();
    assert!(right.negated);
    assert_eq!(right.options.len(), 2);
}

#[test]
fn history_predicate_was_with_qualifiers() {
    let stmt = parse_ok("FIND * FROM t WHERE status WAS 'closed' BY 'alice' AFTER '2024-01-01'");
    let pred = stmt.where_.unwrap();
    let pred = pred.kind.as_history_predicate().unwrap().clone();
    assert_eq!(pred.field.name, "status");
    assert_eq!(pred.qualifiers.len(), 2);
}

#[test]
fn history_predicate_changed_to_from() {
    let stmt = parse_ok("FIND * FROM t WHERE status CHANGED TO 'closed' FROM 'open'");
    let pred = stmt.where_.unwrap();
    let pred = pred.kind.as_history_predicate().unwrap().clone();
    let change = pred.change.unwrap();
    assert!(change.to.is_some());
    assert!(change.from.is_some());
}

#[test]
fn join_and_relate_clauses() {
    let stmt = parse_ok(
        "FIND * FROM tickets LEFT JOIN users ON tickets.owner = users.id RELATE comments OUTBOUND DEPTH 2",
    );
    assert_eq!(stmt.joins.len(), 1);
    assert_eq!(stmt.joins[0].kind, JoinKind::Left);
    assert_eq!(stmt.relations.len(), 1);
    assert_eq!(stmt.relations[0].direction, RelationDirection::Outbound);
    assert_eq!(stmt.relations[0].depth, Some(2));
}

#[test]
fn aggregate_with_group_by_and_having() {
    let stmt = parse_ok(
        "AGGREGATE COUNT(*) AS total FROM tickets GROUP BY status HAVING total > 5",
    );
    let agg = stmt.kind.as_aggregate().unwrap();
    assert_eq!(agg.aggregates.len(), 1);
    assert_eq!(agg.aggregates[0].alias.as_deref(), Some("total"));
    assert_eq!(agg.group_by.len(), 1);
    assert!(agg.having.is_some());
}

#[test]
fn update_with_assignments_and_returning() {
    let stmt = parse_ok("UPDATE tickets status = 'closed', priority = 1 WHERE id = 7 RETURNING id, status");
    let update = stmt.kind.as_update().unwrap();
    assert_eq!(update.assignments.len(), 2);
    assert_eq!(update.returning.as_ref().unwrap(), &vec!["id".to_string(), "status".to_string()]);
}

#[test]
fn explain_wraps_target_statement() {
    let stmt = parse_ok("EXPLAIN VERBOSE FIND * FROM tickets");
    let explain = stmt.kind.as_explain().unwrap();
    assert!(explain.verbose);
    assert!(explain.target.kind.is_find());
}

#[test]
fn pagination_limit_offset_cursor() {
    let stmt = parse_ok("FIND * FROM tickets LIMIT 25 OFFSET 50 CURSOR 'abc123'");
    assert_eq!(stmt.limit, Some(25));
    assert_eq!(stmt.offset, Some(50));
    assert_eq!(stmt.cursor.as_deref(), Some("abc123"));
}

#[test]
fn date_math_on_now() {
    let stmt = parse_ok("FIND * FROM tickets WHERE created_at > now() - 7d");
    let bin = stmt.where_.unwrap();
    let bin = bin.kind.as_binary().unwrap();
    assert!(matches!(bin.right.kind, ExprKind::DateMath(_)));
}

#[test]
fn is_null_and_is_empty() {
    let stmt = parse_ok("FIND * FROM tickets WHERE assignee IS NULL AND tags IS NOT EMPTY");
    let top = stmt.where_.unwrap();
    let top = top.kind.as_binary().unwrap();
    assert_eq!(top.op, BinOp::And);
    let left = top.left.kind.as_binary().unwrap();
    assert_eq!(left.op, BinOp::Is);
    let right = top.right.kind.as_binary().unwrap();
    assert_eq!(right.op, BinOp::IsNot);
}
