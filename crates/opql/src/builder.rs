//! Bidirectional conversion between OPQL source text / the textual
//! `Stmt`/`Expr` tree and the UI-facing `BuilderQuery`/`Group`/`Clause`
//! tree, spec.md §4.6. Also collects the `:ident` parameter tokens a query
//! references, for callers binding a parameterized query to concrete
//! values.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use opql_ast::{
    Between, BinOp, BinaryExpr, BuilderQuery, BuilderStatementKind, Clause, Expr, ExprKind, Find,
    Group, GroupChild, GroupOp, Ident, In, Literal, LiteralValue, Stmt, StmtKind, UnOp, Value,
};

use crate::error::BuilderError;

/// Parses `text` and converts it into the group/clause tree a query builder
/// UI renders and edits, spec.md §4.6's `opqlToQuery(text)`. Numeric
/// placeholders after `LIMIT`/`OFFSET`/`DEPTH`/`CAP` (e.g. `LIMIT :n`) are
/// substituted with integer sentinels before parsing, since the grammar
/// only accepts number tokens there; `LIMIT`/`OFFSET` placeholders are then
/// restored into `limit_param`/`offset_param`. `DEPTH`/`CAP` placeholders
/// parse successfully but the sentinel is left in `Relation::depth`/`cap`
/// rather than restored, since that type is shared with the planner and
/// has no parameter slot.
pub fn opql_to_query(text: &str) -> Result<BuilderQuery, BuilderError> {
    let (substituted, placeholders) = substitute_numeric_placeholders(text);
    let stmt = opql_parser::parse_opql(&substituted)
        .map_err(|e| BuilderError::InvalidSyntax { message: e.to_string() })?;
    let mut query = stmt_to_query(&stmt);
    if let Some(limit) = query.limit {
        if let Some((PlaceholderKind::Limit, name)) = placeholders.get(&limit) {
            query.limit = None;
            query.limit_param = Some(name.clone());
        }
    }
    if let Some(offset) = query.offset {
        if let Some((PlaceholderKind::Offset, name)) = placeholders.get(&offset) {
            query.offset = None;
            query.offset_param = Some(name.clone());
        }
    }
    Ok(query)
}

/// Normalizes `query` and reserializes it into OPQL source text, spec.md
/// §4.6's `queryToOpql(query)`.
pub fn query_to_opql(query: &BuilderQuery) -> Result<String, BuilderError> {
    let mut working = query.clone();
    let mut restore = Vec::new();
    let mut sentinel = PARAM_SENTINEL_BASE;
    if let Some(name) = working.limit_param.take() {
        sentinel += 1;
        working.limit = Some(sentinel);
        restore.push((sentinel, "LIMIT", name));
    }
    if let Some(name) = working.offset_param.take() {
        sentinel += 1;
        working.offset = Some(sentinel);
        restore.push((sentinel, "OFFSET", name));
    }

    let stmt = query_to_stmt(&working)?;
    let normalized = crate::normalize::normalize(stmt, &crate::normalize::AliasTable::standard());
    let mut text = crate::format::format_stmt(&normalized);
    for (sentinel, keyword, name) in restore {
        text = text.replace(&format!("{keyword} {sentinel}"), &format!("{keyword} :{name}"));
    }
    Ok(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaceholderKind {
    Limit,
    Offset,
    Depth,
    Cap,
}

/// Sentinel integers start well above any plausible `LIMIT`/`OFFSET`/
/// `DEPTH`/`CAP` literal so a restored placeholder can never collide with
/// a value a caller actually wrote.
const PARAM_SENTINEL_BASE: i64 = 900_000_000;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(LIMIT|OFFSET|DEPTH|CAP)(\s+):([A-Za-z_][A-Za-z0-9_]*)\b").unwrap())
}

/// Replaces single-quoted string contents' ASCII alphanumeric/underscore/
/// colon bytes with `#`, byte-for-byte, so a regex scan over the result
/// can't mistake a quoted `:name` for a real placeholder while every match
/// offset still lines up with the original, unmasked text.
fn mask_quoted_strings(text: &str) -> String {
    let mut masked = text.as_bytes().to_vec();
    let mut in_string = false;
    let mut escaped = false;
    for b in &mut masked {
        if in_string {
            if escaped {
                escaped = false;
            } else if *b == b'\\' {
                escaped = true;
            } else if *b == b'\'' {
                in_string = false;
            } else if b.is_ascii_alphanumeric() || *b == b'_' || *b == b':' {
                *b = b'#';
            }
        } else if *b == b'\'' {
            in_string = true;
        }
    }
    String::from_utf8(masked).expect("masking only replaces single ASCII bytes with another ASCII byte")
}

/// Finds `:name` immediately after `LIMIT`/`OFFSET`/`DEPTH`/`CAP` outside
/// quoted strings and replaces each with a unique integer sentinel,
/// spec.md §6's "numeric-only placeholders after reserved keywords ... are
/// substituted with integer placeholders during parse".
fn substitute_numeric_placeholders(text: &str) -> (String, HashMap<i64, (PlaceholderKind, String)>) {
    let masked = mask_quoted_strings(text);
    let mut out = text.to_string();
    let mut placeholders = HashMap::new();
    let mut sentinel = PARAM_SENTINEL_BASE;

    let matches: Vec<_> = placeholder_regex().captures_iter(&masked).collect();
    for cap in matches.into_iter().rev() {
        let whole = cap.get(0).unwrap();
        let keyword = cap.get(1).unwrap().as_str().to_ascii_uppercase();
        let gap = cap.get(2).unwrap().as_str();
        let name = cap.get(3).unwrap().as_str().to_string();
        let kind = match keyword.as_str() {
            "LIMIT" => PlaceholderKind::Limit,
            "OFFSET" => PlaceholderKind::Offset,
            "DEPTH" => PlaceholderKind::Depth,
            "CAP" => PlaceholderKind::Cap,
            _ => unreachable!("regex only matches these four keywords"),
        };
        sentinel += 1;
        placeholders.insert(sentinel, (kind, name));
        out.replace_range(whole.start()..whole.end(), &format!("{keyword}{gap}{sentinel}"));
    }
    (out, placeholders)
}

/// Converts a parsed statement into the group/clause tree a query builder
/// UI renders and edits.
fn stmt_to_query(stmt: &Stmt) -> BuilderQuery {
    let mut ids = IdGen::default();
    let statement = match &stmt.kind {
        StmtKind::Find(_) => BuilderStatementKind::Find,
        StmtKind::Count(_) => BuilderStatementKind::Count,
        StmtKind::Aggregate(_) => BuilderStatementKind::Aggregate,
        StmtKind::Update(_) => BuilderStatementKind::Update,
        StmtKind::Explain(explain) => return stmt_to_query(&explain.target),
    };

    let (projections, distinct, aggregates) = match &stmt.kind {
        StmtKind::Find(f) => (f.projections.clone(), f.distinct, Vec::new()),
        StmtKind::Count(c) => (c.projections.clone().unwrap_or_default(), c.distinct, Vec::new()),
        StmtKind::Aggregate(a) => (Vec::new(), false, a.aggregates.clone()),
        _ => (Vec::new(), false, Vec::new()),
    };

    let (group_by, having) = match &stmt.kind {
        StmtKind::Aggregate(a) => {
            let group_by = a.group_by.iter().map(crate::format::format_expr).collect();
            (group_by, expr_to_group(a.having.as_ref(), &mut ids))
        }
        _ => (Vec::new(), Group::new(ids.next("g"), GroupOp::And)),
    };

    let returning = match &stmt.kind {
        StmtKind::Update(u) => u.returning.clone().unwrap_or_default(),
        _ => Vec::new(),
    };

    BuilderQuery {
        statement,
        source: stmt.source.clone(),
        alias: stmt.alias.clone(),
        distinct,
        projections,
        aggregates,
        joins: stmt.joins.clone(),
        relations: stmt.relations.clone(),
        where_: expr_to_group(stmt.where_.as_ref(), &mut ids),
        group_by,
        having,
        order_by: stmt.order_by.clone(),
        limit: stmt.limit,
        offset: stmt.offset,
        limit_param: None,
        offset_param: None,
        cursor: stmt.cursor.clone(),
        returning,
    }
}

/// Converts a group/clause tree back into a `Stmt`. Fails only when a
/// clause carries a comparator the runtime doesn't recognize.
pub(crate) fn query_to_stmt(query: &BuilderQuery) -> Result<Stmt, BuilderError> {
    let kind = match query.statement {
        BuilderStatementKind::Find => StmtKind::Find(Find {
            projections: if query.projections.is_empty() { vec!["*".to_string()] } else { query.projections.clone() },
            distinct: query.distinct,
        }),
        BuilderStatementKind::Count => StmtKind::Count(opql_ast::Count {
            distinct: query.distinct,
            projections: if query.projections.is_empty() { None } else { Some(query.projections.clone()) },
        }),
        BuilderStatementKind::Aggregate => StmtKind::Aggregate(opql_ast::Aggregate {
            aggregates: query.aggregates.clone(),
            group_by: query
                .group_by
                .iter()
                .map(|name| Expr::new(Ident::from_path(name.split('.').map(str::to_string).collect())))
                .collect(),
            having: group_to_expr(&query.having)?,
        }),
        BuilderStatementKind::Update => StmtKind::Update(opql_ast::Update {
            assignments: Vec::new(),
            returning: if query.returning.is_empty() { None } else { Some(query.returning.clone()) },
        }),
    };

    let mut stmt = Stmt::new(query.source.clone(), kind);
    stmt.alias = query.alias.clone();
    stmt.joins = query.joins.clone();
    stmt.relations = query.relations.clone();
    stmt.where_ = group_to_expr(&query.where_)?;
    stmt.order_by = query.order_by.clone();
    stmt.limit = query.limit;
    stmt.offset = query.offset;
    stmt.cursor = query.cursor.clone();
    Ok(stmt)
}

/// Walks every expression position in `stmt` and returns the `:ident`
/// parameter tokens it carries, in source order. Tokens inside quoted
/// string literals don't count — only actual `ExprKind::Param` nodes do.
pub fn collect_query_parameters(stmt: &Stmt) -> Vec<Value> {
    let mut out = Vec::new();
    if let Some(where_) = &stmt.where_ {
        collect_expr_params(where_, &mut out);
    }
    for join in &stmt.joins {
        collect_expr_params(&join.condition, &mut out);
    }
    for item in &stmt.order_by {
        collect_expr_params(&item.expr, &mut out);
    }
    match &stmt.kind {
        StmtKind::Aggregate(a) => {
            for g in &a.group_by {
                collect_expr_params(g, &mut out);
            }
            if let Some(h) = &a.having {
                collect_expr_params(h, &mut out);
            }
            for item in &a.aggregates {
                if let Some(arg) = &item.arg {
                    collect_expr_params(arg, &mut out);
                }
            }
        }
        StmtKind::Update(u) => {
            for assignment in &u.assignments {
                collect_expr_params(&assignment.value, &mut out);
            }
        }
        StmtKind::Explain(e) => out.extend(collect_query_parameters(&e.target)),
        StmtKind::Find(_) | StmtKind::Count(_) => {}
    }
    out
}

fn collect_expr_params(expr: &Expr, out: &mut Vec<Value>) {
    match &expr.kind {
        ExprKind::Param(name) => out.push(Value::Text(format!(":{name}"))),
        ExprKind::Literal(_) | ExprKind::Duration(_) | ExprKind::Identifier(_) => {}
        ExprKind::DateMath(dm) => collect_expr_params(&dm.base, out),
        ExprKind::Unary(u) => collect_expr_params(&u.operand, out),
        ExprKind::Binary(b) => {
            collect_expr_params(&b.left, out);
            collect_expr_params(&b.right, out);
        }
        ExprKind::Between(b) => {
            collect_expr_params(&b.value, out);
            collect_expr_params(&b.lower, out);
            collect_expr_params(&b.upper, out);
        }
        ExprKind::In(i) => {
            collect_expr_params(&i.value, out);
            for opt in &i.options {
                collect_expr_params(opt, out);
            }
        }
        ExprKind::Function(f) => {
            for arg in &f.args {
                collect_expr_params(arg, out);
            }
        }
        ExprKind::HistoryPredicate(hp) => {
            if let Some(c) = &hp.comparison {
                collect_history_value_params(c, out);
            }
            if let Some(change) = &hp.change {
                if let Some(to) = &change.to {
                    collect_history_value_params(to, out);
                }
                if let Some(from) = &change.from {
                    collect_history_value_params(from, out);
                }
            }
        }
        ExprKind::Temporal(t) => {
            collect_expr_params(&t.value, out);
            collect_expr_params(&t.range.start, out);
            collect_expr_params(&t.range.end, out);
        }
    }
}

fn collect_history_value_params(v: &opql_ast::HistoryValueComparison, out: &mut Vec<Value>) {
    match v {
        opql_ast::HistoryValueComparison::Equals { value, .. } => collect_expr_params(value, out),
        opql_ast::HistoryValueComparison::In { options, .. } => {
            for opt in options {
                collect_expr_params(opt, out);
            }
        }
        opql_ast::HistoryValueComparison::Empty { .. } | opql_ast::HistoryValueComparison::IsNull { .. } => {}
    }
}

fn literal_to_value(lit: &LiteralValue) -> Value {
    match lit {
        LiteralValue::String(s) => Value::Text(s.clone()),
        LiteralValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                Value::Int(*n as i64)
            } else {
                Value::Float(*n)
            }
        }
        LiteralValue::Boolean(b) => Value::Bool(*b),
        LiteralValue::Null => Value::Null,
    }
}

#[derive(Default)]
struct IdGen {
    next: u64,
}

impl IdGen {
    fn next(&mut self, prefix: &str) -> String {
        self.next += 1;
        format!("{prefix}{}", self.next)
    }
}

fn expr_field_name(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Identifier(ident) => ident.to_string(),
        _ => crate::format::format_expr(expr),
    }
}

fn is_quoted_literal(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Literal(Literal { value: LiteralValue::String(_) }))
}

fn expr_to_value(expr: &Expr) -> Value {
    match &expr.kind {
        ExprKind::Literal(lit) => literal_to_value(&lit.value),
        _ => Value::Text(crate::format::format_expr(expr)),
    }
}

fn expr_to_clause(expr: &Expr, ids: &mut IdGen) -> Clause {
    let id = ids.next("c");
    match &expr.kind {
        ExprKind::Binary(b) if !b.op.is_logical() => Clause {
            id,
            field: expr_field_name(&b.left),
            comparator: b.op.to_string(),
            value: expr_to_value(&b.right),
            source: "where".to_string(),
            confidence: 1.0,
            value_was_quoted: is_quoted_literal(&b.right),
            value_is_param: matches!(&b.right.kind, ExprKind::Param(_)),
        },
        ExprKind::Between(b) => Clause {
            id,
            field: expr_field_name(&b.value),
            comparator: "BETWEEN".to_string(),
            value: Value::Array(vec![expr_to_value(&b.lower), expr_to_value(&b.upper)]),
            source: "where".to_string(),
            confidence: 1.0,
            value_was_quoted: false,
            value_is_param: false,
        },
        ExprKind::In(i) => Clause {
            id,
            field: expr_field_name(&i.value),
            comparator: if i.negated { "NOT IN".to_string() } else { "IN".to_string() },
            value: Value::Array(i.options.iter().map(expr_to_value).collect()),
            source: "where".to_string(),
            confidence: 1.0,
            value_was_quoted: false,
            value_is_param: false,
        },
        ExprKind::HistoryPredicate(hp) => Clause {
            id,
            field: hp.field.to_string(),
            comparator: hp.verb.to_string(),
            value: Value::Text(crate::format::format_expr(expr)),
            source: "where".to_string(),
            confidence: 0.8,
            value_was_quoted: false,
            value_is_param: false,
        },
        ExprKind::Unary(u) if u.op == UnOp::Not => {
            let mut inner = expr_to_clause(&u.operand, ids);
            inner.comparator = format!("NOT {}", inner.comparator);
            inner
        }
        _ => Clause {
            id,
            field: "_expr".to_string(),
            comparator: "RAW".to_string(),
            value: Value::Text(crate::format::format_expr(expr)),
            source: "where".to_string(),
            confidence: 0.3,
            value_was_quoted: false,
            value_is_param: false,
        },
    }
}

fn expr_to_group_child(expr: &Expr, ids: &mut IdGen) -> GroupChild {
    if let ExprKind::Binary(b) = &expr.kind {
        if b.op.is_logical() {
            let operator = if b.op == BinOp::And { GroupOp::And } else { GroupOp::Or };
            let mut group = Group::new(ids.next("g"), operator);
            group.children.push(expr_to_group_child(&b.left, ids));
            group.children.push(expr_to_group_child(&b.right, ids));
            return GroupChild::Group(group);
        }
    }
    GroupChild::Clause(expr_to_clause(expr, ids))
}

fn expr_to_group(expr: Option<&Expr>, ids: &mut IdGen) -> Group {
    match expr {
        None => Group::new(ids.next("g"), GroupOp::And),
        Some(e) => match expr_to_group_child(e, ids) {
            GroupChild::Group(g) => g,
            leaf @ GroupChild::Clause(_) => {
                let mut g = Group::new(ids.next("g"), GroupOp::And);
                g.children.push(leaf);
                g
            }
        },
    }
}

fn group_to_expr(group: &Group) -> Result<Option<Expr>, BuilderError> {
    if group.children.is_empty() {
        return Ok(None);
    }
    let op = match group.operator {
        GroupOp::And => BinOp::And,
        GroupOp::Or => BinOp::Or,
    };
    let mut acc: Option<Expr> = None;
    for child in &group.children {
        let next = match child {
            GroupChild::Group(g) => match group_to_expr(g)? {
                Some(e) => e,
                None => continue,
            },
            GroupChild::Clause(c) => clause_to_expr(c)?,
        };
        acc = Some(match acc {
            None => next,
            Some(prev) => Expr::new(BinaryExpr { left: Box::new(prev), op, right: Box::new(next) }),
        });
    }
    Ok(acc)
}

fn value_to_expr(value: &Value) -> Expr {
    match value {
        Value::Null => Expr::null(),
        Value::Bool(b) => Expr::boolean(*b),
        Value::Int(i) => Expr::number(*i as f64),
        Value::Float(f) => Expr::number(*f),
        Value::Text(s) => Expr::string(s.clone()),
        Value::Date(d) => Expr::string(d.to_rfc3339()),
        other => Expr::string(other.to_string()),
    }
}

/// Like `value_to_expr`, but reconstructs an `ExprKind::Param` instead of a
/// quoted string literal when `is_param` marks `value` as a `:name` token
/// (spec.md §8 property 4) rather than a literal that merely prints the
/// same way.
fn value_to_operand(value: &Value, is_param: bool) -> Expr {
    if is_param {
        if let Value::Text(s) = value {
            if let Some(name) = s.strip_prefix(':') {
                return Expr::new(ExprKind::Param(name.to_string()));
            }
        }
    }
    value_to_expr(value)
}

fn clause_to_expr(c: &Clause) -> Result<Expr, BuilderError> {
    let field = Expr::new(Ident::from_path(c.field.split('.').map(str::to_string).collect()));

    let comparator = c.comparator.trim_start_matches("NOT ").to_string();
    let negate = c.comparator.starts_with("NOT ") && comparator != c.comparator;
    let operand = value_to_operand(&c.value, c.value_is_param);

    let built = match comparator.as_str() {
        "=" => binary(field, BinOp::Eq, operand),
        "!=" | "<>" => binary(field, BinOp::Ne, operand),
        "<" => binary(field, BinOp::Lt, operand),
        "<=" => binary(field, BinOp::Le, operand),
        ">" => binary(field, BinOp::Gt, operand),
        ">=" => binary(field, BinOp::Ge, operand),
        "~" => binary(field, BinOp::Match, operand),
        "!~" => binary(field, BinOp::NotMatch, operand),
        "LIKE" => binary(field, BinOp::Like, operand),
        "ILIKE" => binary(field, BinOp::ILike, operand),
        "CONTAINS" => binary(field, BinOp::Contains, operand),
        "BEFORE" => binary(field, BinOp::Before, operand),
        "AFTER" => binary(field, BinOp::After, operand),
        "ON" => binary(field, BinOp::OnDate, operand),
        "BETWEEN" => {
            let items = c
                .value
                .as_array()
                .ok_or_else(|| BuilderError::FallbackRecovery {
                    clause_id: c.id.clone(),
                    confidence: 0.0,
                    reason: "BETWEEN clause value was not a two-element array".to_string(),
                })?;
            if items.len() != 2 {
                return Err(BuilderError::FallbackRecovery {
                    clause_id: c.id.clone(),
                    confidence: 0.0,
                    reason: "BETWEEN clause value must carry exactly two bounds".to_string(),
                });
            }
            Expr::new(Between {
                value: Box::new(field),
                lower: Box::new(value_to_expr(&items[0])),
                upper: Box::new(value_to_expr(&items[1])),
                negated: false,
            })
        }
        "IN" => {
            let items = c.value.as_array().cloned().unwrap_or_else(|| vec![c.value.clone()]);
            Expr::new(In { value: Box::new(field), options: items.iter().map(value_to_expr).collect(), negated: false })
        }
        other => {
            return Err(BuilderError::UnknownComparator { clause_id: c.id.clone(), comparator: other.to_string() })
        }
    };

    Ok(if negate { Expr::new(opql_ast::UnaryExpr { op: UnOp::Not, operand: Box::new(built) }) } else { built })
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::new(BinaryExpr { left: Box::new(left), op, right: Box::new(right) })
}

#[cfg(test)]
mod test {
    use opql_parser::parse_opql;

    use super::{collect_query_parameters, opql_to_query, query_to_opql, query_to_stmt, stmt_to_query};

    #[test]
    fn simple_where_round_trips_through_builder_tree() {
        let stmt = parse_opql("FIND * FROM tickets WHERE status = 'open' AND priority > 2").unwrap();
        let query = stmt_to_query(&stmt);
        assert_eq!(query.where_.children.len(), 2);
        let rebuilt = query_to_stmt(&query).unwrap();
        assert_eq!(rebuilt.where_.unwrap().kind, stmt.where_.unwrap().kind);
    }

    #[test]
    fn ignores_literal_values_with_no_parameters_present() {
        let stmt = parse_opql("FIND * FROM tickets WHERE status = 'open' AND priority > 2").unwrap();
        let params = collect_query_parameters(&stmt);
        assert!(params.is_empty());
    }

    #[test]
    fn collects_param_tokens_but_not_colons_inside_string_literals() {
        let stmt =
            parse_opql("FIND * FROM tickets WHERE description = 'literal :value' AND priority = :priority").unwrap();
        let params = collect_query_parameters(&stmt);
        assert_eq!(params, vec![opql_ast::Value::Text(":priority".into())]);
    }

    #[test]
    fn collects_multiple_params_in_source_order() {
        let stmt = parse_opql("FIND * FROM tickets WHERE status = :status AND priority > :min_priority").unwrap();
        let params = collect_query_parameters(&stmt);
        assert_eq!(params, vec![opql_ast::Value::Text(":status".into()), opql_ast::Value::Text(":min_priority".into())]);
    }

    #[test]
    fn param_value_survives_the_builder_tree_round_trip() {
        let query = opql_to_query("FIND * FROM tickets WHERE project = :project").unwrap();
        let clause = match &query.where_.children[0] {
            super::GroupChild::Clause(c) => c,
            super::GroupChild::Group(_) => panic!("expected a single clause"),
        };
        assert!(clause.value_is_param);
        assert_eq!(clause.value, opql_ast::Value::Text(":project".to_string()));

        let text = query_to_opql(&query).unwrap();
        assert_eq!(text, "FIND * FROM tickets WHERE project = :project");
    }

    #[test]
    fn numeric_limit_placeholder_parses_and_restores() {
        let query = opql_to_query("FIND * FROM tickets LIMIT :page_size").unwrap();
        assert_eq!(query.limit, None);
        assert_eq!(query.limit_param.as_deref(), Some("page_size"));

        let text = query_to_opql(&query).unwrap();
        assert_eq!(text, "FIND * FROM tickets LIMIT :page_size");
    }

    #[test]
    fn quoted_colon_text_is_not_mistaken_for_a_numeric_placeholder() {
        let query = opql_to_query("FIND * FROM tickets WHERE note = 'LIMIT :not_a_param' LIMIT 10").unwrap();
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.limit_param, None);
    }

    #[test]
    fn aggregate_query_round_trips_verbatim_with_a_parameter() {
        let source = "AGGREGATE COUNT(*) AS total, SUM(duration) AS total_duration FROM ITEMS WHERE status = 'open' AND project = :project GROUP BY assignee HAVING COUNT(*) > 3 ORDER BY total DESC NULLS LAST LIMIT 25 OFFSET 5";
        let query = opql_to_query(source).unwrap();
        let rendered = query_to_opql(&query).unwrap();
        assert_eq!(rendered, source);
    }
}
