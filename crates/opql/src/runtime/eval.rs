//! Expression evaluator, spec.md §4.9. Walks an `Expr` against the rows
//! bound for one tuple of the working set and returns a typed `Value`.

use std::collections::BTreeMap;

use opql_ast::{
    BinOp, Expr, ExprKind, HistoryPredicate, HistoryQualifier, HistoryValueComparison, Ident, LiteralValue,
    UnOp, Value,
};
use regex::RegexBuilder;

use super::row::{HistorySegment, MaterializedRow};
use crate::error::RuntimeError;

/// Binds every alias in scope for the tuple currently being evaluated.
/// `default_alias` is where an unqualified identifier resolves.
pub struct EvalContext<'a> {
    pub rows: &'a BTreeMap<String, MaterializedRow>,
    pub default_alias: String,
}

impl<'a> EvalContext<'a> {
    pub fn single(alias: impl ToString, row: &'a MaterializedRow) -> (BTreeMap<String, MaterializedRow>, String) {
        let mut rows = BTreeMap::new();
        rows.insert(alias.to_string(), row.clone());
        (rows, alias.to_string())
    }
}

pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<Value, RuntimeError> {
    match &expr.kind {
        ExprKind::Literal(lit) => Ok(literal_value(&lit.value)),
        ExprKind::Identifier(ident) => Ok(resolve_ident(ident, ctx)),
        ExprKind::Duration(d) => Ok(Value::Float(d.value)),
        ExprKind::Param(name) => Err(RuntimeError::RepositoryFailure {
            message: format!("unbound parameter `:{name}` reached evaluation"),
        }),
        ExprKind::DateMath(_) => Err(RuntimeError::RepositoryFailure {
            message: "DateMath node reached evaluation unresolved; run opql::datemath first".to_string(),
        }),
        ExprKind::Unary(u) => {
            let operand = evaluate(&u.operand, ctx)?;
            Ok(match u.op {
                UnOp::Not => Value::Bool(!operand.truthy()),
                UnOp::Neg => Value::Float(-operand.as_f64().unwrap_or(0.0)),
            })
        }
        ExprKind::Binary(b) => evaluate_binary(b.op, &b.left, &b.right, ctx),
        ExprKind::Between(b) => {
            let value = evaluate(&b.value, ctx)?;
            let lower = evaluate(&b.lower, ctx)?;
            let upper = evaluate(&b.upper, ctx)?;
            let inside = value.compare(&lower) != std::cmp::Ordering::Less && value.compare(&upper) != std::cmp::Ordering::Greater;
            Ok(Value::Bool(inside != b.negated))
        }
        ExprKind::In(i) => {
            let value = evaluate(&i.value, ctx)?;
            let mut matched = false;
            for opt in &i.options {
                if value.equals(&evaluate(opt, ctx)?) {
                    matched = true;
                    break;
                }
            }
            Ok(Value::Bool(matched != i.negated))
        }
        ExprKind::Function(f) => evaluate_function(&f.name, &f.args, ctx),
        ExprKind::HistoryPredicate(hp) => evaluate_history(hp, ctx),
        ExprKind::Temporal(t) => {
            let value = evaluate(&t.value, ctx)?;
            let start = evaluate(&t.range.start, ctx)?;
            let end = evaluate(&t.range.end, ctx)?;
            let inside = value.compare(&start) != std::cmp::Ordering::Less && value.compare(&end) != std::cmp::Ordering::Greater;
            Ok(Value::Bool(inside))
        }
    }
}

fn literal_value(lit: &LiteralValue) -> Value {
    match lit {
        LiteralValue::String(s) => Value::Text(s.clone()),
        LiteralValue::Number(n) => Value::Float(*n),
        LiteralValue::Boolean(b) => Value::Bool(*b),
        LiteralValue::Null => Value::Null,
    }
}

fn resolve_ident(ident: &Ident, ctx: &EvalContext) -> Value {
    if let Some(first) = ident.path.first() {
        if let Some(row) = ctx.rows.get(first) {
            return nested_get(row, &ident.path[1..], &ident.name);
        }
    }
    match ctx.rows.get(&ctx.default_alias) {
        Some(row) => nested_get(row, &ident.path, &ident.name),
        None => Value::Null,
    }
}

fn nested_get(row: &MaterializedRow, path: &[String], name: &str) -> Value {
    if path.is_empty() {
        return row.get(name).cloned().unwrap_or(Value::Null);
    }
    let mut current = row.get(&path[0]).cloned().unwrap_or(Value::Null);
    for segment in path[1..].iter().chain(std::iter::once(&name.to_string())) {
        current = index_into(&current, segment);
    }
    current
}

fn index_into(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Text(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn evaluate_binary(op: BinOp, left: &Expr, right: &Expr, ctx: &EvalContext) -> Result<Value, RuntimeError> {
    if op == BinOp::And || op == BinOp::Or {
        let l = evaluate(left, ctx)?.truthy();
        return Ok(Value::Bool(if op == BinOp::And { l && evaluate(right, ctx)?.truthy() } else { l || evaluate(right, ctx)?.truthy() }));
    }

    if op == BinOp::Is || op == BinOp::IsNot {
        let left_val = evaluate(left, ctx)?;
        let holds = match &right.kind {
            ExprKind::Function(f) if f.name == "EMPTY" => is_empty_value(&left_val),
            ExprKind::Literal(l) if matches!(l.value, LiteralValue::Null) => matches!(left_val, Value::Null),
            _ => left_val.equals(&evaluate(right, ctx)?),
        };
        return Ok(Value::Bool(if op == BinOp::Is { holds } else { !holds }));
    }

    let l = evaluate(left, ctx)?;
    let r = evaluate(right, ctx)?;

    Ok(match op {
        BinOp::Eq => Value::Bool(l.equals(&r)),
        BinOp::Ne => Value::Bool(!l.equals(&r)),
        BinOp::Lt => Value::Bool(l.compare(&r) == std::cmp::Ordering::Less),
        BinOp::Le => Value::Bool(l.compare(&r) != std::cmp::Ordering::Greater),
        BinOp::Gt => Value::Bool(l.compare(&r) == std::cmp::Ordering::Greater),
        BinOp::Ge => Value::Bool(l.compare(&r) != std::cmp::Ordering::Less),
        BinOp::Before => Value::Bool(l.compare(&r) == std::cmp::Ordering::Less),
        BinOp::After => Value::Bool(l.compare(&r) == std::cmp::Ordering::Greater),
        BinOp::OnDate => Value::Bool(l.compare(&r) == std::cmp::Ordering::Equal),
        BinOp::Match => Value::Bool(text_match(&l, &r, false)),
        BinOp::NotMatch => Value::Bool(!text_match(&l, &r, false)),
        BinOp::Like => Value::Bool(like_match(&l, &r, true)),
        BinOp::ILike => Value::Bool(like_match(&l, &r, true)),
        BinOp::Contains => Value::Bool(contains_match(&l, &r)),
        BinOp::Cast => cast_value(&l, &r),
        BinOp::Add => arith(&l, &r, |a, b| a + b)?,
        BinOp::Sub => arith(&l, &r, |a, b| a - b)?,
        BinOp::Mul => arith(&l, &r, |a, b| a * b)?,
        BinOp::Div => {
            let rv = r.as_f64().unwrap_or(0.0);
            if rv == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            arith(&l, &r, |a, b| a / b)?
        }
        BinOp::Mod => {
            let rv = r.as_f64().unwrap_or(0.0);
            if rv == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            arith(&l, &r, |a, b| a % b)?
        }
        BinOp::And | BinOp::Or | BinOp::Is | BinOp::IsNot => unreachable!("handled above"),
    })
}

fn arith(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, RuntimeError> {
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(RuntimeError::TypeMismatch { field: String::new(), expected: "number", found: l.type_name().to_string() });
    };
    Ok(Value::Float(f(a, b)))
}

fn text_match(l: &Value, r: &Value, case_insensitive: bool) -> bool {
    let (Value::Text(haystack), Value::Text(pattern)) = (l, r) else { return false };
    RegexBuilder::new(pattern).case_insensitive(case_insensitive).build().map(|re| re.is_match(haystack)).unwrap_or(false)
}

fn like_match(l: &Value, r: &Value, case_insensitive: bool) -> bool {
    let (Value::Text(haystack), Value::Text(pattern)) = (l, r) else { return false };
    let regex_pattern = format!("^{}$", regex::escape(pattern).replace("%", ".*").replace(r"\%", "%"));
    RegexBuilder::new(&regex_pattern).case_insensitive(case_insensitive).build().map(|re| re.is_match(haystack)).unwrap_or(false)
}

fn contains_match(l: &Value, r: &Value) -> bool {
    match l {
        Value::Text(haystack) => match r {
            Value::Text(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
            other => haystack.to_lowercase().contains(&other.to_string().to_lowercase()),
        },
        Value::Array(items) => items.iter().any(|item| item.equals(r)),
        _ => false,
    }
}

fn cast_value(l: &Value, target: &Value) -> Value {
    let Value::Text(kind) = target else { return l.clone() };
    match kind.as_str() {
        "int" => Value::Int(l.as_f64().unwrap_or(0.0) as i64),
        "float" => Value::Float(l.as_f64().unwrap_or(0.0)),
        "string" => Value::Text(l.to_string()),
        "bool" => Value::Bool(l.truthy()),
        "date" => l.as_text().and_then(|s| opql_ast::parse_timestamp_like(s)).map(Value::Date).unwrap_or(Value::Null),
        _ => l.clone(),
    }
}

fn evaluate_function(name: &str, args: &[Expr], ctx: &EvalContext) -> Result<Value, RuntimeError> {
    match name {
        "contains" => {
            if args.len() < 2 {
                return Ok(Value::Bool(false));
            }
            let haystack = evaluate(&args[0], ctx)?;
            let needle = evaluate(&args[1], ctx)?;
            Ok(Value::Bool(contains_match(&haystack, &needle)))
        }
        "match" => {
            if args.len() < 2 {
                return Ok(Value::Bool(false));
            }
            let field = evaluate(&args[0], ctx)?;
            let target = evaluate(&args[1], ctx)?;
            Ok(Value::Bool(text_match(&field, &target, false)))
        }
        "array" => {
            let mut items = Vec::with_capacity(args.len());
            for a in args {
                items.push(evaluate(a, ctx)?);
            }
            Ok(Value::Array(items))
        }
        "now" => Err(RuntimeError::RepositoryFailure { message: "now() reached evaluation unresolved; run opql::datemath first".to_string() }),
        "changed_by" | "changed_after" | "changed_before" | "changed_during" => evaluate_changed_function(name, args, ctx),
        other => {
            let key = format!("{other}({})", args.iter().map(opql_expr_text).collect::<Vec<_>>().join(", "));
            let row = ctx.rows.get(&ctx.default_alias);
            Ok(row.and_then(|r| r.computed.get(&key)).cloned().unwrap_or(Value::Null))
        }
    }
}

fn opql_expr_text(expr: &Expr) -> String {
    crate::format::format_expr(expr)
}

/// Lowering target for the JQL `WAS`/`CHANGED` qualifiers (spec.md §4.5):
/// `changed_by(field, who)`, `changed_after(field, when)`,
/// `changed_before(field, when)`, `changed_during(field, start, end)` each
/// compile down to a `CHANGED` `HistoryPredicate` with one qualifier, so the
/// runtime recognizes them alongside native history syntax.
fn evaluate_changed_function(name: &str, args: &[Expr], ctx: &EvalContext) -> Result<Value, RuntimeError> {
    let Some(field_arg) = args.first() else { return Ok(Value::Bool(false)) };
    let ExprKind::Identifier(field) = &field_arg.kind else { return Ok(Value::Bool(false)) };

    let qualifier = match (name, args.get(1), args.get(2)) {
        ("changed_by", Some(who), _) => HistoryQualifier::By(Box::new(who.clone())),
        ("changed_after", Some(when), _) => HistoryQualifier::After(Box::new(when.clone())),
        ("changed_before", Some(when), _) => HistoryQualifier::Before(Box::new(when.clone())),
        ("changed_during", Some(start), Some(end)) => HistoryQualifier::During(Box::new(start.clone()), Box::new(end.clone())),
        _ => return Ok(Value::Bool(false)),
    };

    let hp = HistoryPredicate {
        field: field.clone(),
        verb: opql_ast::HistoryVerb::Changed,
        negated: false,
        comparison: None,
        change: None,
        temporal: None,
        qualifiers: vec![qualifier],
    };
    evaluate_history(&hp, ctx)
}

fn evaluate_history(hp: &HistoryPredicate, ctx: &EvalContext) -> Result<Value, RuntimeError> {
    let row = ctx.rows.get(&ctx.default_alias).ok_or_else(|| RuntimeError::RepositoryFailure {
        message: format!("no row bound for history predicate on `{}`", hp.field),
    })?;

    let matched = match hp.verb {
        opql_ast::HistoryVerb::Was => {
            let empty = Vec::new();
            let segments = row.segments.get(&hp.field.name).unwrap_or(&empty);
            let comparison = hp.comparison.as_ref().ok_or_else(|| RuntimeError::MalformedHistory {
                field: hp.field.to_string(),
                reason: "WAS predicate carries no comparison".to_string(),
            })?;
            segments
                .iter()
                .filter(|s| segment_passes_qualifiers(s, &hp.qualifiers, ctx))
                .filter(|s| hp.temporal.as_ref().map(|t| segment_in_temporal(s, t, ctx)).unwrap_or(true))
                .any(|s| history_value_holds(&s.value, comparison, ctx))
        }
        opql_ast::HistoryVerb::Changed => {
            row.events
                .iter()
                .filter(|e| e.changes.iter().any(|c| c.field == hp.field.name))
                .filter(|e| event_passes_qualifiers(e, &hp.qualifiers, ctx))
                .any(|e| {
                    let change = e.changes.iter().find(|c| c.field == hp.field.name).unwrap();
                    let to_ok = hp
                        .change
                        .as_ref()
                        .and_then(|c| c.to.as_ref())
                        .map(|cmp| history_value_holds(&change.to.clone().unwrap_or(Value::Null), cmp, ctx))
                        .unwrap_or(true);
                    let from_ok = hp
                        .change
                        .as_ref()
                        .and_then(|c| c.from.as_ref())
                        .map(|cmp| history_value_holds(&change.from.clone().unwrap_or(Value::Null), cmp, ctx))
                        .unwrap_or(true);
                    to_ok && from_ok
                })
        }
    };

    Ok(Value::Bool(matched != hp.negated))
}

fn history_value_holds(value: &Value, cmp: &HistoryValueComparison, ctx: &EvalContext) -> bool {
    match cmp {
        HistoryValueComparison::Equals { value: expected, negated } => {
            let expected = evaluate(expected, ctx).unwrap_or(Value::Null);
            (value.equals(&expected)) != *negated
        }
        HistoryValueComparison::In { options, negated } => {
            let matched = options.iter().any(|o| value.equals(&evaluate(o, ctx).unwrap_or(Value::Null)));
            matched != *negated
        }
        HistoryValueComparison::Empty { negated } => is_empty_value(value) != *negated,
        HistoryValueComparison::IsNull { negated } => matches!(value, Value::Null) != *negated,
    }
}

fn segment_passes_qualifiers(segment: &HistorySegment, qualifiers: &[HistoryQualifier], ctx: &EvalContext) -> bool {
    qualifiers.iter().all(|q| match q {
        HistoryQualifier::By(actor_expr) => actor_matches(segment.actor.as_deref(), actor_expr, ctx),
        HistoryQualifier::After(e) => timestamp_after(segment.changed_at, e, ctx),
        HistoryQualifier::Before(e) => timestamp_before(segment.changed_at, e, ctx),
        HistoryQualifier::On(e) => timestamp_on(segment.changed_at, e, ctx),
        HistoryQualifier::During(start, end) => range_intersects(segment.start, segment.end, start, end, ctx),
    })
}

fn event_passes_qualifiers(event: &super::repository::HistoryEvent, qualifiers: &[HistoryQualifier], ctx: &EvalContext) -> bool {
    qualifiers.iter().all(|q| match q {
        HistoryQualifier::By(actor_expr) => actor_matches(event.actor.as_deref(), actor_expr, ctx),
        HistoryQualifier::After(e) => timestamp_after(event.at, e, ctx),
        HistoryQualifier::Before(e) => timestamp_before(event.at, e, ctx),
        HistoryQualifier::On(e) => timestamp_on(event.at, e, ctx),
        HistoryQualifier::During(start, end) => range_intersects(Some(event.at), Some(event.at), start, end, ctx),
    })
}

fn actor_matches(actor: Option<&str>, expr: &Expr, ctx: &EvalContext) -> bool {
    let Some(actor) = actor else { return false };
    let expected = evaluate(expr, ctx).unwrap_or(Value::Null);
    match expected {
        Value::Array(items) => items.iter().any(|v| v.as_text().map(|s| s.eq_ignore_ascii_case(actor)).unwrap_or(false)),
        Value::Text(s) => s.eq_ignore_ascii_case(actor),
        _ => false,
    }
}

fn as_timestamp(expr: &Expr, ctx: &EvalContext) -> Option<chrono::DateTime<chrono::Utc>> {
    let value = evaluate(expr, ctx).ok()?;
    match value {
        Value::Date(d) => Some(d),
        Value::Text(s) => opql_ast::parse_timestamp_like(&s),
        _ => None,
    }
}

fn timestamp_after(at: chrono::DateTime<chrono::Utc>, expr: &Expr, ctx: &EvalContext) -> bool {
    as_timestamp(expr, ctx).map(|t| at > t).unwrap_or(false)
}

fn timestamp_before(at: chrono::DateTime<chrono::Utc>, expr: &Expr, ctx: &EvalContext) -> bool {
    as_timestamp(expr, ctx).map(|t| at < t).unwrap_or(false)
}

fn timestamp_on(at: chrono::DateTime<chrono::Utc>, expr: &Expr, ctx: &EvalContext) -> bool {
    as_timestamp(expr, ctx).map(|t| at.date_naive() == t.date_naive()).unwrap_or(false)
}

fn range_intersects(
    seg_start: Option<chrono::DateTime<chrono::Utc>>,
    seg_end: Option<chrono::DateTime<chrono::Utc>>,
    range_start: &Expr,
    range_end: &Expr,
    ctx: &EvalContext,
) -> bool {
    let rs = as_timestamp(range_start, ctx);
    let re = as_timestamp(range_end, ctx);
    let starts_before_range_ends = match (seg_start, re) {
        (Some(s), Some(e)) => s <= e,
        _ => true,
    };
    let ends_after_range_starts = match (seg_end, rs) {
        (Some(e), Some(s)) => e >= s,
        _ => true,
    };
    starts_before_range_ends && ends_after_range_starts
}

fn segment_in_temporal(segment: &HistorySegment, temporal: &opql_ast::Temporal, ctx: &EvalContext) -> bool {
    range_intersects(segment.start, segment.end, &temporal.range.start, &temporal.range.end, ctx)
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use opql_ast::Value;
    use opql_parser::parse_opql;

    use super::{evaluate, EvalContext};
    use crate::runtime::row::MaterializedRow;
    use crate::runtime::repository::RepositoryRow;

    fn row_with(field: &str, value: Value) -> MaterializedRow {
        MaterializedRow::from_repository_row(RepositoryRow::new("1", "task").with_value(field, value))
    }

    #[test]
    fn comparison_operators_evaluate_against_row_values() {
        let row = row_with("priority", Value::Int(5));
        let mut rows = BTreeMap::new();
        rows.insert("root".to_string(), row);
        let ctx = EvalContext { rows: &rows, default_alias: "root".to_string() };
        let stmt = parse_opql("FIND * FROM t WHERE priority > 3").unwrap();
        let result = evaluate(&stmt.where_.unwrap(), &ctx).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn like_match_treats_percent_as_wildcard() {
        let row = row_with("title", Value::Text("Quarterly Roadmap".into()));
        let mut rows = BTreeMap::new();
        rows.insert("root".to_string(), row);
        let ctx = EvalContext { rows: &rows, default_alias: "root".to_string() };
        let stmt = parse_opql("FIND * FROM t WHERE title LIKE '%Roadmap'").unwrap();
        let result = evaluate(&stmt.where_.unwrap(), &ctx).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let row = row_with("x", Value::Int(1));
        let mut rows = BTreeMap::new();
        rows.insert("root".to_string(), row);
        let ctx = EvalContext { rows: &rows, default_alias: "root".to_string() };
        let stmt = parse_opql("FIND * FROM t WHERE x / 0 = 0").unwrap();
        assert!(evaluate(&stmt.where_.unwrap(), &ctx).is_err());
    }
}
