//! Rewrites `DateMath` nodes and bare `now()` calls into literal ISO-8601
//! string expressions, spec.md §4.7. Keeps an audit trail of every policy
//! applied so callers can explain why a query's time window is what it is.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use opql_ast::{DateMathOp, Expr, ExprKind, Function, Literal, LiteralValue, Stmt, StmtKind};

/// Governs how `now()` and `DateMath` nodes resolve. `floor_to_day` truncates
/// the resolved instant to midnight in `timezone` before formatting.
#[derive(Debug, Clone)]
pub struct DatePolicy {
    pub now: DateTime<Utc>,
    pub timezone: Tz,
    pub floor_to_day: bool,
}

impl DatePolicy {
    pub fn new(now: DateTime<Utc>, timezone: Tz) -> Self {
        DatePolicy { now, timezone, floor_to_day: false }
    }

    pub fn floored(mut self) -> Self {
        self.floor_to_day = true;
        self
    }

    fn resolve_instant(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        if !self.floor_to_day {
            return instant;
        }
        let local = instant.with_timezone(&self.timezone);
        let floored = self.timezone.with_ymd_and_hms(local.year(), local.month(), local.day(), 0, 0, 0).single();
        floored.map(|dt| dt.with_timezone(&Utc)).unwrap_or(instant)
    }

    fn tz_label(&self) -> String {
        format!("tz={}", self.timezone)
    }
}

use chrono::Datelike;

/// Rewrites every `DateMath`/`now()` node in `stmt`, recording one label per
/// rewrite in the returned trace (spec.md §4.7's `appliedPolicies`).
pub fn resolve_statement(mut stmt: Stmt, policy: &DatePolicy) -> (Stmt, Vec<String>) {
    let mut trace = Vec::new();
    stmt.where_ = stmt.where_.take().map(|e| resolve_expr(e, policy, &mut trace));
    stmt.order_by = stmt
        .order_by
        .into_iter()
        .map(|mut o| {
            o.expr = resolve_expr(o.expr, policy, &mut trace);
            o
        })
        .collect();
    stmt.joins = stmt
        .joins
        .into_iter()
        .map(|mut j| {
            j.condition = resolve_expr(j.condition, policy, &mut trace);
            j
        })
        .collect();

    match &mut stmt.kind {
        StmtKind::Aggregate(agg) => {
            agg.group_by = std::mem::take(&mut agg.group_by)
                .into_iter()
                .map(|e| resolve_expr(e, policy, &mut trace))
                .collect();
            agg.having = agg.having.take().map(|e| resolve_expr(e, policy, &mut trace));
        }
        StmtKind::Update(update) => {
            for assignment in &mut update.assignments {
                let value = std::mem::replace(&mut assignment.value, Expr::null());
                assignment.value = resolve_expr(value, policy, &mut trace);
            }
        }
        StmtKind::Explain(explain) => {
            let placeholder = Stmt::new(String::new(), StmtKind::Find(opql_ast::Find { projections: Vec::new(), distinct: false }));
            let inner = *std::mem::replace(&mut explain.target, Box::new(placeholder));
            let (resolved, inner_trace) = resolve_statement(inner, policy);
            explain.target = Box::new(resolved);
            trace.extend(inner_trace);
        }
        StmtKind::Find(_) | StmtKind::Count(_) => {}
    }

    (stmt, trace)
}

fn resolve_expr(expr: Expr, policy: &DatePolicy, trace: &mut Vec<String>) -> Expr {
    let span = expr.span;
    match expr.kind {
        ExprKind::DateMath(dm) => {
            let base = resolve_expr(*dm.base, policy, trace);
            let base_instant = literal_instant(&base).unwrap_or(policy.now);
            let offset_millis = (dm.offset.value * dm.offset.unit.millis() as f64) as i64;
            let signed = match dm.op {
                DateMathOp::Add => offset_millis,
                DateMathOp::Sub => -offset_millis,
            };
            let shifted = base_instant + chrono::Duration::milliseconds(signed);
            let resolved = policy.resolve_instant(shifted);
            trace.push(format!(
                "date_math[{},{}]:{}{}{}",
                if policy.floor_to_day { "floor" } else { "nofloor" },
                policy.tz_label(),
                match dm.op { DateMathOp::Add => "+", DateMathOp::Sub => "-" },
                format_duration_value(dm.offset.value),
                dm.offset.unit,
            ));
            literal_string(resolved, span)
        }
        ExprKind::Unary(u) => {
            let operand = resolve_expr(*u.operand, policy, trace);
            rewrap(opql_ast::UnaryExpr { op: u.op, operand: Box::new(operand) }, span)
        }
        ExprKind::Binary(b) => {
            let left = resolve_expr(*b.left, policy, trace);
            let right = resolve_expr(*b.right, policy, trace);
            rewrap(opql_ast::BinaryExpr { left: Box::new(left), op: b.op, right: Box::new(right) }, span)
        }
        ExprKind::Between(b) => rewrap(
            opql_ast::Between {
                value: Box::new(resolve_expr(*b.value, policy, trace)),
                lower: Box::new(resolve_expr(*b.lower, policy, trace)),
                upper: Box::new(resolve_expr(*b.upper, policy, trace)),
                negated: b.negated,
            },
            span,
        ),
        ExprKind::In(i) => rewrap(
            opql_ast::In {
                value: Box::new(resolve_expr(*i.value, policy, trace)),
                options: i.options.into_iter().map(|o| resolve_expr(o, policy, trace)).collect(),
                negated: i.negated,
            },
            span,
        ),
        ExprKind::Function(f) if f.name.eq_ignore_ascii_case("now") && f.args.is_empty() => {
            let resolved = policy.resolve_instant(policy.now);
            trace.push(format!(
                "now[{},{}]",
                if policy.floor_to_day { "floor" } else { "nofloor" },
                policy.tz_label()
            ));
            literal_string(resolved, span)
        }
        ExprKind::Function(f) => rewrap(
            Function { name: f.name, args: f.args.into_iter().map(|a| resolve_expr(a, policy, trace)).collect() },
            span,
        ),
        ExprKind::HistoryPredicate(mut hp) => {
            hp.comparison = hp.comparison.map(|c| resolve_history_value(c, policy, trace));
            if let Some(change) = hp.change {
                hp.change = Some(opql_ast::HistoryComparison {
                    to: change.to.map(|c| resolve_history_value(c, policy, trace)),
                    from: change.from.map(|c| resolve_history_value(c, policy, trace)),
                });
            }
            hp.qualifiers = hp.qualifiers.into_iter().map(|q| resolve_qualifier(q, policy, trace)).collect();
            hp.temporal = hp.temporal.map(|t| Box::new(resolve_temporal(*t, policy, trace)));
            rewrap(hp, span)
        }
        ExprKind::Temporal(t) => rewrap(resolve_temporal(t, policy, trace), span),
        other => rewrap(other, span),
    }
}

fn resolve_temporal(t: opql_ast::Temporal, policy: &DatePolicy, trace: &mut Vec<String>) -> opql_ast::Temporal {
    opql_ast::Temporal {
        operator: t.operator,
        value: Box::new(resolve_expr(*t.value, policy, trace)),
        range: opql_ast::TemporalRange {
            start: Box::new(resolve_expr(*t.range.start, policy, trace)),
            end: Box::new(resolve_expr(*t.range.end, policy, trace)),
        },
    }
}

fn resolve_history_value(
    v: opql_ast::HistoryValueComparison,
    policy: &DatePolicy,
    trace: &mut Vec<String>,
) -> opql_ast::HistoryValueComparison {
    use opql_ast::HistoryValueComparison as H;
    match v {
        H::Equals { value, negated } => H::Equals { value: Box::new(resolve_expr(*value, policy, trace)), negated },
        H::In { options, negated } => {
            H::In { options: options.into_iter().map(|o| resolve_expr(o, policy, trace)).collect(), negated }
        }
        other => other,
    }
}

fn resolve_qualifier(q: opql_ast::HistoryQualifier, policy: &DatePolicy, trace: &mut Vec<String>) -> opql_ast::HistoryQualifier {
    use opql_ast::HistoryQualifier as Q;
    match q {
        Q::By(e) => Q::By(Box::new(resolve_expr(*e, policy, trace))),
        Q::After(e) => Q::After(Box::new(resolve_expr(*e, policy, trace))),
        Q::Before(e) => Q::Before(Box::new(resolve_expr(*e, policy, trace))),
        Q::On(e) => Q::On(Box::new(resolve_expr(*e, policy, trace))),
        Q::During(s, e) => Q::During(Box::new(resolve_expr(*s, policy, trace)), Box::new(resolve_expr(*e, policy, trace))),
    }
}

fn literal_instant(expr: &Expr) -> Option<DateTime<Utc>> {
    match &expr.kind {
        ExprKind::Literal(Literal { value: LiteralValue::String(s) }) => opql_ast::parse_timestamp_like(s),
        _ => None,
    }
}

fn literal_string(instant: DateTime<Utc>, span: Option<opql_ast::Span>) -> Expr {
    rewrap(
        Literal { value: LiteralValue::String(instant.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)) },
        span,
    )
}

fn rewrap<K: Into<ExprKind>>(kind: K, span: Option<opql_ast::Span>) -> Expr {
    match span {
        Some(s) => Expr::spanned(kind, s),
        None => Expr::new(kind),
    }
}

fn format_duration_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use opql_parser::parse_opql;

    use super::{resolve_statement, DatePolicy};

    fn fixed_policy() -> DatePolicy {
        DatePolicy::new(chrono::Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(), chrono_tz::UTC)
    }

    #[test]
    fn now_resolves_to_literal_timestamp() {
        let stmt = parse_opql("FIND * FROM t WHERE created_at < now()").unwrap();
        let (resolved, trace) = resolve_statement(stmt, &fixed_policy());
        let bin = resolved.where_.unwrap().kind.into_binary().unwrap();
        assert!(matches!(bin.right.kind, opql_ast::ExprKind::Literal(_)));
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn date_math_subtracts_days() {
        let stmt = parse_opql("FIND * FROM t WHERE created_at > now() - 7d").unwrap();
        let (resolved, trace) = resolve_statement(stmt, &fixed_policy());
        let bin = resolved.where_.unwrap().kind.into_binary().unwrap();
        let lit = bin.right.kind.into_literal().unwrap();
        let opql_ast::LiteralValue::String(s) = lit.value else { panic!("expected string literal") };
        assert!(s.starts_with("2024-06-08"));
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn floor_to_day_truncates_time() {
        let policy = fixed_policy().floored();
        let stmt = parse_opql("FIND * FROM t WHERE created_at > now()").unwrap();
        let (resolved, _) = resolve_statement(stmt, &policy);
        let bin = resolved.where_.unwrap().kind.into_binary().unwrap();
        let lit = bin.right.kind.into_literal().unwrap();
        let opql_ast::LiteralValue::String(s) = lit.value else { panic!("expected string literal") };
        assert!(s.starts_with("2024-06-15T00:00:00"));
    }
}
