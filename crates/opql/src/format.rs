//! Renders a `Stmt`/`Expr` tree back into OPQL source text, spec.md §4.4.
//! Nested binary expressions are wrapped in parens only when their
//! precedence (`BinOp::precedence`) is lower than their parent's, or tied
//! and sitting on the right — the minimum needed for `parse_opql` to
//! recover the same tree, matching spec.md §4.6's "parens around any group
//! with two or more children" rule for the builder round trip.

use opql_ast::{
    BinOp, Expr, ExprKind, HistoryQualifier, HistoryValueComparison, LiteralValue, Stmt, StmtKind,
};

pub fn format_stmt(stmt: &Stmt) -> String {
    let mut out = String::new();
    match &stmt.kind {
        StmtKind::Find(find) => {
            out.push_str("FIND ");
            if find.distinct {
                out.push_str("DISTINCT ");
            }
            out.push_str(&find.projections.join(", "));
        }
        StmtKind::Count(count) => {
            out.push_str("COUNT ");
            if count.distinct {
                out.push_str("DISTINCT ");
            }
            if let Some(cols) = &count.projections {
                out.push('(');
                out.push_str(&cols.join(", "));
                out.push(')');
            }
        }
        StmtKind::Aggregate(agg) => {
            out.push_str("AGGREGATE ");
            let items: Vec<String> = agg
                .aggregates
                .iter()
                .map(|item| {
                    let arg = item.arg.as_ref().map(format_expr).unwrap_or_else(|| "*".to_string());
                    let alias = item.alias.as_ref().map(|a| format!(" AS {a}")).unwrap_or_default();
                    format!("{}({arg}){alias}", item.func)
                })
                .collect();
            out.push_str(&items.join(", "));
        }
        StmtKind::Update(update) => {
            out.push_str("UPDATE ");
            out.push_str(&stmt.source);
            if let Some(alias) = &stmt.alias {
                out.push_str(&format!(" AS {alias}"));
            }
            out.push(' ');
            let assignments: Vec<String> = update
                .assignments
                .iter()
                .map(|a| format!("{} = {}", a.field, format_expr(&a.value)))
                .collect();
            out.push_str(&assignments.join(", "));
            format_where_tail(&mut out, stmt);
            format_order_tail(&mut out, stmt);
            if let Some(returning) = &update.returning {
                out.push_str(" RETURNING ");
                out.push_str(&returning.join(", "));
            }
            return out;
        }
        StmtKind::Explain(explain) => {
            out.push_str("EXPLAIN ");
            if explain.verbose {
                out.push_str("VERBOSE ");
            }
            out.push_str(&format_stmt(&explain.target));
            return out;
        }
    }

    out.push_str(" FROM ");
    out.push_str(&stmt.source);
    if let Some(alias) = &stmt.alias {
        out.push_str(&format!(" AS {alias}"));
    }
    format_where_tail(&mut out, stmt);

    if let StmtKind::Aggregate(agg) = &stmt.kind {
        if !agg.group_by.is_empty() {
            out.push_str(" GROUP BY ");
            out.push_str(&agg.group_by.iter().map(format_expr).collect::<Vec<_>>().join(", "));
        }
        if let Some(having) = &agg.having {
            out.push_str(" HAVING ");
            out.push_str(&format_expr(having));
        }
    }

    format_order_tail(&mut out, stmt);

    out
}

/// Joins, relations and `WHERE`, emitted before `GROUP BY`/`HAVING` so an
/// `AGGREGATE` statement's clauses land in spec.md §4.6's canonical order.
fn format_where_tail(out: &mut String, stmt: &Stmt) {
    for join in &stmt.joins {
        out.push_str(&format!(" {} JOIN {}", join.kind, join.source));
        if let Some(alias) = &join.alias {
            out.push_str(&format!(" AS {alias}"));
        }
        out.push_str(&format!(" ON {}", format_expr(&join.condition)));
    }
    for relation in &stmt.relations {
        out.push_str(&format!(" RELATE {} {}", relation.name, relation.direction));
        if let Some(depth) = relation.depth {
            out.push_str(&format!(" DEPTH {depth}"));
        }
        if let Some(cap) = relation.cap {
            out.push_str(&format!(" CAP {cap}"));
        }
    }
    if let Some(where_) = &stmt.where_ {
        out.push_str(" WHERE ");
        out.push_str(&format_expr(where_));
    }
}

/// `ORDER BY`, `LIMIT`, `OFFSET`, `CURSOR`, `SECURE` — the clauses that
/// follow `GROUP BY`/`HAVING` in spec.md §4.6's canonical order.
fn format_order_tail(out: &mut String, stmt: &Stmt) {
    if !stmt.order_by.is_empty() {
        out.push_str(" ORDER BY ");
        let items: Vec<String> = stmt
            .order_by
            .iter()
            .map(|o| {
                let nulls = o.nulls.map(|n| format!(" NULLS {n}")).unwrap_or_default();
                format!("{} {}{nulls}", format_expr(&o.expr), o.direction)
            })
            .collect();
        out.push_str(&items.join(", "));
    }
    if let Some(limit) = stmt.limit {
        out.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = stmt.offset {
        out.push_str(&format!(" OFFSET {offset}"));
    }
    if let Some(cursor) = &stmt.cursor {
        out.push_str(&format!(" CURSOR '{}'", escape_string(cursor)));
    }
    if let Some(security) = &stmt.security {
        out.push_str(&format!(" SECURE ({})", security.permissions.join(", ")));
    }
}

pub fn format_expr(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Identifier(ident) => ident.to_string(),
        ExprKind::Literal(lit) => format_literal(&lit.value),
        ExprKind::Duration(d) => format!("{}{}", format_number(d.value), d.unit),
        ExprKind::DateMath(dm) => {
            format!("{} {} {}{}", format_expr(&dm.base), dm.op, format_number(dm.offset.value), dm.offset.unit)
        }
        ExprKind::Unary(u) => match u.op {
            opql_ast::UnOp::Not => format!("NOT {}", format_expr(&u.operand)),
            opql_ast::UnOp::Neg => format!("-{}", format_expr(&u.operand)),
        },
        ExprKind::Binary(b) => format_binary(b),
        ExprKind::Between(b) => format!(
            "{} {}BETWEEN {} AND {}",
            format_expr(&b.value),
            if b.negated { "NOT " } else { "" },
            format_expr(&b.lower),
            format_expr(&b.upper)
        ),
        ExprKind::In(i) => format!(
            "{} {}IN ({})",
            format_expr(&i.value),
            if i.negated { "NOT " } else { "" },
            i.options.iter().map(format_expr).collect::<Vec<_>>().join(", ")
        ),
        ExprKind::Function(func) => {
            format!("{}({})", func.name, func.args.iter().map(format_expr).collect::<Vec<_>>().join(", "))
        }
        ExprKind::HistoryPredicate(hp) => format_history_predicate(hp),
        ExprKind::Temporal(t) => format!(
            "{} DURING ({} AND {})",
            format_expr(&t.value),
            format_expr(&t.range.start),
            format_expr(&t.range.end)
        ),
        ExprKind::Param(name) => format!(":{name}"),
    }
}

fn format_binary(b: &opql_ast::BinaryExpr) -> String {
    match b.op {
        BinOp::Is | BinOp::IsNot => {
            let keyword = if b.op == BinOp::Is { "IS" } else { "IS NOT" };
            if let ExprKind::Function(f) = &b.right.kind {
                if f.name == "EMPTY" {
                    return format!("{} {keyword} EMPTY", format_expr(&b.left));
                }
            }
            if let ExprKind::Literal(lit) = &b.right.kind {
                if matches!(lit.value, LiteralValue::Null) {
                    return format!("{} {keyword} NULL", format_expr(&b.left));
                }
            }
            format!("{} {keyword} {}", format_expr(&b.left), format_expr(&b.right))
        }
        _ => format!("{} {} {}", format_operand(&b.left, b.op, false), b.op, format_operand(&b.right, b.op, true)),
    }
}

/// Renders `expr` as an operand of `parent_op`, wrapping it in parens only
/// when its own precedence (spec.md §4.2) is lower than `parent_op`'s, or
/// equal and it sits on the right of a left-associative parent — i.e. only
/// when reparsing without the parens would change which tree comes back.
fn format_operand(expr: &Expr, parent_op: BinOp, is_right: bool) -> String {
    if let ExprKind::Binary(inner) = &expr.kind {
        let needs_parens =
            inner.op.precedence() < parent_op.precedence() || (is_right && inner.op.precedence() == parent_op.precedence());
        if needs_parens {
            return format!("({})", format_expr(expr));
        }
    }
    format_expr(expr)
}

fn format_history_predicate(hp: &opql_ast::HistoryPredicate) -> String {
    let mut out = format!("{}", hp.field);
    match hp.verb {
        opql_ast::HistoryVerb::Was => {
            out.push_str(" WAS ");
            if hp.negated {
                out.push_str("NOT ");
            }
            out.push_str(&format_history_value(hp.comparison.as_ref().expect("WAS carries a comparison")));
        }
        opql_ast::HistoryVerb::Changed => {
            out.push_str(" CHANGED");
            if let Some(change) = &hp.change {
                if let Some(to) = &change.to {
                    out.push_str(" TO ");
                    out.push_str(&format_history_value(to));
                }
                if let Some(from) = &change.from {
                    out.push_str(" FROM ");
                    out.push_str(&format_history_value(from));
                }
            }
        }
    }
    for qualifier in &hp.qualifiers {
        out.push(' ');
        out.push_str(&match qualifier {
            HistoryQualifier::By(e) => format!("BY {}", format_expr(e)),
            HistoryQualifier::After(e) => format!("AFTER {}", format_expr(e)),
            HistoryQualifier::Before(e) => format!("BEFORE {}", format_expr(e)),
            HistoryQualifier::On(e) => format!("ON {}", format_expr(e)),
            HistoryQualifier::During(s, e) => format!("DURING ({} AND {})", format_expr(s), format_expr(e)),
        });
    }
    out
}

fn format_history_value(v: &HistoryValueComparison) -> String {
    match v {
        HistoryValueComparison::Equals { value, negated } => {
            format!("{}{}", if *negated { "NOT " } else { "" }, format_expr(value))
        }
        HistoryValueComparison::In { options, negated } => format!(
            "{}IN ({})",
            if *negated { "NOT " } else { "" },
            options.iter().map(format_expr).collect::<Vec<_>>().join(", ")
        ),
        HistoryValueComparison::Empty { negated } => {
            format!("{}EMPTY", if *negated { "NOT " } else { "" })
        }
        HistoryValueComparison::IsNull { negated } => {
            format!("{}NULL", if *negated { "NOT " } else { "" })
        }
    }
}

fn format_literal(v: &LiteralValue) -> String {
    match v {
        LiteralValue::String(s) => format!("'{}'", escape_string(s)),
        LiteralValue::Number(n) => format_number(*n),
        LiteralValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        LiteralValue::Null => "NULL".to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}
