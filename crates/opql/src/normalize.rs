//! Canonicalizes a freshly parsed `Stmt` before planning, spec.md §4.3:
//! field/function alias rewriting, double-negation elimination, boolean
//! constant folding, collapsing a single-option `IN`/`NOT IN` into `=`/`!=`,
//! and injecting a deterministic tie-breaker so cursor pagination never
//! depends on storage order.

use std::collections::BTreeMap;

use opql_ast::{
    Between, BinOp, BinaryExpr, DateMath, Expr, ExprKind, Find, Function, HistoryComparison, Ident,
    HistoryQualifier, HistoryValueComparison, In, LiteralValue, OrderByItem, SortDirection, Stmt,
    StmtKind, Temporal, TemporalRange, UnOp, UnaryExpr,
};

use opql_ast::Span;

/// Process-wide alias tables, read-only once built (spec.md §9: "Global
/// aliases/keyword tables become process-wide read-only tables ... pass
/// through an explicit `Config` parameter rather than mutating globals").
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    pub field_aliases: BTreeMap<String, String>,
    pub function_aliases: BTreeMap<String, String>,
}

impl AliasTable {
    /// The fixed aliases spec.md §4.3 names by example.
    pub fn standard() -> Self {
        let mut field_aliases = BTreeMap::new();
        field_aliases.insert("resolved".to_string(), "completed".to_string());

        let mut function_aliases = BTreeMap::new();
        function_aliases.insert("currentuser".to_string(), "ME".to_string());

        AliasTable { field_aliases, function_aliases }
    }

    fn resolve_field(&self, name: &str) -> String {
        self.field_aliases.get(&name.to_lowercase()).cloned().unwrap_or_else(|| name.to_string())
    }

    fn resolve_function(&self, name: &str) -> String {
        self.function_aliases.get(&name.to_lowercase()).cloned().unwrap_or_else(|| name.to_string())
    }

    fn resolve_ident(&self, mut ident: Ident) -> Ident {
        ident.name = self.resolve_field(&ident.name);
        ident.path = ident.path.into_iter().map(|p| self.resolve_field(&p)).collect();
        ident
    }
}

pub fn normalize(mut stmt: Stmt, aliases: &AliasTable) -> Stmt {
    stmt.where_ = stmt.where_.map(|e| normalize_expr(e, aliases));
    stmt.order_by = stmt
        .order_by
        .into_iter()
        .map(|o| OrderByItem { expr: normalize_expr(o.expr, aliases), ..o })
        .collect();
    stmt.joins = stmt
        .joins
        .into_iter()
        .map(|mut j| {
            j.condition = normalize_expr(j.condition, aliases);
            j
        })
        .collect();

    match &mut stmt.kind {
        StmtKind::Aggregate(agg) => {
            agg.group_by = std::mem::take(&mut agg.group_by).into_iter().map(|e| normalize_expr(e, aliases)).collect();
            agg.having = agg.having.take().map(|e| normalize_expr(e, aliases));
            for item in &mut agg.aggregates {
                item.arg = item.arg.take().map(|e| normalize_expr(e, aliases));
            }
        }
        StmtKind::Update(update) => {
            for assignment in &mut update.assignments {
                assignment.field = aliases.resolve_ident(std::mem::replace(&mut assignment.field, Ident::from_name("")));
                assignment.value = normalize_expr(std::mem::replace(
                    &mut assignment.value,
                    Expr::null(),
                ), aliases);
            }
        }
        StmtKind::Explain(explain) => {
            let placeholder = Stmt::new(String::new(), StmtKind::Find(Find { projections: Vec::new(), distinct: false }));
            let inner = *std::mem::replace(&mut explain.target, Box::new(placeholder));
            explain.target = Box::new(normalize(inner, aliases));
        }
        StmtKind::Find(_) | StmtKind::Count(_) => {}
    }

    inject_stable_tiebreak(&mut stmt);
    stmt
}

fn rewrap<K: Into<ExprKind>>(kind: K, span: Option<Span>) -> Expr {
    match span {
        Some(s) => Expr::spanned(kind, s),
        None => Expr::new(kind),
    }
}

fn normalize_expr(expr: Expr, aliases: &AliasTable) -> Expr {
    let span = expr.span;
    match expr.kind {
        ExprKind::Identifier(ident) => rewrap(aliases.resolve_ident(ident), span),
        ExprKind::Unary(u) => {
            let operand = normalize_expr(*u.operand, aliases);
            if u.op == UnOp::Not {
                if let ExprKind::Unary(inner) = &operand.kind {
                    if inner.op == UnOp::Not {
                        return (*inner.operand).clone();
                    }
                }
                if let ExprKind::Literal(lit) = &operand.kind {
                    if let LiteralValue::Boolean(b) = lit.value {
                        return Expr::boolean(!b);
                    }
                }
            }
            rewrap(UnaryExpr { op: u.op, operand: Box::new(operand) }, span)
        }
        ExprKind::Binary(b) => {
            let left = normalize_expr(*b.left, aliases);
            let right = normalize_expr(*b.right, aliases);
            rewrap(BinaryExpr { left: Box::new(left), op: b.op, right: Box::new(right) }, span)
        }
        ExprKind::Between(b) => rewrap(
            Between {
                value: Box::new(normalize_expr(*b.value, aliases)),
                lower: Box::new(normalize_expr(*b.lower, aliases)),
                upper: Box::new(normalize_expr(*b.upper, aliases)),
                negated: b.negated,
            },
            span,
        ),
        ExprKind::In(i) => {
            let value = normalize_expr(*i.value, aliases);
            let options: Vec<Expr> = i.options.into_iter().map(|e| normalize_expr(e, aliases)).collect();
            if options.len() == 1 {
                let op = if i.negated { BinOp::Ne } else { BinOp::Eq };
                let only = options.into_iter().next().unwrap();
                return rewrap(BinaryExpr { left: Box::new(value), op, right: Box::new(only) }, span);
            }
            rewrap(In { value: Box::new(value), options, negated: i.negated }, span)
        }
        ExprKind::Function(func) => rewrap(
            Function {
                name: aliases.resolve_function(&func.name),
                args: func.args.into_iter().map(|e| normalize_expr(e, aliases)).collect(),
            },
            span,
        ),
        ExprKind::HistoryPredicate(mut hp) => {
            hp.field = aliases.resolve_ident(hp.field);
            hp.comparison = hp.comparison.map(|c| normalize_history_value(c, aliases));
            hp.change = hp.change.map(|c| HistoryComparison {
                to: c.to.map(|v| normalize_history_value(v, aliases)),
                from: c.from.map(|v| normalize_history_value(v, aliases)),
            });
            hp.qualifiers = hp.qualifiers.into_iter().map(|q| normalize_qualifier(q, aliases)).collect();
            rewrap(hp, span)
        }
        ExprKind::Temporal(t) => rewrap(
            Temporal {
                operator: t.operator,
                value: Box::new(normalize_expr(*t.value, aliases)),
                range: TemporalRange {
                    start: Box::new(normalize_expr(*t.range.start, aliases)),
                    end: Box::new(normalize_expr(*t.range.end, aliases)),
                },
            },
            span,
        ),
        ExprKind::DateMath(dm) => rewrap(
            DateMath { base: Box::new(normalize_expr(*dm.base, aliases)), op: dm.op, offset: dm.offset },
            span,
        ),
        other => rewrap(other, span),
    }
}

fn normalize_history_value(v: HistoryValueComparison, aliases: &AliasTable) -> HistoryValueComparison {
    match v {
        HistoryValueComparison::Equals { value, negated } => {
            HistoryValueComparison::Equals { value: Box::new(normalize_expr(*value, aliases)), negated }
        }
        HistoryValueComparison::In { options, negated } => HistoryValueComparison::In {
            options: options.into_iter().map(|e| normalize_expr(e, aliases)).collect(),
            negated,
        },
        other => other,
    }
}

fn normalize_qualifier(q: HistoryQualifier, aliases: &AliasTable) -> HistoryQualifier {
    match q {
        HistoryQualifier::By(e) => HistoryQualifier::By(Box::new(normalize_expr(*e, aliases))),
        HistoryQualifier::After(e) => HistoryQualifier::After(Box::new(normalize_expr(*e, aliases))),
        HistoryQualifier::Before(e) => HistoryQualifier::Before(Box::new(normalize_expr(*e, aliases))),
        HistoryQualifier::On(e) => HistoryQualifier::On(Box::new(normalize_expr(*e, aliases))),
        HistoryQualifier::During(s, e) => {
            HistoryQualifier::During(Box::new(normalize_expr(*s, aliases)), Box::new(normalize_expr(*e, aliases)))
        }
    }
}

fn inject_stable_tiebreak(stmt: &mut Stmt) {
    let already = stmt.order_by.iter().any(orders_by_id) || stmt.stable_by.iter().any(orders_by_id);
    if !already {
        stmt.stable_by.push(OrderByItem { expr: Expr::ident("id"), direction: SortDirection::Asc, nulls: None });
    }
}

fn orders_by_id(item: &OrderByItem) -> bool {
    matches!(&item.expr.kind, ExprKind::Identifier(ident) if ident.path.is_empty() && ident.name.eq_ignore_ascii_case("id"))
}

#[cfg(test)]
mod test {
    use opql_ast::{BinOp, ExprKind};
    use opql_parser::parse_opql;

    use super::{normalize, AliasTable};

    fn norm(text: &str) -> opql_ast::Stmt {
        normalize(parse_opql(text).unwrap(), &AliasTable::default())
    }

    #[test]
    fn double_negation_is_eliminated() {
        let stmt = norm("FIND * FROM t WHERE NOT NOT active = 1");
        assert!(matches!(stmt.where_.unwrap().kind, ExprKind::Binary(_)));
    }

    #[test]
    fn single_option_in_collapses_to_eq() {
        let stmt = norm("FIND * FROM t WHERE status IN ('open')");
        let bin = stmt.where_.unwrap().kind.into_binary().unwrap();
        assert_eq!(bin.op, BinOp::Eq);
    }

    #[test]
    fn single_option_not_in_collapses_to_ne() {
        let stmt = norm("FIND * FROM t WHERE status NOT IN ('open')");
        let bin = stmt.where_.unwrap().kind.into_binary().unwrap();
        assert_eq!(bin.op, BinOp::Ne);
    }

    #[test]
    fn injects_id_tiebreak_when_absent() {
        let stmt = norm("FIND * FROM t ORDER BY created_at DESC");
        assert_eq!(stmt.stable_by.len(), 1);
    }

    #[test]
    fn does_not_duplicate_tiebreak_when_already_ordered_by_id() {
        let stmt = norm("FIND * FROM t ORDER BY id ASC");
        assert!(stmt.stable_by.is_empty());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = norm("FIND * FROM t WHERE NOT NOT a = 1 AND b IN ('x')");
        let twice = normalize(once.clone(), &AliasTable::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn field_alias_rewrites_identifier() {
        let stmt = normalize(parse_opql("FIND * FROM t WHERE resolved = 1").unwrap(), &AliasTable::standard());
        let bin = stmt.where_.unwrap().kind.into_binary().unwrap();
        let ident = bin.left.kind.into_identifier().unwrap();
        assert_eq!(ident.name, "completed");
    }

    #[test]
    fn function_alias_rewrites_call_name() {
        let stmt = normalize(parse_opql("FIND * FROM t WHERE assignee = currentUser()").unwrap(), &AliasTable::standard());
        let bin = stmt.where_.unwrap().kind.into_binary().unwrap();
        let func = bin.right.kind.into_function().unwrap();
        assert_eq!(func.name, "ME");
    }
}
