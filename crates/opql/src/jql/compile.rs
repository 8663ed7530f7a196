//! Lowers a parsed `JqlQuery` to OPQL source text, spec.md §4.5. Field and
//! function names go through a fixed alias map (else snake_case); `WAS`
//! qualifiers stay attached to the native `WAS` predicate they modify, but
//! `CHANGED` and every qualifier are lowered to conjunct `changed_*`
//! function predicates rather than OPQL's native `BY`/`AFTER`/`BEFORE`
//! qualifier syntax — a deliberate translation, not a native passthrough.

use std::collections::BTreeMap;

use super::parser::{JqlCmp, JqlExpr, JqlField, JqlOrder, JqlQualifier, JqlQuery, JqlValue};

#[derive(Debug, Clone)]
pub struct JqlAliasTable {
    pub field_aliases: BTreeMap<String, String>,
    pub function_aliases: BTreeMap<String, String>,
}

impl JqlAliasTable {
    /// The aliases spec.md §4.5 names by example.
    pub fn standard() -> Self {
        let mut field_aliases = BTreeMap::new();
        field_aliases.insert("summary".to_string(), "title".to_string());
        field_aliases.insert("assignee".to_string(), "assignee".to_string());
        field_aliases.insert("created".to_string(), "created_at".to_string());
        field_aliases.insert("duedate".to_string(), "due_at".to_string());
        field_aliases.insert("project".to_string(), "project_key".to_string());

        let mut function_aliases = BTreeMap::new();
        function_aliases.insert("currentuser".to_string(), "current_user".to_string());

        JqlAliasTable { field_aliases, function_aliases }
    }

    fn resolve_field(&self, field: &JqlField) -> String {
        match field {
            JqlField::Custom(digits) => format!("custom.cf_{digits}"),
            JqlField::Named(name) => self
                .field_aliases
                .get(&name.to_lowercase())
                .cloned()
                .unwrap_or_else(|| to_snake_case(name)),
        }
    }

    fn resolve_function(&self, name: &str) -> String {
        let stripped: String = name.chars().filter(|c| !c.is_whitespace()).collect();
        self.function_aliases.get(&stripped.to_lowercase()).cloned().unwrap_or_else(|| to_snake_case(&stripped))
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

pub fn compile(query: &JqlQuery, aliases: &JqlAliasTable) -> String {
    let mut out = String::from("FIND ITEMS FROM work_items");
    if let Some(where_) = &query.where_ {
        out.push_str(" WHERE ");
        out.push_str(&emit_expr(where_, aliases));
    }
    if !query.order_by.is_empty() {
        out.push_str(" ORDER BY ");
        out.push_str(&query.order_by.iter().map(|o| emit_order(o, aliases)).collect::<Vec<_>>().join(", "));
    }
    out
}

fn emit_order(order: &JqlOrder, aliases: &JqlAliasTable) -> String {
    format!("{} {}", aliases.resolve_field(&order.field), if order.desc { "DESC" } else { "ASC" })
}

fn emit_value(value: &JqlValue, aliases: &JqlAliasTable) -> String {
    match value {
        JqlValue::String(s) => format!("'{}'", escape_string(s)),
        JqlValue::Number(n) => format_number(*n),
        JqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        JqlValue::Function(name, args) => {
            format!("{}({})", aliases.resolve_function(name), args.iter().map(|a| emit_value(a, aliases)).collect::<Vec<_>>().join(", "))
        }
    }
}

fn emit_cmp(op: JqlCmp) -> &'static str {
    match op {
        JqlCmp::Eq => "=",
        JqlCmp::Ne => "!=",
        JqlCmp::Lt => "<",
        JqlCmp::Le => "<=",
        JqlCmp::Gt => ">",
        JqlCmp::Ge => ">=",
    }
}

fn emit_qualifiers(qualifiers: &[JqlQualifier], field_text: &str, aliases: &JqlAliasTable) -> Vec<String> {
    qualifiers
        .iter()
        .map(|q| match q {
            JqlQualifier::By(v) => format!("changed_by({field_text}, {})", emit_value(v, aliases)),
            JqlQualifier::After(v) => format!("changed_after({field_text}, {})", emit_value(v, aliases)),
            JqlQualifier::Before(v) => format!("changed_before({field_text}, {})", emit_value(v, aliases)),
            JqlQualifier::During(s, e) => {
                format!("changed_during({field_text}, {}, {})", emit_value(s, aliases), emit_value(e, aliases))
            }
        })
        .collect()
}

fn emit_expr(expr: &JqlExpr, aliases: &JqlAliasTable) -> String {
    match expr {
        JqlExpr::And(l, r) => format!("({} AND {})", emit_expr(l, aliases), emit_expr(r, aliases)),
        JqlExpr::Or(l, r) => format!("({} OR {})", emit_expr(l, aliases), emit_expr(r, aliases)),
        JqlExpr::Not(inner) => format!("NOT {}", emit_expr(inner, aliases)),
        JqlExpr::Compare { field, op, value } => {
            format!("{} {} {}", aliases.resolve_field(field), emit_cmp(*op), emit_value(value, aliases))
        }
        JqlExpr::In { field, negated, values } => format!(
            "{} {}IN ({})",
            aliases.resolve_field(field),
            if *negated { "NOT " } else { "" },
            values.iter().map(|v| emit_value(v, aliases)).collect::<Vec<_>>().join(", ")
        ),
        JqlExpr::TextMatch { field, negated, value } => {
            let call = format!("contains({}, {})", aliases.resolve_field(field), emit_value(value, aliases));
            if *negated {
                format!("NOT {call}")
            } else {
                call
            }
        }
        JqlExpr::IsEmpty { field, negated } => {
            format!("{} IS {}EMPTY", aliases.resolve_field(field), if *negated { "NOT " } else { "" })
        }
        JqlExpr::IsNull { field, negated } => {
            format!("{} IS {}NULL", aliases.resolve_field(field), if *negated { "NOT " } else { "" })
        }
        JqlExpr::Was { field, negated, value, qualifiers } => {
            let field_text = aliases.resolve_field(field);
            let base = format!("{field_text} WAS {}{}", if *negated { "NOT " } else { "" }, emit_value(value, aliases));
            let mut parts = vec![base];
            parts.extend(emit_qualifiers(qualifiers, &field_text, aliases));
            parts.join(" AND ")
        }
        JqlExpr::WasIn { field, negated, values, qualifiers } => {
            let field_text = aliases.resolve_field(field);
            let base = format!(
                "{field_text} WAS {}IN ({})",
                if *negated { "NOT " } else { "" },
                values.iter().map(|v| emit_value(v, aliases)).collect::<Vec<_>>().join(", ")
            );
            let mut parts = vec![base];
            parts.extend(emit_qualifiers(qualifiers, &field_text, aliases));
            parts.join(" AND ")
        }
        JqlExpr::Changed { field, qualifiers } => {
            let field_text = aliases.resolve_field(field);
            if qualifiers.is_empty() {
                format!("{field_text} CHANGED")
            } else {
                emit_qualifiers(qualifiers, &field_text, aliases).join(" AND ")
            }
        }
    }
}
