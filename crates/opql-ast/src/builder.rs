use serde::{Deserialize, Serialize};

use crate::stmt::{AggregateItem, Join, OrderByItem, Relation};
use crate::Value;

/// `BuilderQuery` from spec.md §3: the structured mirror used by the UI and
/// round-trip path. Stable node IDs (`id` fields below) are opaque strings
/// generated at node creation so builder trees stay version-stable across
/// edits, per the invariant in §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderQuery {
    pub statement: BuilderStatementKind,
    pub source: String,
    pub alias: Option<String>,
    pub distinct: bool,
    pub projections: Vec<String>,
    pub aggregates: Vec<AggregateItem>,
    pub joins: Vec<Join>,
    pub relations: Vec<Relation>,
    pub where_: Group,
    pub group_by: Vec<String>,
    pub having: Group,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Set instead of `limit` when the source text used a numeric
    /// placeholder (`LIMIT :n`) rather than a literal, spec.md §4.6/§6.
    pub limit_param: Option<String>,
    /// Set instead of `offset` when the source text used `OFFSET :n`.
    pub offset_param: Option<String>,
    pub cursor: Option<String>,
    pub returning: Vec<String>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum BuilderStatementKind {
    #[strum(serialize = "FIND")]
    Find,
    #[strum(serialize = "COUNT")]
    Count,
    #[strum(serialize = "AGGREGATE")]
    Aggregate,
    #[strum(serialize = "UPDATE")]
    Update,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum GroupOp {
    And,
    Or,
}

/// A node in the WHERE/HAVING tree: either a nested `Group` or a leaf
/// `Clause`. Single-child groups collapse into their child's content
/// without losing the enclosing operator, per spec.md §3 invariant (2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub operator: GroupOp,
    pub children: Vec<GroupChild>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupChild {
    Group(Group),
    Clause(Clause),
}

impl Group {
    pub fn new(id: impl ToString, operator: GroupOp) -> Self {
        Group { id: id.to_string(), operator, children: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// A leaf predicate in a builder tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub id: String,
    pub field: String,
    pub comparator: String,
    pub value: Value,
    /// Free-text fallback source for this clause (used by the
    /// `BuilderError` recovery path, spec.md §7), or the clause's canonical
    /// OPQL text when it round-trips cleanly.
    pub source: String,
    /// Confidence the clause extractor had in this parse, `1.0` for a
    /// clean structured parse, lower for the regex fallback extractor.
    pub confidence: f32,
    /// Whether the original literal was quoted — used by parameter
    /// isolation (spec.md §8 property 4) to exclude clauses whose value
    /// merely *looks* like `:ident` because it was quoted text.
    pub value_was_quoted: bool,
    /// Whether `value` holds a `:name` parameter token (an `ExprKind::Param`
    /// in the source) rather than a literal that happens to render the same
    /// way. Restored back to `ExprKind::Param` by `clause_to_expr` instead
    /// of a quoted string literal.
    pub value_is_param: bool,
}
