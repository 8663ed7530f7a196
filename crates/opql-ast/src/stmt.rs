use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Ident};
use crate::Span;

/// `Statement` from spec.md §3: shared base fields plus a per-kind payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub source: String,
    pub alias: Option<String>,
    pub joins: Vec<Join>,
    pub relations: Vec<Relation>,
    pub where_: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub cursor: Option<String>,
    pub security: Option<SecurityClause>,
    /// Planner-internal tie-break keys, distinct from user-specified
    /// `order_by` (spec.md §4.8 `stableBy[]`).
    pub stable_by: Vec<OrderByItem>,

    pub kind: StmtKind,

    #[serde(skip)]
    pub span: Option<Span>,
}

impl Stmt {
    pub fn new(source: impl ToString, kind: StmtKind) -> Self {
        Stmt {
            source: source.to_string(),
            alias: None,
            joins: Vec::new(),
            relations: Vec::new(),
            where_: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            cursor: None,
            security: None,
            stable_by: Vec::new(),
            kind,
            span: None,
        }
    }
}

#[derive(Debug, EnumAsInner, PartialEq, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Find(Find),
    Count(Count),
    Aggregate(Aggregate),
    Update(Update),
    Explain(Explain),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Find {
    pub projections: Vec<String>,
    pub distinct: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Count {
    pub distinct: bool,
    pub projections: Option<Vec<String>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum AggregateFunc {
    #[strum(serialize = "COUNT")]
    Count,
    #[strum(serialize = "SUM")]
    Sum,
    #[strum(serialize = "AVG")]
    Avg,
    #[strum(serialize = "MIN")]
    Min,
    #[strum(serialize = "MAX")]
    Max,
    #[strum(serialize = "ARRAY_AGG")]
    ArrayAgg,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AggregateItem {
    pub func: AggregateFunc,
    /// `None` for `COUNT(*)`.
    pub arg: Option<Expr>,
    pub alias: Option<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub aggregates: Vec<AggregateItem>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub field: Ident,
    pub value: Expr,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Update {
    pub assignments: Vec<Assignment>,
    pub returning: Option<Vec<String>>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Explain {
    pub target: Box<Stmt>,
    pub verbose: bool,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum JoinKind {
    #[strum(serialize = "INNER")]
    Inner,
    #[strum(serialize = "LEFT")]
    Left,
    #[strum(serialize = "RIGHT")]
    Right,
    #[strum(serialize = "FULL")]
    Full,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub source: String,
    pub alias: Option<String>,
    pub condition: Expr,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum RelationDirection {
    #[strum(serialize = "INBOUND")]
    Inbound,
    #[strum(serialize = "OUTBOUND")]
    Outbound,
    #[strum(serialize = "BIDIRECTIONAL")]
    Bidirectional,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub direction: RelationDirection,
    pub depth: Option<u32>,
    pub cap: Option<u32>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum SortDirection {
    #[strum(serialize = "ASC")]
    Asc,
    #[strum(serialize = "DESC")]
    Desc,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum NullsOrder {
    #[strum(serialize = "FIRST")]
    First,
    #[strum(serialize = "LAST")]
    Last,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expr: Expr,
    pub direction: SortDirection,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SecurityClause {
    pub permissions: Vec<String>,
}
