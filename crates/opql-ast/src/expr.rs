mod ident;
mod ops;

pub use ident::Ident;
pub use ops::{BinOp, UnOp};

use serde::{Deserialize, Serialize};

use crate::Span;

impl Expr {
    pub fn new<K: Into<ExprKind>>(kind: K) -> Self {
        Expr { kind: kind.into(), span: None }
    }

    pub fn spanned<K: Into<ExprKind>>(kind: K, span: Span) -> Self {
        Expr { kind: kind.into(), span: Some(span) }
    }
}

/// `Expression` from spec.md §3: the central, immutable AST node.
/// Normalization never mutates a node in place; it produces new trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(flatten)]
    pub kind: ExprKind,

    #[serde(skip)]
    pub span: Option<Span>,
}

#[derive(Debug, enum_as_inner::EnumAsInner, PartialEq, Clone, Serialize, Deserialize, strum::AsRefStr)]
#[serde(tag = "type")]
pub enum ExprKind {
    Identifier(Ident),
    Literal(Literal),
    Duration(Duration),
    DateMath(DateMath),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Between(Between),
    In(In),
    Function(Function),
    HistoryPredicate(HistoryPredicate),
    Temporal(Temporal),
    /// A `:name` builder/JQL parameter placeholder that survived into the
    /// AST (see opql::builder::params).
    Param(String),
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Literal {
    pub value: LiteralValue,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum LiteralValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum DurationUnit {
    #[strum(serialize = "s")]
    Second,
    #[strum(serialize = "m")]
    Minute,
    #[strum(serialize = "h")]
    Hour,
    #[strum(serialize = "d")]
    Day,
    #[strum(serialize = "w")]
    Week,
    #[strum(serialize = "mo")]
    Month,
    #[strum(serialize = "y")]
    Year,
}

impl DurationUnit {
    /// Milliseconds per unit, per spec.md §4.7: `s=10³, m=60·10³, h=3600·10³,
    /// d=86400·10³, w=7·d, mo=30·d, y=365·d`.
    pub fn millis(self) -> i64 {
        match self {
            DurationUnit::Second => 1_000,
            DurationUnit::Minute => 60 * 1_000,
            DurationUnit::Hour => 3_600 * 1_000,
            DurationUnit::Day => 86_400 * 1_000,
            DurationUnit::Week => 7 * 86_400 * 1_000,
            DurationUnit::Month => 30 * 86_400 * 1_000,
            DurationUnit::Year => 365 * 86_400 * 1_000,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Duration {
    pub value: f64,
    pub unit: DurationUnit,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum DateMathOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DateMath {
    pub base: Box<Expr>,
    pub op: DateMathOp,
    pub offset: Duration,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub op: UnOp,
    pub operand: Box<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub op: BinOp,
    pub right: Box<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Between {
    pub value: Box<Expr>,
    pub lower: Box<Expr>,
    pub upper: Box<Expr>,
    pub negated: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct In {
    pub value: Box<Expr>,
    pub options: Vec<Expr>,
    pub negated: bool,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum HistoryVerb {
    #[strum(serialize = "WAS")]
    Was,
    #[strum(serialize = "CHANGED")]
    Changed,
}

/// A single `WAS`/`CHANGED` qualifier, spec.md §4.2: `BY <expr>`,
/// `AFTER <expr>`, `BEFORE <expr>`, `ON <expr>`, `DURING (start, end)`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum HistoryQualifier {
    By(Box<Expr>),
    After(Box<Expr>),
    Before(Box<Expr>),
    On(Box<Expr>),
    During(Box<Expr>, Box<Expr>),
}

/// `TO`/`FROM` comparisons for `CHANGED`, each supporting `[NOT] IN (...)`,
/// `EMPTY`, `NULL`, or a plain expression.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum HistoryValueComparison {
    Equals { value: Box<Expr>, negated: bool },
    In { options: Vec<Expr>, negated: bool },
    Empty { negated: bool },
    IsNull { negated: bool },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct HistoryComparison {
    pub to: Option<HistoryValueComparison>,
    pub from: Option<HistoryValueComparison>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct HistoryPredicate {
    pub field: Ident,
    pub verb: HistoryVerb,
    pub negated: bool,
    /// For `WAS`: the value/IN/EMPTY/NULL comparison applied to each segment.
    pub comparison: Option<HistoryValueComparison>,
    /// For `CHANGED`: the `TO`/`FROM` comparisons applied to each event.
    pub change: Option<HistoryComparison>,
    /// Restricts scanned segments/events to those intersecting a temporal
    /// range, if the comparison carried one (spec.md §4.9).
    pub temporal: Option<Box<Temporal>>,
    pub qualifiers: Vec<HistoryQualifier>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum TemporalOperator {
    #[strum(serialize = "DURING")]
    During,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TemporalRange {
    pub start: Box<Expr>,
    pub end: Box<Expr>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Temporal {
    pub operator: TemporalOperator,
    pub value: Box<Expr>,
    pub range: TemporalRange,
}

impl From<Literal> for ExprKind {
    fn from(value: Literal) -> Self {
        ExprKind::Literal(value)
    }
}

impl From<Ident> for ExprKind {
    fn from(value: Ident) -> Self {
        ExprKind::Identifier(value)
    }
}

impl From<Duration> for ExprKind {
    fn from(value: Duration) -> Self {
        ExprKind::Duration(value)
    }
}

impl From<DateMath> for ExprKind {
    fn from(value: DateMath) -> Self {
        ExprKind::DateMath(value)
    }
}

impl From<UnaryExpr> for ExprKind {
    fn from(value: UnaryExpr) -> Self {
        ExprKind::Unary(value)
    }
}

impl From<BinaryExpr> for ExprKind {
    fn from(value: BinaryExpr) -> Self {
        ExprKind::Binary(value)
    }
}

impl From<Between> for ExprKind {
    fn from(value: Between) -> Self {
        ExprKind::Between(value)
    }
}

impl From<In> for ExprKind {
    fn from(value: In) -> Self {
        ExprKind::In(value)
    }
}

impl From<Function> for ExprKind {
    fn from(value: Function) -> Self {
        ExprKind::Function(value)
    }
}

impl From<HistoryPredicate> for ExprKind {
    fn from(value: HistoryPredicate) -> Self {
        ExprKind::HistoryPredicate(value)
    }
}

impl From<Temporal> for ExprKind {
    fn from(value: Temporal) -> Self {
        ExprKind::Temporal(value)
    }
}

impl Expr {
    pub fn ident<S: ToString>(name: S) -> Self {
        Expr::new(Ident::from_name(name))
    }

    pub fn string<S: ToString>(s: S) -> Self {
        Expr::new(Literal { value: LiteralValue::String(s.to_string()) })
    }

    pub fn number(n: f64) -> Self {
        Expr::new(Literal { value: LiteralValue::Number(n) })
    }

    pub fn boolean(b: bool) -> Self {
        Expr::new(Literal { value: LiteralValue::Boolean(b) })
    }

    pub fn null() -> Self {
        Expr::new(Literal { value: LiteralValue::Null })
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Self {
        Expr::new(BinaryExpr { left: Box::new(left), op, right: Box::new(right) })
    }
}
