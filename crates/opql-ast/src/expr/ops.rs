use serde::{Deserialize, Serialize};

/// Unary operators, spec.md §3: `Unary{op ∈ {NOT, NEG}, operand}`.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum UnOp {
    #[strum(to_string = "NOT")]
    Not,
    #[strum(to_string = "-")]
    Neg,
}

/// Binary operators, spec.md §3/§4.2: logical, comparison, arithmetic, and
/// text-match operators, ordered here the way the precedence table in §4.2
/// groups them (arithmetic binds tighter than comparison binds tighter than
/// logical).
#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum BinOp {
    // level 7
    #[strum(to_string = "*")]
    Mul,
    #[strum(to_string = "/")]
    Div,
    #[strum(to_string = "%")]
    Mod,
    // level 6
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Sub,
    // level 5 — comparison, text-match, cast
    #[strum(to_string = "=")]
    Eq,
    #[strum(to_string = "!=")]
    Ne,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Le,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Ge,
    #[strum(to_string = "~")]
    Match,
    #[strum(to_string = "!~")]
    NotMatch,
    #[strum(to_string = "LIKE")]
    Like,
    #[strum(to_string = "ILIKE")]
    ILike,
    #[strum(to_string = "CONTAINS")]
    Contains,
    #[strum(to_string = "IS")]
    Is,
    #[strum(to_string = "IS NOT")]
    IsNot,
    #[strum(to_string = "BEFORE")]
    Before,
    #[strum(to_string = "AFTER")]
    After,
    #[strum(to_string = "ON")]
    OnDate,
    #[strum(to_string = "::")]
    Cast,
    // level 2/1 — logical
    #[strum(to_string = "AND")]
    And,
    #[strum(to_string = "OR")]
    Or,
}

impl BinOp {
    /// The precedence level per spec.md §4.2's table (higher binds
    /// tighter). `Between`/`In` sit at level 4 and are parsed separately
    /// from this table since they aren't simple two-operand binaries.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Mod => 7,
            BinOp::Add | BinOp::Sub => 6,
            BinOp::Eq
            | BinOp::Ne
            | BinOp::Lt
            | BinOp::Le
            | BinOp::Gt
            | BinOp::Ge
            | BinOp::Match
            | BinOp::NotMatch
            | BinOp::Like
            | BinOp::ILike
            | BinOp::Contains
            | BinOp::Is
            | BinOp::IsNot
            | BinOp::Before
            | BinOp::After
            | BinOp::OnDate
            | BinOp::Cast => 5,
            BinOp::And => 2,
            BinOp::Or => 1,
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}
