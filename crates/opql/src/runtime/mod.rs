//! Execution runtime, spec.md §4.9/§6: materialized rows, the expression
//! evaluator, history-predicate evaluation, cursor codec, and the
//! `Repository` boundary the planner drives.

pub mod cursor;
pub mod eval;
pub mod mock;
pub mod repository;
pub mod row;

pub use cursor::Cursor;
pub use eval::{evaluate, EvalContext};
pub use mock::MockRepository;
pub use repository::{EntityDefinition, FieldChange, FieldMask, History, HistoryEvent, PermissionRequirement, RelationEdge, Repository, RepositoryRow};
pub use row::{HistorySegment, MaterializedRow};

/// One pipeline stage's contribution to the metrics buffer (spec.md §5's
/// "per-query metrics buffer").
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub row_count: usize,
}

/// The shape every query produces, regardless of FIND/COUNT/AGGREGATE/UPDATE
/// (spec.md §6).
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub rows: Vec<MaterializedRow>,
    pub total: usize,
    pub next_cursor: Option<String>,
    pub metrics: Vec<Stage>,
    pub applied_filters: Vec<String>,
    pub projections: Vec<String>,
}
