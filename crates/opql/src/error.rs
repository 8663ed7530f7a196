//! Typed error enums for each stage past parsing, spec.md §7. Hand-rolled
//! `Display`/`Error` impls, matching `opql-parser::error` rather than
//! reaching for `thiserror`.

use std::fmt;

/// Raised converting between `BuilderQuery` and `Stmt` (spec.md §4.6).
#[derive(Debug, Clone, PartialEq)]
pub enum BuilderError {
    UnknownComparator { clause_id: String, comparator: String },
    UnbalancedQuotes { clause_id: String },
    EmptyGroup { group_id: String },
    UnresolvedParameter { name: String },
    /// A clause's value didn't round-trip cleanly into an `Expr`; carries
    /// the confidence score the builder fell back to (spec.md §7).
    FallbackRecovery { clause_id: String, confidence: f32, reason: String },
    /// `opqlToQuery(text)` failed to lex/parse `text` (spec.md §4.6), after
    /// numeric-placeholder substitution. Carries the inner error's message
    /// rather than `opql_parser::OpqlSyntaxError` itself, so this error
    /// stays independent of the parser crate's error representation.
    InvalidSyntax { message: String },
}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderError::UnknownComparator { clause_id, comparator } => {
                write!(f, "clause `{clause_id}`: unknown comparator `{comparator}`")
            }
            BuilderError::UnbalancedQuotes { clause_id } => {
                write!(f, "clause `{clause_id}` has an unbalanced quote")
            }
            BuilderError::EmptyGroup { group_id } => write!(f, "group `{group_id}` has no children"),
            BuilderError::UnresolvedParameter { name } => {
                write!(f, "parameter `:{name}` was never bound")
            }
            BuilderError::FallbackRecovery { clause_id, confidence, reason } => write!(
                f,
                "clause `{clause_id}` recovered at confidence {confidence:.2}: {reason}"
            ),
            BuilderError::InvalidSyntax { message } => write!(f, "invalid OPQL text: {message}"),
        }
    }
}

impl std::error::Error for BuilderError {}

/// Raised while lowering a normalized `Stmt` into a `Plan` (spec.md §4.8).
#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    UnknownField { field: String },
    UnknownEntity { entity_type: String },
    InvalidJoin { reason: String },
    PermissionDenied { permission: String },
    GraphDepthExceeded { requested: u32, max: u32 },
    LimitExceeded { requested: i64, max: i64 },
    InvalidCursor { reason: String },
    AggregateOnUnaggregatedField { field: String },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::UnknownField { field } => write!(f, "unknown field `{field}`"),
            PlanError::UnknownEntity { entity_type } => write!(f, "unknown entity type `{entity_type}`"),
            PlanError::InvalidJoin { reason } => write!(f, "invalid join: {reason}"),
            PlanError::PermissionDenied { permission } => {
                write!(f, "missing permission `{permission}`")
            }
            PlanError::GraphDepthExceeded { requested, max } => {
                write!(f, "relation depth {requested} exceeds maximum {max}")
            }
            PlanError::LimitExceeded { requested, max } => {
                write!(f, "limit {requested} exceeds maximum {max}")
            }
            PlanError::InvalidCursor { reason } => write!(f, "invalid cursor: {reason}"),
            PlanError::AggregateOnUnaggregatedField { field } => {
                write!(f, "field `{field}` must appear in GROUP BY or an aggregate")
            }
        }
    }
}

impl std::error::Error for PlanError {}

/// Raised evaluating a plan against a `Repository` (spec.md §4.9).
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    TypeMismatch { field: String, expected: &'static str, found: String },
    DivisionByZero,
    RepositoryFailure { message: String },
    MalformedHistory { field: String, reason: String },
    /// Raised when a plan's cancellation flag was observed set between
    /// stages or before a repository call (spec.md §5/§7).
    Cancelled,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::TypeMismatch { field, expected, found } => {
                write!(f, "field `{field}`: expected {expected}, found {found}")
            }
            RuntimeError::DivisionByZero => write!(f, "division by zero"),
            RuntimeError::RepositoryFailure { message } => write!(f, "repository failure: {message}"),
            RuntimeError::MalformedHistory { field, reason } => {
                write!(f, "malformed history for `{field}`: {reason}")
            }
            RuntimeError::Cancelled => write!(f, "query cancelled"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Union of every stage's error, for callers driving the whole pipeline
/// (spec.md §4: parse → normalize → plan → execute).
#[derive(Debug, Clone, PartialEq)]
pub enum OpqlError {
    Syntax(opql_parser::OpqlSyntaxError),
    /// A JQL input failed its own lexer/parser, spec.md §7's "separate
    /// provenance tag" distinguishing it from a native OPQL syntax error.
    Compile(crate::jql::CompileError),
    Builder(BuilderError),
    Plan(PlanError),
    Runtime(RuntimeError),
}

impl fmt::Display for OpqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpqlError::Syntax(e) => write!(f, "{e}"),
            OpqlError::Compile(e) => write!(f, "{e}"),
            OpqlError::Builder(e) => write!(f, "{e}"),
            OpqlError::Plan(e) => write!(f, "{e}"),
            OpqlError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OpqlError {}

impl From<opql_parser::OpqlSyntaxError> for OpqlError {
    fn from(e: opql_parser::OpqlSyntaxError) -> Self {
        OpqlError::Syntax(e)
    }
}

impl From<crate::jql::CompileError> for OpqlError {
    fn from(e: crate::jql::CompileError) -> Self {
        OpqlError::Compile(e)
    }
}

impl From<BuilderError> for OpqlError {
    fn from(e: BuilderError) -> Self {
        OpqlError::Builder(e)
    }
}

impl From<PlanError> for OpqlError {
    fn from(e: PlanError) -> Self {
        OpqlError::Plan(e)
    }
}

impl From<RuntimeError> for OpqlError {
    fn from(e: RuntimeError) -> Self {
        OpqlError::Runtime(e)
    }
}
