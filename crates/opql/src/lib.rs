//! OPQL: lexer/parser (via `opql-parser`), AST normalization, formatting,
//! the JQL dialect compiler, the structured query builder, the date-math
//! rewriter, the logical planner, and the runtime that evaluates a plan
//! against a `Repository`.
//!
//! The modules mirror the pipeline a query actually travels:
//! `parse_query` (OPQL text, JQL text, or a `BuilderQuery`, all converging
//! on a `Stmt`) → [`normalize`] → [`datemath`] → [`plan`]. [`run_query`]
//! wires that whole chain together for callers who don't need to inspect
//! the intermediate `Stmt`.

pub mod builder;
pub mod config;
pub mod datemath;
pub mod error;
pub mod format;
pub mod jql;
pub mod normalize;
pub mod plan;
pub mod runtime;

pub use config::Config;
pub use datemath::DatePolicy;
pub use error::{BuilderError, OpqlError, PlanError, RuntimeError};
pub use normalize::AliasTable;
pub use plan::{PlanExecutionContext, PlannerOptions, Principal};
pub use runtime::{QueryResult, Repository};

use opql_ast::{BuilderQuery, Stmt};

/// The three surfaces a query can arrive on, spec.md §6. All three
/// converge on a `Stmt` before normalization ever runs.
pub enum QueryInput<'a> {
    Opql(&'a str),
    Jql(&'a str),
    Builder(BuilderQuery),
}

impl<'a> QueryInput<'a> {
    /// Picks OPQL or JQL for freeform text via `jql::is_likely_jql`
    /// (spec.md §4.5), rather than requiring the caller to know which
    /// dialect they're holding.
    pub fn detect(text: &'a str) -> Self {
        if jql::is_likely_jql(text) {
            QueryInput::Jql(text)
        } else {
            QueryInput::Opql(text)
        }
    }
}

/// Parses `input` into a `Stmt`, dispatching to the right front end.
pub fn parse_query(input: QueryInput) -> Result<Stmt, OpqlError> {
    match input {
        QueryInput::Opql(text) => Ok(opql_parser::parse_opql(text)?),
        QueryInput::Jql(text) => jql::compile_jql(text),
        QueryInput::Builder(query) => Ok(builder::query_to_stmt(&query)?),
    }
}

/// Runs the full pipeline — parse, normalize, resolve date-math, plan and
/// execute — and returns the result alongside the date-math policies
/// applied, for callers that want the whole trip in one call.
pub async fn run_query(
    input: QueryInput<'_>,
    aliases: &AliasTable,
    date_policy: &DatePolicy,
    planner_options: &PlannerOptions,
    exec_ctx: &mut PlanExecutionContext,
) -> Result<(QueryResult, Vec<String>), OpqlError> {
    let stmt = parse_query(input)?;
    let stmt = normalize::normalize(stmt, aliases);
    let (stmt, applied_date_policies) = datemath::resolve_statement(stmt, date_policy);
    let result = plan::plan_and_execute(&stmt, planner_options, exec_ctx).await?;
    Ok((result, applied_date_policies))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::runtime::MockRepository;

    #[tokio::test]
    async fn runs_opql_text_end_to_end_against_the_mock_repository() {
        let mut ctx = PlanExecutionContext::new(
            Arc::new(MockRepository::six_task_fixture()),
            Config::default(),
            Principal::new("u1", "ws1").allowing_all(),
            "ws1",
        );
        let date_policy = DatePolicy::new(chrono::Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(), chrono_tz::UTC);
        let (result, _) = run_query(
            QueryInput::detect("FIND * FROM task ORDER BY updated_at DESC LIMIT 2"),
            &AliasTable::standard(),
            &date_policy,
            &PlannerOptions::new("t"),
            &mut ctx,
        )
        .await
        .unwrap();
        assert_eq!(result.rows.len(), 2);
    }

    #[tokio::test]
    async fn runs_jql_text_end_to_end_via_auto_detection() {
        let mut ctx = PlanExecutionContext::new(
            Arc::new(MockRepository::six_task_fixture()),
            Config::default(),
            Principal::new("u1", "ws1").allowing_all(),
            "ws1",
        );
        let date_policy = DatePolicy::new(chrono::Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap(), chrono_tz::UTC);
        let input = QueryInput::detect("assignee = alice ORDER BY created DESC");
        assert!(matches!(input, QueryInput::Jql(_)));
        let (result, _) =
            run_query(input, &AliasTable::standard(), &date_policy, &PlannerOptions::new("t"), &mut ctx).await.unwrap();
        assert_eq!(result.projections, vec!["*".to_string()]);
    }
}
