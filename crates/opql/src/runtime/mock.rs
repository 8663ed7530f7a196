//! An in-memory `Repository` for tests and the scenario fixtures in
//! spec.md §8 (S6's "fixed 6-row mock repository").

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use super::repository::{EntityDefinition, Repository, RepositoryRow};
use crate::error::RuntimeError;

#[derive(Debug, Default)]
pub struct MockRepository {
    rows: Vec<RepositoryRow>,
}

impl MockRepository {
    pub fn new(rows: Vec<RepositoryRow>) -> Self {
        MockRepository { rows }
    }

    /// The fixed 6-row `tasks` fixture S6 describes: distinct `updated_at`
    /// values so `ORDER BY updated_at DESC` has an unambiguous order, with
    /// ids assigned so ties (none here) would still break by id ascending.
    pub fn six_task_fixture() -> Self {
        let base: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rows = (1..=6)
            .map(|n| {
                RepositoryRow::new(format!("task-{n}"), "task")
                    .with_value("title", opql_ast::Value::Text(format!("Task {n}")))
                    .with_value("updated_at", opql_ast::Value::Date(base + chrono::Duration::hours(n)))
            })
            .collect();
        MockRepository::new(rows)
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn list(&self, _workspace_id: &str, entity_types: &[String]) -> Result<Vec<RepositoryRow>, RuntimeError> {
        if entity_types.is_empty() {
            return Ok(self.rows.clone());
        }
        Ok(self.rows.iter().filter(|r| entity_types.iter().any(|t| t.eq_ignore_ascii_case(&r.entity_type))).cloned().collect())
    }

    async fn list_entity_types(&self) -> Result<Vec<String>, RuntimeError> {
        let mut types: Vec<String> = self.rows.iter().map(|r| r.entity_type.clone()).collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    async fn get_definition(&self, entity_type: &str) -> Result<Option<EntityDefinition>, RuntimeError> {
        let fields: std::collections::BTreeSet<String> = self
            .rows
            .iter()
            .filter(|r| r.entity_type == entity_type)
            .flat_map(|r| r.values.keys().cloned())
            .collect();
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(EntityDefinition { entity_type: entity_type.to_string(), fields: fields.into_iter().collect() }))
    }
}
