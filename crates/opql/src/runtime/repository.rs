//! The `Repository` boundary (spec.md §6): the only dependency the core has
//! on the outside world. Defined as an `async_trait` since `list` is the
//! sole suspension point in the whole evaluation pipeline (spec.md §5).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opql_ast::Value;

use crate::error::RuntimeError;

#[derive(Debug, Clone, Default)]
pub struct PermissionRequirement {
    pub required: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FieldMask {
    pub required: Vec<String>,
    pub mask: Value,
}

#[derive(Debug, Clone)]
pub struct FieldChange {
    pub field: String,
    pub from: Option<Value>,
    pub to: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct HistoryEvent {
    pub at: DateTime<Utc>,
    pub actor: Option<String>,
    pub changes: Vec<FieldChange>,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    /// The pre-event state of every field the history tracks.
    pub initial: BTreeMap<String, Value>,
    pub events: Vec<HistoryEvent>,
}

#[derive(Debug, Clone)]
pub struct RelationEdge {
    pub name: String,
    pub target_id: String,
}

/// A single row as the repository hands it over, before permissions,
/// masking, or relation expansion are applied.
#[derive(Debug, Clone)]
pub struct RepositoryRow {
    pub id: String,
    pub entity_type: String,
    pub project_id: Option<String>,
    /// Relevance score from the repository's own ranking, if any; the
    /// planner's no-`ORDER BY` fallback sorts on this (spec.md §4.8).
    pub score: f64,
    pub values: BTreeMap<String, Value>,
    pub permissions: PermissionRequirement,
    pub field_masks: BTreeMap<String, FieldMask>,
    pub history: History,
    pub relations: Vec<RelationEdge>,
}

impl RepositoryRow {
    pub fn new(id: impl ToString, entity_type: impl ToString) -> Self {
        RepositoryRow {
            id: id.to_string(),
            entity_type: entity_type.to_string(),
            project_id: None,
            score: 0.0,
            values: BTreeMap::new(),
            permissions: PermissionRequirement::default(),
            field_masks: BTreeMap::new(),
            history: History::default(),
            relations: Vec::new(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn with_value(mut self, field: impl ToString, value: Value) -> Self {
        self.values.insert(field.to_string(), value);
        self
    }

    pub fn with_project(mut self, project_id: impl ToString) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    pub fn with_relation(mut self, name: impl ToString, target_id: impl ToString) -> Self {
        self.relations.push(RelationEdge { name: name.to_string(), target_id: target_id.to_string() });
        self
    }
}

#[derive(Debug, Clone)]
pub struct EntityDefinition {
    pub entity_type: String,
    pub fields: Vec<String>,
}

/// The only I/O boundary the core depends on (spec.md §6). A single
/// `list` call materializes everything the planner needs for one query;
/// there is no per-row round trip.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn list(&self, workspace_id: &str, entity_types: &[String]) -> Result<Vec<RepositoryRow>, RuntimeError>;

    async fn list_entity_types(&self) -> Result<Vec<String>, RuntimeError>;

    async fn get_definition(&self, entity_type: &str) -> Result<Option<EntityDefinition>, RuntimeError>;

    /// Default implementation: a full, unfiltered `list`. Repositories that
    /// can produce a cheaper point-in-time snapshot should override this.
    async fn snapshot(&self, workspace_id: &str) -> Result<Vec<RepositoryRow>, RuntimeError> {
        self.list(workspace_id, &[]).await
    }
}
