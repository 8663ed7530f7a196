//! A repository row after permission filtering and field masking, plus the
//! per-field history timeline `WAS`/`CHANGED` predicates scan (spec.md §4.9,
//! glossary "Materialized row").

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use opql_ast::Value;

use super::repository::{FieldMask, HistoryEvent, PermissionRequirement, RelationEdge, RepositoryRow};

/// One interval during which a field held a single value, derived from a
/// row's `history.initial` plus its `history.events`. `start: None` means
/// "since the row existed"; `end: None` means "still current".
#[derive(Debug, Clone)]
pub struct HistorySegment {
    pub value: Value,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub changed_at: DateTime<Utc>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MaterializedRow {
    pub id: String,
    pub entity_type: String,
    pub project_id: Option<String>,
    pub score: f64,
    pub values: BTreeMap<String, Value>,
    /// Carried from the source `RepositoryRow` so the Permissions plan stage
    /// can drop rows the caller lacks grants for.
    pub permissions: PermissionRequirement,
    /// Carried from the source `RepositoryRow`; the Permissions stage
    /// consumes these to populate `masked_fields` and overwrite `values`.
    pub field_masks: BTreeMap<String, FieldMask>,
    pub masked_fields: Vec<String>,
    pub segments: BTreeMap<String, Vec<HistorySegment>>,
    pub events: Vec<HistoryEvent>,
    pub relations: Vec<RelationEdge>,
    pub computed: BTreeMap<String, Value>,
}

impl MaterializedRow {
    pub fn from_repository_row(row: RepositoryRow) -> Self {
        let segments = build_segments(&row);
        MaterializedRow {
            id: row.id,
            entity_type: row.entity_type,
            project_id: row.project_id,
            score: row.score,
            values: row.values,
            permissions: row.permissions,
            field_masks: row.field_masks,
            masked_fields: Vec::new(),
            segments,
            events: row.history.events,
            relations: row.relations,
            computed: BTreeMap::new(),
        }
    }

    /// A row with no repository identity, for the planner's `Aggregate`
    /// stage: a reduced group has no single source row, only computed
    /// fields (spec.md §4.8).
    pub fn synthetic(values: BTreeMap<String, Value>) -> Self {
        MaterializedRow {
            id: String::new(),
            entity_type: String::new(),
            project_id: None,
            score: 0.0,
            values,
            permissions: PermissionRequirement::default(),
            field_masks: BTreeMap::new(),
            masked_fields: Vec::new(),
            segments: BTreeMap::new(),
            events: Vec::new(),
            relations: Vec::new(),
            computed: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).or_else(|| self.computed.get(field))
    }

    /// Applies a field mask in place: overwrites the value and records the
    /// field as masked, for the Permissions plan stage (spec.md §4.8).
    pub fn apply_mask(&mut self, field: &str, mask: &FieldMask) {
        self.values.insert(field.to_string(), mask.mask.clone());
        if !self.masked_fields.iter().any(|f| f == field) {
            self.masked_fields.push(field.to_string());
        }
    }
}

fn build_segments(row: &RepositoryRow) -> BTreeMap<String, Vec<HistorySegment>> {
    let mut by_field: BTreeMap<String, Vec<HistorySegment>> = BTreeMap::new();

    let mut events = row.history.events.clone();
    events.sort_by_key(|e| e.at);

    let touched_fields: Vec<String> = row
        .history
        .initial
        .keys()
        .cloned()
        .chain(events.iter().flat_map(|e| e.changes.iter().map(|c| c.field.clone())))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    for field in touched_fields {
        let mut segments = Vec::new();
        let mut current = row.history.initial.get(&field).cloned().unwrap_or(Value::Null);
        let mut segment_start: Option<DateTime<Utc>> = None;
        let mut last_changed_at = events.first().map(|e| e.at).unwrap_or_else(Utc::now);

        for event in &events {
            if let Some(change) = event.changes.iter().find(|c| c.field == field) {
                segments.push(HistorySegment {
                    value: current.clone(),
                    start: segment_start,
                    end: Some(event.at),
                    changed_at: last_changed_at,
                    actor: None,
                });
                current = change.to.clone().unwrap_or(Value::Null);
                segment_start = Some(event.at);
                last_changed_at = event.at;
            }
        }

        segments.push(HistorySegment { value: current, start: segment_start, end: None, changed_at: last_changed_at, actor: None });

        // Attach the actor that opened each segment (the event at its start).
        for segment in &mut segments {
            if let Some(start) = segment.start {
                segment.actor = events.iter().find(|e| e.at == start).and_then(|e| e.actor.clone());
            }
        }

        by_field.insert(field, segments);
    }

    by_field
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::runtime::repository::{FieldChange, History};

    #[test]
    fn builds_two_segments_from_a_single_change() {
        let mut row = RepositoryRow::new("1", "task");
        row.history = History {
            initial: BTreeMap::from([("status".to_string(), Value::Text("open".into()))]),
            events: vec![HistoryEvent {
                at: Utc::now(),
                actor: Some("alice".into()),
                changes: vec![FieldChange { field: "status".into(), from: Some(Value::Text("open".into())), to: Some(Value::Text("closed".into())) }],
            }],
        };
        let materialized = MaterializedRow::from_repository_row(row);
        let segments = &materialized.segments["status"];
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].value.as_text().unwrap(), "open");
        assert_eq!(segments[1].value.as_text().unwrap(), "closed");
        assert_eq!(segments[1].actor.as_deref(), Some("alice"));
    }
}
