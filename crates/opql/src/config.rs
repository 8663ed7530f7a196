use std::sync::Arc;

use chrono_tz::Tz;

/// Immutable runtime configuration, threaded explicitly rather than read
/// from globals, mirroring the teacher's `Options`. Cheap to clone: wrap
/// in `Arc` and share across requests.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound applied when a query carries no `LIMIT` (spec.md §4.8).
    pub default_limit: i64,

    /// Hard ceiling on `LIMIT`, regardless of what the query asks for.
    pub max_limit: i64,

    /// Default `RELATE`/`GRAPH` traversal depth when none is given.
    pub default_relation_depth: u32,

    /// Hard ceiling on `RELATE`/`GRAPH` traversal depth and `CAP`.
    pub max_relation_depth: u32,

    /// Timezone used to resolve bare dates and `DURING` ranges that omit
    /// an offset.
    pub timezone: Tz,

    /// Permissions granted to the caller; `SECURE (...)` clauses are
    /// checked against this set during planning.
    pub granted_permissions: Arc<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_limit: 50,
            max_limit: 1_000,
            default_relation_depth: 1,
            max_relation_depth: 5,
            timezone: chrono_tz::UTC,
            granted_permissions: Arc::new(Vec::new()),
        }
    }
}

impl Config {
    pub fn with_max_limit(mut self, max_limit: i64) -> Self {
        self.max_limit = max_limit;
        self
    }

    pub fn with_default_limit(mut self, default_limit: i64) -> Self {
        self.default_limit = default_limit;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_granted_permissions(mut self, permissions: Vec<String>) -> Self {
        self.granted_permissions = Arc::new(permissions);
        self
    }

    pub fn clamp_limit(&self, requested: Option<i64>) -> i64 {
        requested.unwrap_or(self.default_limit).min(self.max_limit).max(0)
    }

    pub fn clamp_depth(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.default_relation_depth).min(self.max_relation_depth)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.granted_permissions.iter().any(|p| p == permission)
    }
}
