//! Logical planner, spec.md §4.8: lowers a `Stmt` into a fixed pipeline of
//! `PlanNode`s and drives them against a `Repository`.
//!
//! `Find`/`Aggregate` pipeline: `Scan → Permissions → Relate → Join →
//! Apply(WHERE) → [Aggregate(GROUP/HAVING)] → Sort → Limit → Project`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use opql_ast::{
    Aggregate, AggregateFunc, AggregateItem, Expr, Join, JoinKind, NullsOrder, OrderByItem, Relation, SortDirection,
    Stmt, StmtKind, Value,
};

use crate::config::Config;
use crate::error::{OpqlError, PlanError, RuntimeError};
use crate::format::format_expr;
use crate::runtime::cursor::Cursor;
use crate::runtime::eval::{evaluate, EvalContext};
use crate::runtime::repository::Repository;
use crate::runtime::row::MaterializedRow;
use crate::runtime::{QueryResult, Stage};

/// One working-set row, keyed by alias (`root_alias` is the base row; join
/// and relate aliases accumulate as the pipeline runs).
pub type RowTuple = BTreeMap<String, MaterializedRow>;

/// The acting user (spec.md §3's `Principal`), checked by the `Permissions`
/// stage.
#[derive(Debug, Clone, Default)]
pub struct Principal {
    pub user_id: String,
    pub workspace_id: String,
    pub permissions: BTreeSet<String>,
    /// Bypasses both permission filtering and field masking.
    pub allow_all: bool,
}

impl Principal {
    pub fn new(user_id: impl ToString, workspace_id: impl ToString) -> Self {
        Principal { user_id: user_id.to_string(), workspace_id: workspace_id.to_string(), permissions: BTreeSet::new(), allow_all: false }
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = impl ToString>) -> Self {
        self.permissions = permissions.into_iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn allowing_all(mut self) -> Self {
        self.allow_all = true;
        self
    }

    fn satisfies(&self, required: &[String]) -> bool {
        self.allow_all || required.iter().all(|p| self.permissions.contains(p))
    }
}

/// Per-query planner knobs, spec.md §4.8's `PlannerOptions`.
#[derive(Debug, Clone, Default)]
pub struct PlannerOptions {
    pub root_alias: String,
    pub alias_sources: BTreeMap<String, String>,
    pub graph_depth_cap: Option<u32>,
    pub stable_order: Vec<OrderByItem>,
    pub cursor: Option<String>,
}

impl PlannerOptions {
    pub fn new(root_alias: impl ToString) -> Self {
        PlannerOptions { root_alias: root_alias.to_string(), ..Default::default() }
    }
}

/// Carried across stages for one execution: the repository handle, policy,
/// acting principal, cancellation flag, and the metrics/cursor state each
/// stage contributes to (spec.md §5's "per-query metrics buffer").
pub struct PlanExecutionContext {
    pub repository: Arc<dyn Repository>,
    pub config: Config,
    pub principal: Principal,
    pub workspace_id: String,
    pub cancelled: Arc<AtomicBool>,
    pub stages: Vec<Stage>,
    pub applied_filters: Vec<String>,
    pub window_total: usize,
    pub next_cursor: Option<String>,
}

impl PlanExecutionContext {
    pub fn new(repository: Arc<dyn Repository>, config: Config, principal: Principal, workspace_id: impl ToString) -> Self {
        PlanExecutionContext {
            repository,
            config,
            principal,
            workspace_id: workspace_id.to_string(),
            cancelled: Arc::new(AtomicBool::new(false)),
            stages: Vec::new(),
            applied_filters: Vec::new(),
            window_total: 0,
            next_cursor: None,
        }
    }

    fn record_stage(&mut self, name: &str, row_count: usize) {
        self.stages.push(Stage { name: name.to_string(), row_count });
    }
}

fn check_cancelled(ctx: &PlanExecutionContext) -> Result<(), OpqlError> {
    if ctx.cancelled.load(AtomicOrdering::SeqCst) {
        return Err(RuntimeError::Cancelled.into());
    }
    Ok(())
}

/// One stage of the pipeline. `describe()` backs `EXPLAIN`; `execute`
/// consumes the prior stage's tuples and returns the next working set.
#[async_trait]
pub trait PlanNode: Send + Sync {
    fn describe(&self) -> String;

    async fn execute(&self, ctx: &mut PlanExecutionContext, input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError>;
}

pub struct ScanNode {
    pub alias: String,
    pub source: String,
}

#[async_trait]
impl PlanNode for ScanNode {
    fn describe(&self) -> String {
        format!("Scan(source={}, alias={})", self.source, self.alias)
    }

    async fn execute(&self, ctx: &mut PlanExecutionContext, _input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError> {
        check_cancelled(ctx)?;
        if self.source != "*" {
            let known = ctx.repository.list_entity_types().await?;
            if !known.is_empty() && !known.iter().any(|t| t.eq_ignore_ascii_case(&self.source)) {
                return Err(PlanError::UnknownEntity { entity_type: self.source.clone() }.into());
            }
        }
        let entity_types = if self.source == "*" { Vec::new() } else { vec![self.source.clone()] };
        let rows = ctx.repository.list(&ctx.workspace_id, &entity_types).await?;
        let tuples: Vec<RowTuple> = rows
            .into_iter()
            .map(|row| {
                let mut tuple = RowTuple::new();
                tuple.insert(self.alias.clone(), MaterializedRow::from_repository_row(row));
                tuple
            })
            .collect();
        ctx.record_stage("Scan", tuples.len());
        Ok(tuples)
    }
}

pub struct PermissionsNode {
    pub alias: String,
}

#[async_trait]
impl PlanNode for PermissionsNode {
    fn describe(&self) -> String {
        format!("Permissions(alias={})", self.alias)
    }

    async fn execute(&self, ctx: &mut PlanExecutionContext, input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError> {
        check_cancelled(ctx)?;
        let mut output = Vec::with_capacity(input.len());
        for mut tuple in input {
            let Some(row) = tuple.get_mut(&self.alias) else {
                output.push(tuple);
                continue;
            };
            if !ctx.principal.satisfies(&row.permissions.required) {
                continue;
            }
            let masks: Vec<(String, crate::runtime::repository::FieldMask)> = row.field_masks.clone().into_iter().collect();
            for (field, mask) in masks {
                if !ctx.principal.satisfies(&mask.required) {
                    row.apply_mask(&field, &mask);
                    // History predicates on a masked field are filtered
                    // unless the principal has `allow_all` (spec.md §8
                    // property 7) — strip the field's timeline entirely.
                    row.segments.remove(&field);
                    for event in &mut row.events {
                        event.changes.retain(|c| c.field != field);
                    }
                }
            }
            output.push(tuple);
        }
        ctx.record_stage("Permissions", output.len());
        Ok(output)
    }
}

pub struct RelateNode {
    pub alias: String,
    pub relations: Vec<Relation>,
}

#[async_trait]
impl PlanNode for RelateNode {
    fn describe(&self) -> String {
        format!("Relate(alias={}, relations={})", self.alias, self.relations.len())
    }

    async fn execute(&self, ctx: &mut PlanExecutionContext, input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError> {
        if self.relations.is_empty() {
            return Ok(input);
        }
        check_cancelled(ctx)?;

        for relation in &self.relations {
            let requested = relation.depth.unwrap_or(ctx.config.default_relation_depth);
            let cap = ctx.config.max_relation_depth;
            if requested > cap {
                return Err(PlanError::GraphDepthExceeded { requested, max: cap }.into());
            }
        }

        let snapshot = ctx.repository.snapshot(&ctx.workspace_id).await?;
        let by_id: BTreeMap<String, MaterializedRow> =
            snapshot.into_iter().map(|row| (row.id.clone(), MaterializedRow::from_repository_row(row))).collect();

        let mut output = Vec::new();
        for tuple in &input {
            let Some(root) = tuple.get(&self.alias) else {
                output.push(tuple.clone());
                continue;
            };

            let mut expanded_any = false;
            for relation in &self.relations {
                let depth = relation.depth.unwrap_or(ctx.config.default_relation_depth).min(ctx.config.max_relation_depth) as usize;
                let cap = relation.cap.map(|c| c as usize).unwrap_or(usize::MAX);

                let mut visited: BTreeSet<String> = BTreeSet::from([root.id.clone()]);
                let mut frontier = vec![root.clone()];
                let mut collected: Vec<MaterializedRow> = Vec::new();

                'bfs: for _ in 0..depth {
                    let mut next_frontier = Vec::new();
                    for current in &frontier {
                        for edge in &current.relations {
                            if edge.name != relation.name || visited.contains(&edge.target_id) {
                                continue;
                            }
                            let Some(target) = by_id.get(&edge.target_id) else { continue };
                            if target.project_id != root.project_id {
                                continue;
                            }
                            visited.insert(target.id.clone());
                            collected.push(target.clone());
                            next_frontier.push(target.clone());
                            if collected.len() >= cap {
                                break 'bfs;
                            }
                        }
                    }
                    if next_frontier.is_empty() {
                        break;
                    }
                    frontier = next_frontier;
                }

                for related in collected {
                    expanded_any = true;
                    let mut extended = tuple.clone();
                    extended.insert(relation.name.clone(), related);
                    output.push(extended);
                }
            }

            if !expanded_any {
                output.push(tuple.clone());
            }
        }

        ctx.record_stage("Relate", output.len());
        Ok(output)
    }
}

pub struct JoinNode {
    pub joins: Vec<Join>,
}

#[async_trait]
impl PlanNode for JoinNode {
    fn describe(&self) -> String {
        format!("Join(count={})", self.joins.len())
    }

    async fn execute(&self, ctx: &mut PlanExecutionContext, input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError> {
        if self.joins.is_empty() {
            return Ok(input);
        }
        let mut rows = input;
        for join in &self.joins {
            check_cancelled(ctx)?;
            let alias = join.alias.clone().unwrap_or_else(|| join.source.clone());

            let known = ctx.repository.list_entity_types().await?;
            if !known.is_empty() && !known.iter().any(|t| t.eq_ignore_ascii_case(&join.source)) {
                return Err(PlanError::UnknownEntity { entity_type: join.source.clone() }.into());
            }
            if matches!(join.condition.kind, opql_ast::ExprKind::Literal(_)) {
                return Err(PlanError::InvalidJoin { reason: "join condition does not reference either side".to_string() }.into());
            }

            let candidates: Vec<MaterializedRow> =
                ctx.repository.list(&ctx.workspace_id, &[join.source.clone()]).await?.into_iter().map(MaterializedRow::from_repository_row).collect();

            let mut next_rows = Vec::new();
            let mut matched_candidate_ids: BTreeSet<String> = BTreeSet::new();

            for tuple in &rows {
                let mut matched_any = false;
                for candidate in &candidates {
                    let mut extended = tuple.clone();
                    extended.insert(alias.clone(), candidate.clone());
                    let eval_ctx = EvalContext { rows: &extended, default_alias: alias.clone() };
                    if evaluate(&join.condition, &eval_ctx)?.truthy() {
                        matched_any = true;
                        matched_candidate_ids.insert(candidate.id.clone());
                        next_rows.push(extended);
                    }
                }
                match join.kind {
                    JoinKind::Inner | JoinKind::Right => {}
                    JoinKind::Left | JoinKind::Full => {
                        if !matched_any {
                            next_rows.push(tuple.clone());
                        }
                    }
                }
            }

            if matches!(join.kind, JoinKind::Right | JoinKind::Full) {
                for candidate in &candidates {
                    if matched_candidate_ids.contains(&candidate.id) {
                        continue;
                    }
                    let mut orphan = RowTuple::new();
                    orphan.insert(alias.clone(), candidate.clone());
                    next_rows.push(orphan);
                }
            }

            rows = next_rows;
        }
        ctx.record_stage("Join", rows.len());
        Ok(rows)
    }
}

pub struct ApplyNode {
    pub alias: String,
    pub where_: Option<Expr>,
}

#[async_trait]
impl PlanNode for ApplyNode {
    fn describe(&self) -> String {
        match &self.where_ {
            Some(e) => format!("Apply(where={})", format_expr(e)),
            None => "Apply(where=none)".to_string(),
        }
    }

    async fn execute(&self, ctx: &mut PlanExecutionContext, input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError> {
        check_cancelled(ctx)?;
        let Some(where_) = &self.where_ else {
            ctx.record_stage("Apply", input.len());
            return Ok(input);
        };
        ctx.applied_filters.push(format_expr(where_));
        let mut output = Vec::with_capacity(input.len());
        for tuple in input {
            let eval_ctx = EvalContext { rows: &tuple, default_alias: self.alias.clone() };
            if evaluate(where_, &eval_ctx)?.truthy() {
                output.push(tuple);
            }
        }
        ctx.record_stage("Apply", output.len());
        Ok(output)
    }
}

pub struct AggregateNode {
    pub alias: String,
    pub aggregate: Aggregate,
}

#[async_trait]
impl PlanNode for AggregateNode {
    fn describe(&self) -> String {
        format!("Aggregate(group_by={}, aggregates={})", self.aggregate.group_by.len(), self.aggregate.aggregates.len())
    }

    async fn execute(&self, ctx: &mut PlanExecutionContext, input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError> {
        check_cancelled(ctx)?;

        let mut groups: Vec<(String, Vec<Value>, Vec<RowTuple>)> = Vec::new();
        for tuple in input {
            let eval_ctx = EvalContext { rows: &tuple, default_alias: self.alias.clone() };
            let mut key_values = Vec::with_capacity(self.aggregate.group_by.len());
            for g in &self.aggregate.group_by {
                key_values.push(evaluate(g, &eval_ctx)?);
            }
            let key = serde_json::to_string(&key_values).unwrap_or_default();
            match groups.iter_mut().find(|(k, ..)| *k == key) {
                Some((_, _, members)) => members.push(tuple),
                None => groups.push((key, key_values, vec![tuple])),
            }
        }

        let mut output = Vec::with_capacity(groups.len());
        for (_, key_values, members) in groups {
            let mut values = BTreeMap::new();
            for (g_expr, value) in self.aggregate.group_by.iter().zip(key_values.iter()) {
                values.insert(format_expr(g_expr), value.clone());
            }
            for item in &self.aggregate.aggregates {
                let name = item.alias.clone().unwrap_or_else(|| default_aggregate_name(item));
                values.insert(name, compute_aggregate(item, &members, &self.alias)?);
            }
            let row = MaterializedRow::synthetic(values);

            if let Some(having) = &self.aggregate.having {
                let mut rows_map = RowTuple::new();
                rows_map.insert(self.alias.clone(), row.clone());
                let eval_ctx = EvalContext { rows: &rows_map, default_alias: self.alias.clone() };
                if !evaluate(having, &eval_ctx)?.truthy() {
                    continue;
                }
            }

            let mut tuple = RowTuple::new();
            tuple.insert(self.alias.clone(), row);
            output.push(tuple);
        }

        ctx.record_stage("Aggregate", output.len());
        Ok(output)
    }
}

fn default_aggregate_name(item: &AggregateItem) -> String {
    match (&item.func, &item.arg) {
        (AggregateFunc::Count, None) => "count".to_string(),
        (func, Some(arg)) => format!("{}_{}", func.to_string().to_lowercase(), format_expr(arg)),
        (func, None) => func.to_string().to_lowercase(),
    }
}

fn compute_aggregate(item: &AggregateItem, members: &[RowTuple], alias: &str) -> Result<Value, OpqlError> {
    if item.func == AggregateFunc::Count && item.arg.is_none() {
        return Ok(Value::Int(members.len() as i64));
    }
    let arg = item.arg.as_ref().expect("non-COUNT(*) aggregate carries an argument");
    let mut values = Vec::with_capacity(members.len());
    for tuple in members {
        let eval_ctx = EvalContext { rows: tuple, default_alias: alias.to_string() };
        values.push(evaluate(arg, &eval_ctx)?);
    }
    Ok(match item.func {
        AggregateFunc::Count => Value::Int(values.iter().filter(|v| !matches!(v, Value::Null)).count() as i64),
        AggregateFunc::Sum => Value::Float(values.iter().filter_map(|v| v.as_f64()).sum()),
        AggregateFunc::Avg => {
            let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::Float(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        AggregateFunc::Min => values.into_iter().min_by(|a, b| a.compare(b)).unwrap_or(Value::Null),
        AggregateFunc::Max => values.into_iter().max_by(|a, b| a.compare(b)).unwrap_or(Value::Null),
        AggregateFunc::ArrayAgg => Value::Array(values),
    })
}

pub struct SortNode {
    pub alias: String,
    pub order_by: Vec<OrderByItem>,
    pub stable_by: Vec<OrderByItem>,
}

#[async_trait]
impl PlanNode for SortNode {
    fn describe(&self) -> String {
        format!("Sort(order_by={}, stable_by={})", self.order_by.len(), self.stable_by.len())
    }

    async fn execute(&self, ctx: &mut PlanExecutionContext, input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError> {
        check_cancelled(ctx)?;
        let mut combined = self.order_by.clone();
        combined.extend(self.stable_by.clone());
        let mut rows = input;

        if combined.is_empty() {
            rows.sort_by(|a, b| {
                let sa = a.get(&self.alias).map(|r| r.score).unwrap_or(0.0);
                let sb = b.get(&self.alias).map(|r| r.score).unwrap_or(0.0);
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal).then_with(|| tie_break_id(a, b, &self.alias))
            });
        } else {
            rows.sort_by(|a, b| {
                for item in &combined {
                    let eval_a = EvalContext { rows: a, default_alias: self.alias.clone() };
                    let eval_b = EvalContext { rows: b, default_alias: self.alias.clone() };
                    let va = evaluate(&item.expr, &eval_a).unwrap_or(Value::Null);
                    let vb = evaluate(&item.expr, &eval_b).unwrap_or(Value::Null);
                    let ord = order_with_nulls(&va, &vb, item.direction, item.nulls);
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                tie_break_id(a, b, &self.alias)
            });
        }

        ctx.record_stage("Sort", rows.len());
        Ok(rows)
    }
}

fn tie_break_id(a: &RowTuple, b: &RowTuple, alias: &str) -> std::cmp::Ordering {
    let ia = a.get(alias).map(|r| r.id.as_str()).unwrap_or("");
    let ib = b.get(alias).map(|r| r.id.as_str()).unwrap_or("");
    ia.cmp(ib)
}

fn order_with_nulls(a: &Value, b: &Value, direction: SortDirection, nulls: Option<NullsOrder>) -> std::cmp::Ordering {
    let a_null = matches!(a, Value::Null);
    let b_null = matches!(b, Value::Null);
    if a_null != b_null {
        return match nulls {
            Some(NullsOrder::First) => {
                if a_null {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            }
            Some(NullsOrder::Last) => {
                if a_null {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Less
                }
            }
            None => a.compare(b),
        };
    }
    let ord = a.compare(b);
    if direction == SortDirection::Desc {
        ord.reverse()
    } else {
        ord
    }
}

pub struct LimitNode {
    pub alias: String,
    pub limit: i64,
    pub offset: i64,
    pub cursor: Option<String>,
    pub order_by: Vec<OrderByItem>,
    pub stable_by: Vec<OrderByItem>,
}

#[async_trait]
impl PlanNode for LimitNode {
    fn describe(&self) -> String {
        format!("Limit(limit={}, offset={})", self.limit, self.offset)
    }

    async fn execute(&self, ctx: &mut PlanExecutionContext, input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError> {
        check_cancelled(ctx)?;
        ctx.window_total = input.len();

        let mut start = self.offset.max(0) as usize;
        if let Some(cursor_text) = &self.cursor {
            let cursor = Cursor::decode(cursor_text)?;
            if let Some(pos) = input.iter().position(|t| t.get(&self.alias).map(|r| r.id == cursor.id).unwrap_or(false)) {
                start = pos + 1;
            }
        }

        let limit = self.limit.max(0) as usize;
        let end = (start + limit).min(input.len());
        let page: Vec<RowTuple> = if start < input.len() { input[start..end].to_vec() } else { Vec::new() };

        ctx.next_cursor = if end < input.len() {
            page.last().and_then(|tuple| {
                let row = tuple.get(&self.alias)?;
                let mut order = Vec::with_capacity(self.order_by.len() + self.stable_by.len() + 1);
                for item in self.order_by.iter().chain(self.stable_by.iter()) {
                    let eval_ctx = EvalContext { rows: tuple, default_alias: self.alias.clone() };
                    order.push(evaluate(&item.expr, &eval_ctx).unwrap_or(Value::Null));
                }
                order.push(Value::Text(row.id.clone()));
                Some(Cursor { id: row.id.clone(), order }.encode())
            })
        } else {
            None
        };

        ctx.record_stage("Limit", page.len());
        Ok(page)
    }
}

pub struct ProjectNode {
    pub alias: String,
    pub projections: Vec<String>,
}

#[async_trait]
impl PlanNode for ProjectNode {
    fn describe(&self) -> String {
        format!("Project(fields={})", self.projections.len())
    }

    async fn execute(&self, ctx: &mut PlanExecutionContext, input: Vec<RowTuple>) -> Result<Vec<RowTuple>, OpqlError> {
        check_cancelled(ctx)?;
        let wildcard = self.projections.is_empty() || self.projections.iter().any(|p| p == "*" || p.eq_ignore_ascii_case("items"));
        let mut output = input;
        if !wildcard {
            for tuple in &mut output {
                if let Some(row) = tuple.get_mut(&self.alias) {
                    row.values.retain(|field, _| self.projections.iter().any(|p| p.eq_ignore_ascii_case(field)));
                }
            }
        }
        ctx.record_stage("Project", output.len());
        Ok(output)
    }
}

fn root_alias(stmt: &Stmt, options: &PlannerOptions) -> String {
    stmt.alias.clone().unwrap_or_else(|| if options.root_alias.is_empty() { stmt.source.clone() } else { options.root_alias.clone() })
}

fn build_pipeline(stmt: &Stmt, options: &PlannerOptions, config: &Config) -> Vec<Box<dyn PlanNode>> {
    let alias = root_alias(stmt, options);
    let mut nodes: Vec<Box<dyn PlanNode>> = vec![
        Box::new(ScanNode { alias: alias.clone(), source: stmt.source.clone() }),
        Box::new(PermissionsNode { alias: alias.clone() }),
        Box::new(RelateNode { alias: alias.clone(), relations: stmt.relations.clone() }),
        Box::new(JoinNode { joins: stmt.joins.clone() }),
        Box::new(ApplyNode { alias: alias.clone(), where_: stmt.where_.clone() }),
    ];

    if let StmtKind::Aggregate(agg) = &stmt.kind {
        nodes.push(Box::new(AggregateNode { alias: alias.clone(), aggregate: agg.clone() }));
    }

    let stable_by = if !options.stable_order.is_empty() { options.stable_order.clone() } else { stmt.stable_by.clone() };
    nodes.push(Box::new(SortNode { alias: alias.clone(), order_by: stmt.order_by.clone(), stable_by: stable_by.clone() }));

    let limit = config.clamp_limit(stmt.limit);
    nodes.push(Box::new(LimitNode {
        alias: alias.clone(),
        limit,
        offset: stmt.offset.unwrap_or(0),
        cursor: stmt.cursor.clone().or_else(|| options.cursor.clone()),
        order_by: stmt.order_by.clone(),
        stable_by,
    }));

    let projections = match &stmt.kind {
        StmtKind::Find(f) => f.projections.clone(),
        StmtKind::Count(c) => c.projections.clone().unwrap_or_default(),
        _ => Vec::new(),
    };
    nodes.push(Box::new(ProjectNode { alias, projections }));

    nodes
}

/// Describes the plan for `EXPLAIN` without running it.
pub fn explain(stmt: &Stmt, options: &PlannerOptions, config: &Config) -> Vec<String> {
    let target = if let StmtKind::Explain(e) = &stmt.kind { &e.target } else { stmt };
    build_pipeline(target, options, config).iter().map(|n| n.describe()).collect()
}

/// Builds and runs the full pipeline for one statement, spec.md §4.8/§6.
pub async fn plan_and_execute(stmt: &Stmt, options: &PlannerOptions, ctx: &mut PlanExecutionContext) -> Result<QueryResult, OpqlError> {
    if let StmtKind::Explain(_) = &stmt.kind {
        let config = ctx.config.clone();
        return Ok(QueryResult {
            rows: Vec::new(),
            total: 0,
            next_cursor: None,
            metrics: Vec::new(),
            applied_filters: explain(stmt, options, &config),
            projections: Vec::new(),
        });
    }
    if let StmtKind::Update(_) = &stmt.kind {
        // Write paths beyond syntactic UPDATE parsing are out of scope
        // (spec.md §1); planning succeeds with an empty result.
        return Ok(QueryResult { rows: Vec::new(), total: 0, next_cursor: None, metrics: Vec::new(), applied_filters: Vec::new(), projections: Vec::new() });
    }

    let alias = root_alias(stmt, options);
    let config = ctx.config.clone();
    let nodes = build_pipeline(stmt, options, &config);

    let mut rows: Vec<RowTuple> = Vec::new();
    for node in &nodes {
        check_cancelled(ctx)?;
        rows = node.execute(ctx, rows).await?;
    }

    let materialized: Vec<MaterializedRow> = rows.into_iter().filter_map(|mut t| t.remove(&alias)).collect();
    let projections = match &stmt.kind {
        StmtKind::Find(f) => f.projections.clone(),
        StmtKind::Count(c) => c.projections.clone().unwrap_or_default(),
        _ => Vec::new(),
    };

    Ok(QueryResult {
        rows: materialized,
        total: ctx.window_total,
        next_cursor: ctx.next_cursor.take(),
        metrics: std::mem::take(&mut ctx.stages),
        applied_filters: std::mem::take(&mut ctx.applied_filters),
        projections,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::runtime::mock::MockRepository;
    use opql_parser::parse_opql;

    fn ctx() -> PlanExecutionContext {
        PlanExecutionContext::new(Arc::new(MockRepository::six_task_fixture()), Config::default(), Principal::new("u1", "ws1").allowing_all(), "ws1")
    }

    #[tokio::test]
    async fn scans_and_limits_in_descending_score_order() {
        let stmt = parse_opql("FIND * FROM task ORDER BY updated_at DESC LIMIT 2").unwrap();
        let options = PlannerOptions::new("task");
        let mut context = ctx();
        let result = plan_and_execute(&stmt, &options, &mut context).await.unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].id, "task-6");
        assert_eq!(result.rows[1].id, "task-5");
        assert!(result.next_cursor.is_some());
    }

    #[tokio::test]
    async fn cursor_resumes_at_the_next_row() {
        let options = PlannerOptions::new("task");
        let mut context = ctx();
        let first_stmt = parse_opql("FIND * FROM task ORDER BY updated_at DESC LIMIT 2").unwrap();
        let first = plan_and_execute(&first_stmt, &options, &mut context).await.unwrap();
        let cursor = first.next_cursor.unwrap();

        let mut context = ctx();
        let second_stmt = parse_opql(&format!("FIND * FROM task ORDER BY updated_at DESC LIMIT 2 CURSOR '{cursor}'")).unwrap();
        let second = plan_and_execute(&second_stmt, &options, &mut context).await.unwrap();
        assert_eq!(second.rows.len(), 2);
        assert_eq!(second.rows[0].id, "task-4");
        assert_eq!(second.rows[1].id, "task-3");
    }

    #[tokio::test]
    async fn unknown_entity_is_rejected() {
        let stmt = parse_opql("FIND * FROM not_a_real_entity").unwrap();
        let options = PlannerOptions::new("not_a_real_entity");
        let mut context = ctx();
        let err = plan_and_execute(&stmt, &options, &mut context).await.unwrap_err();
        assert!(matches!(err, OpqlError::Plan(PlanError::UnknownEntity { .. })));
    }

    #[tokio::test]
    async fn permission_denied_rows_are_dropped() {
        use crate::runtime::repository::{PermissionRequirement, RepositoryRow};
        let row = RepositoryRow::new("secret-1", "task").with_value("title", Value::Text("Secret".into()));
        let mut row = row;
        row.permissions = PermissionRequirement { required: vec!["admin".to_string()] };
        let repository = MockRepository::new(vec![row]);

        let stmt = parse_opql("FIND * FROM task").unwrap();
        let options = PlannerOptions::new("task");
        let mut context =
            PlanExecutionContext::new(Arc::new(repository), Config::default(), Principal::new("u1", "ws1"), "ws1");
        let result = plan_and_execute(&stmt, &options, &mut context).await.unwrap();
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn aggregate_counts_rows() {
        let stmt = parse_opql("AGGREGATE COUNT(*) AS total FROM task").unwrap();
        let options = PlannerOptions::new("task");
        let mut context = ctx();
        let result = plan_and_execute(&stmt, &options, &mut context).await.unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].values["total"], Value::Int(6));
    }
}
