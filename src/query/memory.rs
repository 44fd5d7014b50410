//! In-process backend. Rows are JSON objects; filters, relations, ordering and
//! windows are evaluated the same way the SQL backend compiles them. Used by
//! the integration tests and when no `DATABASE_URL` is configured.

use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::query::{
    adapter::{Backend, BackendError, Row, Rows},
    descriptor::{Link, QueryDescriptor, Relation, SOFT_DELETE_COLUMN},
    filter::{Filter, FilterOp, FilterValue, Scalar},
};

pub type RpcFn = Arc<dyn Fn(&mut MemoryTables, Value) -> Result<Value, BackendError> + Send + Sync>;

/// Keeps `parent.<column>` equal to the number of child rows pointing at it,
/// like a counter trigger would.
#[derive(Debug, Clone)]
pub struct CounterRule {
    pub child_table: String,
    pub foreign_key: String,
    pub parent_table: String,
    pub column: String,
    /// Only children with `deleted_at` unset are counted.
    pub live_only: bool,
}

#[derive(Default)]
pub struct MemoryTables {
    tables: HashMap<String, Vec<Row>>,
    next_ids: HashMap<String, i64>,
    defaults: HashMap<String, Row>,
    unique_keys: HashMap<String, Vec<Vec<String>>>,
    counters: Vec<CounterRule>,
}

#[derive(Default)]
struct Probe {
    calls: Vec<String>,
    failures: HashMap<String, String>,
    latency: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<MemoryTables>>,
    rpcs: Arc<Mutex<HashMap<String, RpcFn>>>,
    probe: Arc<Mutex<Probe>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column values applied to inserted rows that omit them.
    pub fn set_defaults(&self, table: &str, defaults: Value) {
        if let Value::Object(row) = defaults {
            self.lock_tables().defaults.insert(table.to_string(), row);
        }
    }

    pub fn add_unique_key(&self, table: &str, columns: &[&str]) {
        self.lock_tables()
            .unique_keys
            .entry(table.to_string())
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
    }

    pub fn add_counter(&self, rule: CounterRule) {
        self.lock_tables().counters.push(rule);
    }

    pub fn register_rpc<F>(&self, name: &str, f: F)
    where
        F: Fn(&mut MemoryTables, Value) -> Result<Value, BackendError> + Send + Sync + 'static,
    {
        self.rpcs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(f));
    }

    /// Inserts rows as-is through the normal insert path (defaults, counters).
    pub fn seed(&self, table: &str, rows: Vec<Value>) -> Vec<Row> {
        let mut tables = self.lock_tables();
        rows.into_iter()
            .filter_map(|v| match v {
                Value::Object(row) => tables.insert(table, row).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock_tables()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call made so far, as `op:target`.
    pub fn calls(&self) -> Vec<String> {
        self.lock_probe().calls.clone()
    }

    pub fn calls_to(&self, target: &str) -> usize {
        let suffix = format!(":{}", target);
        self.lock_probe()
            .calls
            .iter()
            .filter(|c| c.ends_with(&suffix))
            .count()
    }

    pub fn reset_calls(&self) {
        self.lock_probe().calls.clear();
    }

    /// Every later call touching `target` (table or RPC name) fails.
    pub fn fail_table(&self, target: &str, message: &str) {
        self.lock_probe()
            .failures
            .insert(target.to_string(), message.to_string());
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock_probe().latency = Some(latency);
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, MemoryTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_probe(&self) -> std::sync::MutexGuard<'_, Probe> {
        self.probe.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call, waits out the configured latency, then reports an
    /// injected failure if one is set.
    async fn enter(&self, op: &str, target: &str) -> Result<(), BackendError> {
        let (latency, failure) = {
            let mut probe = self.lock_probe();
            probe.calls.push(format!("{}:{}", op, target));
            (probe.latency, probe.failures.get(target).cloned())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(msg) => Err(anyhow!(msg).into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, query: &QueryDescriptor) -> Result<Rows, BackendError> {
        self.enter("select", &query.table).await?;
        Ok(self.lock_tables().select(query))
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, BackendError> {
        self.enter("insert", table).await?;
        let mut tables = self.lock_tables();
        // All or nothing: validate the whole batch against a scratch copy.
        let mut scratch = tables.snapshot();
        let inserted = rows
            .into_iter()
            .map(|row| scratch.insert(table, row))
            .collect::<Result<Vec<_>, _>>()?;
        *tables = scratch;
        Ok(inserted)
    }

    async fn update(
        &self,
        table: &str,
        patch: Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, BackendError> {
        self.enter("update", table).await?;
        self.lock_tables().update(table, &patch, filters)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, BackendError> {
        self.enter("delete", table).await?;
        Ok(self.lock_tables().delete(table, filters))
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError> {
        self.enter("rpc", function).await?;
        let f = self
            .rpcs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(function)
            .cloned()
            .ok_or_else(|| anyhow!("function {} does not exist", function))?;
        let mut tables = self.lock_tables();
        let mut scratch = tables.snapshot();
        let result = f(&mut scratch, args)?;
        *tables = scratch;
        Ok(result)
    }
}

impl MemoryTables {
    fn snapshot(&self) -> MemoryTables {
        MemoryTables {
            tables: self.tables.clone(),
            next_ids: self.next_ids.clone(),
            defaults: self.defaults.clone(),
            unique_keys: self.unique_keys.clone(),
            counters: self.counters.clone(),
        }
    }

    pub fn select(&self, query: &QueryDescriptor) -> Rows {
        let mut rows: Vec<Row> = self
            .table(&query.table)
            .iter()
            .filter(|row| {
                query.filters.iter().all(|f| matches(row, f))
                    && !query.exclude_filters.iter().any(|f| matches(row, f))
                    && (query.or_filters.is_empty() || query.or_filters.iter().any(|f| matches(row, f)))
                    && self.inner_relations_hold(row, &query.relations)
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            query
                .order_by
                .iter()
                .map(|o| {
                    let ord = compare_values(
                        a.get(&o.column).unwrap_or(&Value::Null),
                        b.get(&o.column).unwrap_or(&Value::Null),
                    );
                    if o.descending { ord.reverse() } else { ord }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let count = query.want_count.then_some(rows.len() as i64);
        if query.head_only {
            return Rows {
                rows: Vec::new(),
                count,
            };
        }

        let offset = query.window.offset() as usize;
        let take = query.window.size().map(|n| n as usize).unwrap_or(usize::MAX);
        let rows = rows
            .into_iter()
            .skip(offset)
            .take(take)
            .map(|row| self.project(row, &query.columns, &query.relations))
            .collect();

        Rows { rows, count }
    }

    /// Rows of `table` matching every filter.
    pub fn find(&self, table: &str, filters: &[Filter]) -> Vec<Row> {
        self.table(table)
            .iter()
            .filter(|row| filters.iter().all(|f| matches(row, f)))
            .cloned()
            .collect()
    }

    pub fn insert(&mut self, table: &str, mut row: Row) -> Result<Row, BackendError> {
        if let Some(defaults) = self.defaults.get(table) {
            for (k, v) in defaults {
                row.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        let next = self.next_ids.entry(table.to_string()).or_insert(1);
        match row.get("id").and_then(Value::as_i64) {
            Some(id) => *next = (*next).max(id + 1),
            None => {
                row.insert("id".into(), Value::from(*next));
                *next += 1;
            }
        }
        row.entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        self.check_unique(table, &row)?;
        self.apply_counters(table, None, Some(&row));
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    pub fn update(
        &mut self,
        table: &str,
        patch: &Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, BackendError> {
        let mut changes = Vec::new();
        if let Some(rows) = self.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| filters.iter().all(|f| matches(row, f))) {
                let before = row.clone();
                for (k, v) in patch {
                    row.insert(k.clone(), v.clone());
                }
                changes.push((before, row.clone()));
            }
        }
        for (before, after) in &changes {
            self.apply_counters(table, Some(before), Some(after));
        }
        Ok(changes.into_iter().map(|(_, after)| after).collect())
    }

    pub fn delete(&mut self, table: &str, filters: &[Filter]) -> Vec<Row> {
        let mut removed = Vec::new();
        if let Some(rows) = self.tables.get_mut(table) {
            rows.retain(|row| {
                let hit = filters.iter().all(|f| matches(row, f));
                if hit {
                    removed.push(row.clone());
                }
                !hit
            });
        }
        for row in &removed {
            self.apply_counters(table, Some(row), None);
        }
        removed
    }

    fn table(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn check_unique(&self, table: &str, row: &Row) -> Result<(), BackendError> {
        let Some(keys) = self.unique_keys.get(table) else {
            return Ok(());
        };
        for key in keys {
            let clash = self.table(table).iter().any(|existing| {
                key.iter().all(|col| match (existing.get(col), row.get(col)) {
                    (Some(a), Some(b)) if !a.is_null() => {
                        compare_values(a, b) == Ordering::Equal
                    }
                    _ => false,
                })
            });
            if clash {
                return Err(BackendError::UniqueViolation(format!(
                    "duplicate key value violates unique constraint on {}({})",
                    table,
                    key.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn apply_counters(&mut self, table: &str, before: Option<&Row>, after: Option<&Row>) {
        let counted = |rule: &CounterRule, row: Option<&Row>| -> Option<Value> {
            let row = row?;
            if rule.live_only && !row.get(SOFT_DELETE_COLUMN).is_none_or(Value::is_null) {
                return None;
            }
            row.get(&rule.foreign_key).cloned()
        };
        let rules: Vec<CounterRule> = self
            .counters
            .iter()
            .filter(|r| r.child_table == table)
            .cloned()
            .collect();
        for rule in rules {
            let old = counted(&rule, before);
            let new = counted(&rule, after);
            if old == new {
                continue;
            }
            if let Some(parent) = old {
                self.bump(&rule, &parent, -1);
            }
            if let Some(parent) = new {
                self.bump(&rule, &parent, 1);
            }
        }
    }

    fn bump(&mut self, rule: &CounterRule, parent_id: &Value, delta: i64) {
        let Some(rows) = self.tables.get_mut(&rule.parent_table) else {
            return;
        };
        for row in rows.iter_mut() {
            if row.get("id").is_some_and(|id| compare_values(id, parent_id) == Ordering::Equal) {
                let current = row.get(&rule.column).and_then(Value::as_i64).unwrap_or(0);
                row.insert(rule.column.clone(), Value::from((current + delta).max(0)));
            }
        }
    }

    fn related(&self, parent: &Row, relation: &Relation) -> Vec<&Row> {
        self.table(&relation.table)
            .iter()
            .filter(|candidate| {
                let linked = match &relation.link {
                    Link::BelongsTo { local_key } => values_equal(candidate.get("id"), parent.get(local_key)),
                    Link::HasMany { foreign_key } => values_equal(candidate.get(foreign_key), parent.get("id")),
                };
                linked
                    && relation.filters.iter().all(|f| matches(candidate, f))
                    && self.inner_relations_hold(candidate, &relation.relations)
            })
            .collect()
    }

    fn inner_relations_hold(&self, row: &Row, relations: &[Relation]) -> bool {
        relations
            .iter()
            .filter(|r| r.inner)
            .all(|r| !self.related(row, r).is_empty())
    }

    fn project(&self, row: Row, columns: &[String], relations: &[Relation]) -> Row {
        let mut out = if columns.is_empty() {
            row.clone()
        } else {
            columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect()
        };
        for relation in relations.iter().filter(|r| r.embed) {
            let related = self.related(&row, relation);
            let mut projected = related
                .into_iter()
                .map(|r| Value::Object(self.project(r.clone(), &relation.columns, &relation.relations)));
            let value = match relation.link {
                Link::BelongsTo { .. } => projected.next().unwrap_or(Value::Null),
                Link::HasMany { .. } => Value::Array(projected.collect()),
            };
            out.insert(relation.alias.clone(), value);
        }
        out
    }
}

fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_null() && !b.is_null() => compare_values(a, b) == Ordering::Equal,
        _ => false,
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// Total order used for sorting. Nulls sort last ascending, as in Postgres.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => match (parse_time(x), parse_time(y)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x.cmp(y),
        },
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// SQL comparison: anything against null is unknown.
fn compare_scalar(value: &Value, scalar: &Scalar) -> Option<Ordering> {
    match (value, scalar) {
        (Value::Null, _) | (_, Scalar::Null) => None,
        (Value::String(s), Scalar::Timestamp(t)) => parse_time(s).map(|v| v.cmp(t)),
        _ => Some(compare_values(value, &scalar.to_json())),
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let value = row.get(&filter.column).unwrap_or(&Value::Null);
    let one = match &filter.value {
        FilterValue::One(s) => s,
        FilterValue::Many(list) => {
            return filter.op == FilterOp::In
                && list
                    .iter()
                    .any(|s| compare_scalar(value, s) == Some(Ordering::Equal));
        }
    };
    match filter.op {
        FilterOp::Is => match one {
            Scalar::Null => value.is_null(),
            Scalar::Bool(b) => value.as_bool() == Some(*b),
            _ => false,
        },
        FilterOp::Eq => compare_scalar(value, one) == Some(Ordering::Equal),
        FilterOp::Neq => compare_scalar(value, one).is_some_and(|o| o != Ordering::Equal),
        FilterOp::Gt => compare_scalar(value, one) == Some(Ordering::Greater),
        FilterOp::Gte => compare_scalar(value, one).is_some_and(|o| o != Ordering::Less),
        FilterOp::Lt => compare_scalar(value, one) == Some(Ordering::Less),
        FilterOp::Lte => compare_scalar(value, one).is_some_and(|o| o != Ordering::Greater),
        FilterOp::Like | FilterOp::Ilike => match (value.as_str(), one) {
            (Some(text), Scalar::Text(pattern)) => {
                like_match(text, pattern, filter.op == FilterOp::Ilike)
            }
            _ => false,
        },
        FilterOp::In => false,
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Literal(char),
    One,
    Many,
}

/// LIKE semantics with `\` as the escape character.
fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let fold = |c: char| {
        if case_insensitive {
            c.to_lowercase().next().unwrap_or(c)
        } else {
            c
        }
    };
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => Token::Literal(fold(chars.next().unwrap_or('\\'))),
            '%' => Token::Many,
            '_' => Token::One,
            c => Token::Literal(fold(c)),
        });
    }
    let text: Vec<char> = text.chars().map(fold).collect();

    // dp[j]: tokens[..i] match text[..j]
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::Many => {
                let mut reachable = false;
                for j in 0..=text.len() {
                    reachable |= dp[j];
                    next[j] = reachable;
                }
            }
            Token::One => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1];
                }
            }
            Token::Literal(c) => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1] && text[j - 1] == *c;
                }
            }
        }
        dp = next;
    }
    dp[text.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::escape_like;

    #[test]
    fn like_honours_wildcards_and_escapes() {
        assert!(like_match("hello world", "%world", false));
        assert!(like_match("hello", "h_llo", false));
        assert!(!like_match("Hello", "hello", false));
        assert!(like_match("Hello", "hello", true));
        assert!(like_match("50%off today", &format!("%{}%", escape_like("50%off")), false));
        assert!(!like_match("500 off", &format!("%{}%", escape_like("50%off")), false));
        assert!(!like_match("snakeXcase", &escape_like("snake_case"), false));
    }

    #[test]
    fn nulls_sort_last() {
        let mut v = vec![Value::Null, Value::from(2), Value::from(1)];
        v.sort_by(compare_values);
        assert_eq!(v, vec![Value::from(1), Value::from(2), Value::Null]);
    }

    #[test]
    fn timestamps_compare_chronologically() {
        let earlier = Value::from("2024-01-01T00:00:00.500Z");
        let later = Value::from("2024-01-01T00:00:01Z");
        assert_eq!(compare_values(&earlier, &later), Ordering::Less);
    }
}
