use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::query::{
    descriptor::{QueryDescriptor, Window},
    filter::Filter,
    result::{QueryError, QueryResult},
};

/// One row as it crosses the backend boundary.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Default)]
pub struct Rows {
    pub rows: Vec<Row>,
    /// Total matches ignoring the window, when the descriptor asked for it.
    pub count: Option<i64>,
}

/// What a backend may report. Anything backend-specific is carried as an
/// opaque `anyhow::Error` and only its message survives the adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A storage engine able to execute descriptors. Each call is one round trip.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, query: &QueryDescriptor) -> Result<Rows, BackendError>;

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, BackendError>;

    async fn update(
        &self,
        table: &str,
        patch: Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, BackendError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, BackendError>;

    /// Runs a named stored procedure taking and returning JSON.
    async fn rpc(&self, function: &str, args: Value) -> Result<Value, BackendError>;
}

/// Entry point for every read and write. Cheap to clone; construct one per
/// process and hand it to the repositories.
#[derive(Clone)]
pub struct QueryAdapter {
    backend: Arc<dyn Backend>,
}

impl QueryAdapter {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// List mode. No match is `Ok(vec![])`.
    pub async fn many<T: DeserializeOwned>(&self, query: &QueryDescriptor) -> QueryResult<Vec<T>> {
        match self.select(query).await {
            Ok(rows) => QueryResult::from(decode_rows(rows.rows)).with_count(rows.count),
            Err(e) => QueryResult::failed(e),
        }
    }

    /// Exactly one row, otherwise `NotFound` / `TooManyRows`.
    pub async fn single<T: DeserializeOwned>(&self, query: &QueryDescriptor) -> QueryResult<T> {
        match self.at_most_one(query).await {
            Ok(Some(row)) => decode_row(row).into(),
            Ok(None) => {
                tracing::debug!(table = %query.table, "single() matched no rows");
                QueryResult::failed(QueryError::NotFound)
            }
            Err(e) => QueryResult::failed(e),
        }
    }

    /// Zero or one row; zero is success with no data.
    pub async fn maybe_single<T: DeserializeOwned>(
        &self,
        query: &QueryDescriptor,
    ) -> QueryResult<T> {
        match self.at_most_one(query).await {
            Ok(Some(row)) => decode_row(row).into(),
            Ok(None) => QueryResult::empty(),
            Err(e) => QueryResult::failed(e),
        }
    }

    /// Head-only count of the rows the descriptor matches.
    pub async fn count(&self, query: &QueryDescriptor) -> QueryResult<i64> {
        let head = query.clone().head();
        match self.select(&head).await {
            Ok(rows) => {
                let n = rows.count.unwrap_or(rows.rows.len() as i64);
                QueryResult::ok(n).with_count(Some(n))
            }
            Err(e) => QueryResult::failed(e),
        }
    }

    pub async fn insert<T: DeserializeOwned>(&self, table: &str, rows: Vec<Row>) -> QueryResult<Vec<T>> {
        match self.backend.insert(table, rows).await {
            Ok(rows) => decode_rows(rows).into(),
            Err(e) => QueryResult::failed(normalize(table, e)),
        }
    }

    pub async fn insert_one<T: DeserializeOwned>(&self, table: &str, row: Row) -> QueryResult<T> {
        match self.backend.insert(table, vec![row]).await {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => decode_row(row).into(),
                None => QueryResult::failed(QueryError::NotFound),
            },
            Err(e) => QueryResult::failed(normalize(table, e)),
        }
    }

    /// Patches every row matching `filters` and returns the new versions.
    pub async fn update<T: DeserializeOwned>(
        &self,
        table: &str,
        patch: Row,
        filters: &[Filter],
    ) -> QueryResult<Vec<T>> {
        if let Err(e) = validate_write_filters(filters) {
            return QueryResult::failed(e);
        }
        match self.backend.update(table, patch, filters).await {
            Ok(rows) => decode_rows(rows).into(),
            Err(e) => QueryResult::failed(normalize(table, e)),
        }
    }

    /// Physically removes rows. Only interaction rows are ever removed this
    /// way; entities are soft-deleted through `update`.
    pub async fn remove(&self, table: &str, filters: &[Filter]) -> QueryResult<u64> {
        if let Err(e) = validate_write_filters(filters) {
            return QueryResult::failed(e);
        }
        match self.backend.delete(table, filters).await {
            Ok(rows) => QueryResult::ok(rows.len() as u64),
            Err(e) => QueryResult::failed(normalize(table, e)),
        }
    }

    pub async fn rpc<T: DeserializeOwned>(&self, function: &str, args: Value) -> QueryResult<T> {
        match self.backend.rpc(function, args).await {
            Ok(value) => serde_json::from_value(value)
                .map_err(|e| QueryError::Decode(e.to_string()))
                .into(),
            Err(e) => QueryResult::failed(normalize(function, e)),
        }
    }

    async fn select(&self, query: &QueryDescriptor) -> Result<Rows, QueryError> {
        for filter in query.all_filters() {
            filter.validate()?;
        }
        self.backend
            .select(query)
            .await
            .map_err(|e| normalize(&query.table, e))
    }

    async fn at_most_one(&self, query: &QueryDescriptor) -> Result<Option<Row>, QueryError> {
        let query = if query.window == Window::All {
            query.clone().limit(2)
        } else {
            query.clone()
        };
        let mut rows = self.select(&query).await?.rows;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(QueryError::TooManyRows(n)),
        }
    }
}

fn validate_write_filters(filters: &[Filter]) -> Result<(), QueryError> {
    if filters.is_empty() {
        return Err(QueryError::InvalidFilter {
            column: "*".to_string(),
            reason: "writes must be filtered".to_string(),
        });
    }
    filters.iter().try_for_each(Filter::validate)
}

fn normalize(target: &str, err: BackendError) -> QueryError {
    match err {
        BackendError::UniqueViolation(msg) => {
            tracing::debug!(target_table = %target, "unique violation: {}", msg);
            QueryError::Conflict(msg)
        }
        BackendError::Other(e) => {
            tracing::error!(target_table = %target, "backend call failed: {:?}", e);
            QueryError::Backend(e.to_string())
        }
    }
}

fn decode_row<T: DeserializeOwned>(row: Row) -> Result<T, QueryError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| QueryError::Decode(e.to_string()))
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, QueryError> {
    rows.into_iter().map(decode_row).collect()
}
