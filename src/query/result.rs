use serde::Serialize;
use thiserror::Error;

/// The one error type that leaves the query layer. Backend-native errors are
/// flattened into `Backend`/`Conflict` messages before they get here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("no rows returned where exactly one was expected")]
    NotFound,

    #[error("{0} rows returned where at most one was expected")]
    TooManyRows(usize),

    #[error("invalid filter on `{column}`: {reason}")]
    InvalidFilter { column: String, reason: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("failed to decode row: {0}")]
    Decode(String),
}

impl QueryError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// `{ data, count, error }`. An error never travels with data.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult<T> {
    data: Option<T>,
    count: Option<i64>,
    #[serde(serialize_with = "serialize_error")]
    error: Option<QueryError>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<QueryError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.message()),
        None => serializer.serialize_none(),
    }
}

impl<T> QueryResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            count: None,
            error: None,
        }
    }

    /// Success with no row (`maybe_single` on an empty match).
    pub fn empty() -> Self {
        Self {
            data: None,
            count: None,
            error: None,
        }
    }

    pub fn failed(error: QueryError) -> Self {
        Self {
            data: None,
            count: None,
            error: Some(error),
        }
    }

    pub fn with_count(mut self, count: Option<i64>) -> Self {
        if self.error.is_none() {
            self.count = count;
        }
        self
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn count(&self) -> Option<i64> {
        self.count
    }

    pub fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
        QueryResult {
            data: self.data.map(f),
            count: self.count,
            error: self.error,
        }
    }

    /// `Ok(None)` only for an empty `maybe_single`.
    pub fn into_result(self) -> Result<Option<T>, QueryError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.data),
        }
    }

    /// Like `into_result`, with a missing row reported as `NotFound`.
    pub fn require(self) -> Result<T, QueryError> {
        self.into_result()?.ok_or(QueryError::NotFound)
    }
}

impl<T> From<Result<T, QueryError>> for QueryResult<T> {
    fn from(result: Result<T, QueryError>) -> Self {
        match result {
            Ok(data) => QueryResult::ok(data),
            Err(e) => QueryResult::failed(e),
        }
    }
}
