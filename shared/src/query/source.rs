//! Query source abstraction.
//!
//! A [`QuerySource`] runs one bounded query over one [`Window`] and returns the
//! result tables. Implementations decide how the query travels (HTTP, in-memory);
//! the exporter only sees rows, a partial-result signal and [`QueryError`]s.

use crate::models::{ResultTable, Window};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Default server-side wait budget for one window query.
pub const DEFAULT_QUERY_WAIT: Duration = Duration::from_secs(180);

/// Errors that can occur while running one query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The source rejected the query.
    #[error("query failed with status {status}: {code}: {message}")]
    Api {
        /// HTTP-style status code.
        status: u16,
        /// Source-side error code (e.g. `BadArgumentError`).
        code: String,
        /// Human readable message.
        message: String,
    },

    /// The response could not be decoded.
    #[error("failed to decode query response: {0}")]
    Decode(String),

    /// The caller lacks a usable credential.
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// The query was abandoned because the run was cancelled.
    #[error("query cancelled")]
    Cancelled,
}

impl QueryError {
    /// Returns the source-side error code, if the source reported one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// One bounded query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Query text. For a plain export this is the target name itself.
    pub query: String,

    /// Time range the query is restricted to.
    pub window: Window,

    /// Server-side wait budget.
    pub wait: Duration,
}

impl QueryRequest {
    /// Creates a request with the default wait budget.
    #[must_use]
    pub fn new(query: impl Into<String>, window: Window) -> Self {
        Self {
            query: query.into(),
            window,
            wait: DEFAULT_QUERY_WAIT,
        }
    }

    /// Sets the server-side wait budget.
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }
}

/// Result of one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    /// Result tables, usually exactly one.
    pub tables: Vec<ResultTable>,

    /// Set when the source reports that only part of the query succeeded.
    ///
    /// The rows in `tables` are still valid.
    pub partial_error: Option<String>,
}

impl QueryResponse {
    /// Creates a complete response.
    #[must_use]
    pub fn new(tables: Vec<ResultTable>) -> Self {
        Self {
            tables,
            partial_error: None,
        }
    }

    /// Marks the response as partial.
    #[must_use]
    pub fn with_partial_error(mut self, message: impl Into<String>) -> Self {
        self.partial_error = Some(message.into());
        self
    }

    /// Returns the primary (first) result table.
    #[must_use]
    pub fn primary(&self) -> Option<&ResultTable> {
        self.tables.first()
    }

    /// Returns the total number of rows across all tables.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }
}

/// Trait for query backends.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Runs one query.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the query could not be executed. A partially
    /// successful query is not an error; see [`QueryResponse::partial_error`].
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError>;
}

#[async_trait]
impl<T: QuerySource + ?Sized> QuerySource for std::sync::Arc<T> {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        (**self).query(request).await
    }
}
