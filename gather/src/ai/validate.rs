//! Generated query validation.
//!
//! Client-side checks reject replies that are obviously not a query. Server-side
//! validation runs the query with `| limit 0` over the last minute and classifies
//! the rejection.

use chrono::{DateTime, TimeDelta, Utc};
use shared::models::Window;
use shared::query::{QueryError, QueryRequest, QuerySource};
use std::time::Duration;
use thiserror::Error;

/// Wait budget for a validation query.
pub const VALIDATION_WAIT: Duration = Duration::from_secs(30);

/// Tables a generated query may start with.
const QUERY_TABLES: &[&str] = &[
    "KubePodInventory",
    "KubeNodeInventory",
    "KubeEvents",
    "ContainerLogV2",
    "ContainerLog",
    "InsightsMetrics",
    "Perf",
    "Heartbeat",
    "KubeServices",
    "ContainerInventory",
    "AKSControlPlane",
    "AKSAudit",
    "Syslog",
];

/// Statements a generated query may start with.
const QUERY_STATEMENTS: &[&str] = &["let ", "with ", "union", "print", "datatable"];

/// Reasons a generated query is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryValidationError {
    /// The query is blank.
    #[error("query is empty")]
    Empty,

    /// The reply still contains JSON.
    #[error("query contains JSON formatting (should be plain KQL)")]
    JsonFormatting,

    /// The reply is SQL.
    #[error("query uses SQL syntax instead of KQL")]
    SqlSyntax,

    /// Only comments were left.
    #[error("no valid KQL found after removing comments")]
    OnlyComments,

    /// The first line is neither a known table nor a statement.
    #[error("query doesn't start with a recognized table name or KQL command")]
    UnknownStart,

    /// The server reported a syntax error.
    #[error("KQL syntax error: {0}")]
    Syntax(String),

    /// The server could not resolve a table or column.
    #[error("KQL semantic error (invalid table/column names): {0}")]
    Semantic(String),

    /// Any other server rejection.
    #[error("KQL validation error: {0}")]
    Server(String),

    /// Every attempt failed.
    #[error("failed to validate KQL after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: usize,
        /// The last rejection.
        last: Box<QueryValidationError>,
    },
}

/// Runs the client-side checks.
///
/// # Errors
///
/// Returns the first check that fails.
///
/// # Example
///
/// ```
/// use gather::ai::validate::{basic_validation, QueryValidationError};
///
/// assert!(basic_validation("// recent events\nKubeEvents | take 10").is_ok());
/// assert_eq!(
///     basic_validation("SELECT * FROM KubeEvents"),
///     Err(QueryValidationError::SqlSyntax)
/// );
/// ```
pub fn basic_validation(query: &str) -> Result<(), QueryValidationError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QueryValidationError::Empty);
    }
    if query.contains(['{', '}']) {
        return Err(QueryValidationError::JsonFormatting);
    }
    if query.to_uppercase().contains("SELECT ") {
        return Err(QueryValidationError::SqlSyntax);
    }

    let first = query
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("//"))
        .ok_or(QueryValidationError::OnlyComments)?;

    let known = QUERY_TABLES
        .iter()
        .chain(QUERY_STATEMENTS)
        .any(|prefix| first.starts_with(prefix));
    if known {
        Ok(())
    } else {
        Err(QueryValidationError::UnknownStart)
    }
}

/// Returns the query with `| limit 0` appended unless it already ends with it.
#[must_use]
pub fn validation_query(query: &str) -> String {
    let query = query.trim();
    if query.to_lowercase().ends_with("| limit 0") {
        query.to_string()
    } else {
        format!("{query} | limit 0")
    }
}

/// Maps a server rejection onto a validation error.
///
/// Returns `None` for partial errors, which are accepted.
#[must_use]
pub fn classify_server_error(err: &QueryError) -> Option<QueryValidationError> {
    let text = err.to_string();
    if text.contains("SyntaxError") {
        Some(QueryValidationError::Syntax(text))
    } else if text.contains("SemanticError") {
        Some(QueryValidationError::Semantic(text))
    } else if text.contains("PartialError") {
        None
    } else {
        Some(QueryValidationError::Server(text))
    }
}

/// Validates the query against the server over the minute before `now`.
///
/// # Errors
///
/// Returns the classified rejection.
pub async fn validate_on_server(
    source: &dyn QuerySource,
    query: &str,
    now: DateTime<Utc>,
) -> Result<(), QueryValidationError> {
    let window = Window::new(now - TimeDelta::minutes(1), now);
    let request = QueryRequest::new(validation_query(query), window).with_wait(VALIDATION_WAIT);
    match source.query(&request).await {
        Ok(response) => {
            if let Some(partial) = response.partial_error {
                tracing::warn!(error = %partial, "KQL validation warning (partial error)");
            }
            Ok(())
        }
        Err(err) => match classify_server_error(&err) {
            Some(rejection) => Err(rejection),
            None => {
                tracing::warn!(error = %err, "KQL validation warning (partial error)");
                Ok(())
            }
        },
    }
}
