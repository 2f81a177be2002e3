//! In-memory query source and catalog.
//!
//! Used by tests and local dry runs. Tables are plain result sets; each window query
//! returns the rows whose time column falls inside the window. Failures, partial
//! results and hangs can be injected per table or per window.

use super::catalog::{CatalogError, TableCatalog};
use super::source::{QueryError, QueryRequest, QueryResponse, QuerySource};
use crate::models::{Cell, Column, ExportTarget, ResultTable, Row};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Column used to filter rows into windows unless overridden.
pub const DEFAULT_TIME_COLUMN: &str = "TimeGenerated";

#[derive(Debug, Clone)]
struct TableData {
    columns: Vec<Column>,
    time_column: String,
    rows: Vec<Row>,
}

#[derive(Debug, Clone)]
enum Injected {
    Fail { code: String, message: String },
    Partial(String),
    Hang,
}

/// In-memory [`QuerySource`].
///
/// The query text selects the table: everything before the first `|` is the table
/// name, so `KubeEvents | limit 0` reads `KubeEvents`. A trailing `| limit 0`
/// returns the columns without rows.
///
/// # Example
///
/// ```
/// use shared::models::{Cell, Column, Window};
/// use shared::query::{InMemoryQuerySource, QueryRequest, QuerySource};
/// use chrono::{TimeZone, Utc};
///
/// let source = InMemoryQuerySource::new().with_table(
///     "Heartbeat",
///     vec![Column::new("TimeGenerated", "datetime"), Column::new("Computer", "string")],
///     vec![vec![Cell::from("2024-01-01T00:05:00Z"), Cell::from("node-1")]],
/// );
///
/// let window = Window::new(
///     Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
///     Utc.with_ymd_and_hms(2024, 1, 1, 0, 15, 0).unwrap(),
/// );
/// let response = tokio_test::block_on(source.query(&QueryRequest::new("Heartbeat", window))).unwrap();
/// assert_eq!(response.row_count(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryQuerySource {
    tables: HashMap<String, TableData>,
    table_faults: HashMap<String, Injected>,
    window_faults: HashMap<(String, DateTime<Utc>), Injected>,
    scripted: HashMap<String, Result<QueryResponse, (u16, String, String)>>,
    requests: Arc<Mutex<Vec<QueryRequest>>>,
}

impl InMemoryQuerySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table filtered by its `TimeGenerated` column.
    #[must_use]
    pub fn with_table(self, name: impl Into<String>, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        self.with_table_on(name, DEFAULT_TIME_COLUMN, columns, rows)
    }

    /// Adds a table filtered by the named time column.
    ///
    /// Rows whose time cell does not parse as RFC 3339 land in no window.
    #[must_use]
    pub fn with_table_on(
        mut self,
        name: impl Into<String>,
        time_column: impl Into<String>,
        columns: Vec<Column>,
        rows: Vec<Row>,
    ) -> Self {
        self.tables.insert(
            name.into(),
            TableData {
                columns,
                time_column: time_column.into(),
                rows,
            },
        );
        self
    }

    /// Makes every query against `table` fail.
    #[must_use]
    pub fn with_failing_table(mut self, table: impl Into<String>, message: impl Into<String>) -> Self {
        self.table_faults.insert(
            table.into(),
            Injected::Fail {
                code: "InternalServerError".to_string(),
                message: message.into(),
            },
        );
        self
    }

    /// Makes every query against `table` wait forever.
    #[must_use]
    pub fn with_hanging_table(mut self, table: impl Into<String>) -> Self {
        self.table_faults.insert(table.into(), Injected::Hang);
        self
    }

    /// Makes the query for the window of `table` starting at `start` fail.
    #[must_use]
    pub fn with_failing_window(
        mut self,
        table: impl Into<String>,
        start: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        self.window_faults.insert(
            (table.into(), start),
            Injected::Fail {
                code: "GatewayTimeout".to_string(),
                message: message.into(),
            },
        );
        self
    }

    /// Marks the window of `table` starting at `start` as partially failed.
    #[must_use]
    pub fn with_partial_window(
        mut self,
        table: impl Into<String>,
        start: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        self.window_faults
            .insert((table.into(), start), Injected::Partial(message.into()));
        self
    }

    /// Returns a fixed response for an exact query text, regardless of window.
    #[must_use]
    pub fn with_response(mut self, query: impl Into<String>, response: QueryResponse) -> Self {
        self.scripted.insert(query.into(), Ok(response));
        self
    }

    /// Returns a fixed error for an exact query text, regardless of window.
    #[must_use]
    pub fn with_query_error(
        mut self,
        query: impl Into<String>,
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.scripted
            .insert(query.into(), Err((status, code.into(), message.into())));
        self
    }

    /// Returns every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn record(&self, request: &QueryRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
    }

    fn select(data: &TableData, request: &QueryRequest, limit_zero: bool) -> ResultTable {
        let mut table = ResultTable::new(data.columns.clone());
        if limit_zero {
            return table;
        }
        let Some(time_pos) = data.columns.iter().position(|c| c.name == data.time_column) else {
            return table;
        };
        table.rows = data
            .rows
            .iter()
            .filter(|row| {
                row.get(time_pos)
                    .and_then(cell_instant)
                    .is_some_and(|t| request.window.contains(t))
            })
            .cloned()
            .collect();
        table
    }
}

fn cell_instant(cell: &Cell) -> Option<DateTime<Utc>> {
    match cell {
        Cell::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

fn injected_error(code: &str, message: &str) -> QueryError {
    QueryError::Api {
        status: 500,
        code: code.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl QuerySource for InMemoryQuerySource {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        self.record(request);

        if let Some(scripted) = self.scripted.get(&request.query) {
            return scripted
                .clone()
                .map_err(|(status, code, message)| QueryError::Api {
                    status,
                    code,
                    message,
                });
        }

        let mut parts = request.query.split('|');
        let name = parts.next().unwrap_or_default().trim().to_string();
        let limit_zero = parts.any(|p| p.split_whitespace().eq(["limit", "0"]));

        let mut partial = None;
        let faults = [
            self.table_faults.get(&name),
            self.window_faults.get(&(name.clone(), request.window.start)),
        ];
        for fault in faults.into_iter().flatten() {
            match fault {
                Injected::Fail { code, message } => return Err(injected_error(code, message)),
                Injected::Hang => std::future::pending::<()>().await,
                Injected::Partial(message) => partial = Some(message.clone()),
            }
        }

        let Some(data) = self.tables.get(&name) else {
            return Err(QueryError::Api {
                status: 400,
                code: "SemanticError".to_string(),
                message: format!("Failed to resolve table or column expression named '{name}'"),
            });
        };

        Ok(QueryResponse {
            tables: vec![Self::select(data, request, limit_zero)],
            partial_error: partial,
        })
    }
}

/// In-memory [`TableCatalog`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    tables: Vec<ExportTarget>,
    schemas: HashMap<ExportTarget, serde_json::Value>,
    listing_error: Option<String>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table without a schema.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<ExportTarget>) -> Self {
        self.tables.push(table.into());
        self
    }

    /// Adds a table with a schema document.
    #[must_use]
    pub fn with_schema(mut self, table: impl Into<ExportTarget>, schema: serde_json::Value) -> Self {
        let table = table.into();
        if !self.tables.contains(&table) {
            self.tables.push(table.clone());
        }
        self.schemas.insert(table, schema);
        self
    }

    /// Makes [`TableCatalog::list_tables`] fail.
    #[must_use]
    pub fn with_listing_error(mut self, message: impl Into<String>) -> Self {
        self.listing_error = Some(message.into());
        self
    }
}

#[async_trait]
impl TableCatalog for InMemoryCatalog {
    async fn list_tables(&self) -> Result<Vec<ExportTarget>, CatalogError> {
        match &self.listing_error {
            Some(message) => Err(CatalogError::Api {
                status: 403,
                message: message.clone(),
            }),
            None => Ok(self.tables.clone()),
        }
    }

    async fn table_schema(&self, table: &ExportTarget) -> Result<serde_json::Value, CatalogError> {
        self.schemas
            .get(table)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(table.to_string()))
    }
}
