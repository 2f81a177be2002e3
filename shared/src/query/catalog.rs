//! Table catalog abstraction.
//!
//! The catalog answers two questions about the remote store: which tables exist
//! (used when exporting everything) and what a table's schema document looks like.

use crate::models::ExportTarget;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The catalog rejected the request.
    #[error("catalog request failed with status {status}: {message}")]
    Api {
        /// HTTP-style status code.
        status: u16,
        /// Human readable message.
        message: String,
    },

    /// The table does not exist.
    #[error("table not found: {0}")]
    NotFound(String),

    /// The response could not be decoded.
    #[error("failed to decode catalog response: {0}")]
    Decode(String),

    /// The caller lacks a usable credential.
    #[error("authentication failed: {0}")]
    Unauthorized(String),
}

/// Trait for table catalogs.
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// Lists every table known to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    async fn list_tables(&self) -> Result<Vec<ExportTarget>, CatalogError>;

    /// Fetches the schema document of one table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is unknown or the lookup fails.
    async fn table_schema(&self, table: &ExportTarget) -> Result<serde_json::Value, CatalogError>;
}

#[async_trait]
impl<T: TableCatalog + ?Sized> TableCatalog for std::sync::Arc<T> {
    async fn list_tables(&self) -> Result<Vec<ExportTarget>, CatalogError> {
        (**self).list_tables().await
    }

    async fn table_schema(&self, table: &ExportTarget) -> Result<serde_json::Value, CatalogError> {
        (**self).table_schema(table).await
    }
}
