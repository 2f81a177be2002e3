//! Data models for aks-must-gather.
//!
//! This module contains result rows, query windows and the JSON documents
//! written into an export archive.

pub mod export;
pub mod row;
pub mod window;

pub use export::{ExportSummary, ExportTarget, IndexManifest, ManagementIdentity, WorkspaceMetadata};
pub use row::{Cell, Column, ColumnIndex, ResultTable, Row};
pub use window::Window;
