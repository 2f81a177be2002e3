//! Table export.
//!
//! [`TableExporter`] runs the window loop for each target and writes parts,
//! schemas and summaries into an [`ArtifactSink`](crate::storage::ArtifactSink).

pub mod exporter;

pub use exporter::{
    ExportError, ExportOptions, ExportReport, TableExporter, TargetExportError, TargetReport,
};
