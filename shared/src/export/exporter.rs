//! Table exporter.
//!
//! Drives the per-target, per-window loop: fetch the schema, query every window,
//! write non-empty windows as NDJSON parts, feed rows to the stitcher and always
//! finish a target with its summary.
//!
//! Failure isolation:
//! - a failed schema fetch omits `schema.json`;
//! - a failed window query counts as an empty window;
//! - a partial result is accepted as is;
//! - a [`TargetExportError`] skips the rest of that target only;
//! - sink errors and cancellation abort the run.

use crate::config::Timespan;
use crate::models::{ExportSummary, ExportTarget, Window};
use crate::query::{
    PlanError, QueryRequest, QueryResponse, QuerySource, TableCatalog, WindowPlan,
    DEFAULT_QUERY_WAIT,
};
use crate::stitch::{ExtractionRegistry, StitchAccumulator};
use crate::storage::naming::{part_path, schema_path, summary_path};
use crate::storage::{put_json, ArtifactSink, SinkError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that abort one target but not the run.
#[derive(Debug, Error)]
pub enum TargetExportError {
    /// The target name is blank.
    #[error("invalid target name {0:?}")]
    InvalidTarget(String),

    /// A row of a window could not be encoded.
    #[error("failed to encode rows of window {window}: {source}")]
    Encode {
        /// Window whose rows failed.
        window: Window,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that abort the whole run.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The lookback could not be planned.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Writing to the artifact sink failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The run was cancelled.
    #[error("export cancelled")]
    Cancelled,
}

enum TargetFailure {
    Skip(TargetExportError),
    Abort(ExportError),
}

impl From<SinkError> for TargetFailure {
    fn from(err: SinkError) -> Self {
        Self::Abort(ExportError::Sink(err))
    }
}

/// Settings shared by every target of a run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Lookback covered by the export.
    pub timespan: Timespan,

    /// Server-side wait budget per window query.
    pub wait: Duration,
}

impl ExportOptions {
    /// Creates options with the default wait budget.
    #[must_use]
    pub fn new(timespan: Timespan) -> Self {
        Self {
            timespan,
            wait: DEFAULT_QUERY_WAIT,
        }
    }

    /// Sets the wait budget.
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }
}

/// Outcome of one exported target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetReport {
    /// Total rows written.
    pub rows: u64,
    /// Part files written.
    pub parts: usize,
    /// Windows whose query failed.
    pub failed_windows: usize,
    /// Windows that returned a partial result.
    pub partial_windows: usize,
    /// Whether `schema.json` was written.
    pub schema_written: bool,
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct ExportReport {
    /// Targets that completed, in export order.
    pub completed: Vec<(ExportTarget, TargetReport)>,
    /// Targets that were skipped, with the reason.
    pub skipped: Vec<(ExportTarget, TargetExportError)>,
}

impl ExportReport {
    /// Returns the total number of rows written across all targets.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.completed.iter().map(|(_, r)| r.rows).sum()
    }

    /// Returns the report of one completed target.
    #[must_use]
    pub fn target(&self, target: &ExportTarget) -> Option<&TargetReport> {
        self.completed
            .iter()
            .find(|(t, _)| t == target)
            .map(|(_, r)| r)
    }
}

/// Exports targets window by window into an artifact sink.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use shared::config::Timespan;
/// use shared::export::{ExportOptions, TableExporter};
/// use shared::query::InMemoryQuerySource;
/// use shared::stitch::StitchAccumulator;
/// use shared::storage::InMemoryArtifactSink;
/// use std::sync::Arc;
///
/// let exporter = TableExporter::new(
///     Arc::new(InMemoryQuerySource::new()),
///     ExportOptions::new(Timespan::parse("30m").unwrap()),
/// );
/// let mut sink = InMemoryArtifactSink::new();
/// let mut acc = StitchAccumulator::new(true, true);
///
/// let report = tokio_test::block_on(exporter.export_all(
///     &["Perf".into()],
///     Utc::now(),
///     &mut sink,
///     &mut acc,
/// ))
/// .unwrap();
///
/// // Every window failed (unknown table), the summary is still written.
/// assert_eq!(report.target(&"Perf".into()).unwrap().failed_windows, 2);
/// assert!(sink.get("tables/Perf/summary.json").is_some());
/// ```
pub struct TableExporter {
    source: Arc<dyn QuerySource>,
    catalog: Option<Arc<dyn TableCatalog>>,
    registry: ExtractionRegistry,
    options: ExportOptions,
    cancel: CancellationToken,
}

impl TableExporter {
    /// Creates an exporter with the builtin extraction registry and no catalog.
    #[must_use]
    pub fn new(source: Arc<dyn QuerySource>, options: ExportOptions) -> Self {
        Self {
            source,
            catalog: None,
            registry: ExtractionRegistry::builtin(),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Fetches schemas from a catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn TableCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replaces the extraction registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ExtractionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Stops the export when the token is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the export options.
    #[must_use]
    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Exports every target over the lookback ending at `now`.
    ///
    /// Targets run sequentially in the given order, one window at a time.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] if planning or a sink write fails, or the run is
    /// cancelled. Artifacts written before the error stay in the sink.
    pub async fn export_all(
        &self,
        targets: &[ExportTarget],
        now: DateTime<Utc>,
        sink: &mut dyn ArtifactSink,
        acc: &mut StitchAccumulator,
    ) -> Result<ExportReport, ExportError> {
        let plan = WindowPlan::new(self.options.timespan.duration(), now)?;
        tracing::info!(
            targets = targets.len(),
            windows = plan.len(),
            chunk_minutes = plan.chunk().num_minutes(),
            "Starting export"
        );

        let mut report = ExportReport::default();
        for target in targets {
            if self.cancel.is_cancelled() {
                return Err(ExportError::Cancelled);
            }
            match self.export_target(target, &plan, sink, acc).await {
                Ok(target_report) => report.completed.push((target.clone(), target_report)),
                Err(TargetFailure::Skip(err)) => {
                    tracing::warn!(table = %target, error = %err, "Export failed for table; skipping");
                    report.skipped.push((target.clone(), err));
                }
                Err(TargetFailure::Abort(err)) => return Err(err),
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            rows = report.total_rows(),
            "Export finished"
        );
        Ok(report)
    }

    async fn export_target(
        &self,
        target: &ExportTarget,
        plan: &WindowPlan,
        sink: &mut dyn ArtifactSink,
        acc: &mut StitchAccumulator,
    ) -> Result<TargetReport, TargetFailure> {
        tracing::info!(table = %target, "Exporting table");
        if target.as_str().trim().is_empty() {
            return Err(TargetFailure::Skip(TargetExportError::InvalidTarget(
                target.to_string(),
            )));
        }

        let mut report = TargetReport {
            schema_written: self.export_schema(target, sink).await?,
            ..TargetReport::default()
        };

        for window in plan {
            if self.cancel.is_cancelled() {
                return Err(TargetFailure::Abort(ExportError::Cancelled));
            }

            let request = QueryRequest::new(target.as_str(), window).with_wait(self.options.wait);
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Err(TargetFailure::Abort(ExportError::Cancelled));
                }
                result = self.source.query(&request) => result,
            };

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(
                        table = %target,
                        start = %window.start,
                        end = %window.end,
                        error = %err,
                        "Query failed; treating window as empty"
                    );
                    report.failed_windows += 1;
                    continue;
                }
            };
            if let Some(partial) = &response.partial_error {
                tracing::warn!(
                    table = %target,
                    start = %window.start,
                    end = %window.end,
                    error = %partial,
                    "Partial query result; keeping returned rows"
                );
                report.partial_windows += 1;
            }

            let (part, rows) = match self.process_window(target, window, &response, acc) {
                Ok(encoded) => encoded,
                Err(err) => {
                    acc.discard_window();
                    return Err(TargetFailure::Skip(err));
                }
            };
            acc.commit_window();
            tracing::debug!(table = %target, window = %window, rows, "Window exported");

            if rows > 0 {
                sink.put(&part_path(target, report.parts, &window), &part)?;
                report.parts += 1;
                report.rows += rows;
            }
        }

        let summary = ExportSummary {
            table: target.clone(),
            rows: report.rows,
            duration: self.options.timespan.iso().to_string(),
        };
        put_json(sink, &summary_path(target), &summary)?;
        tracing::info!(table = %target, rows = report.rows, parts = report.parts, "Table exported");
        Ok(report)
    }

    /// Returns whether a schema was written. Lookup failures are logged only.
    async fn export_schema(
        &self,
        target: &ExportTarget,
        sink: &mut dyn ArtifactSink,
    ) -> Result<bool, TargetFailure> {
        let Some(catalog) = &self.catalog else {
            return Ok(false);
        };
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Err(TargetFailure::Abort(ExportError::Cancelled));
            }
            result = catalog.table_schema(target) => result,
        };
        match result {
            Ok(schema) => {
                put_json(sink, &schema_path(target), &schema)?;
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(table = %target, error = %err, "Schema fetch failed");
                Ok(false)
            }
        }
    }

    /// Encodes a window's rows as NDJSON and hands them to the stitcher.
    fn process_window(
        &self,
        target: &ExportTarget,
        window: Window,
        response: &QueryResponse,
        acc: &mut StitchAccumulator,
    ) -> Result<(Vec<u8>, u64), TargetExportError> {
        let mut part = Vec::new();
        let mut rows = 0u64;
        for table in &response.tables {
            let columns = table.column_index();
            let bound = self.registry.bind(target, &columns, |kind| acc.accepts(kind));
            for row in &table.rows {
                serde_json::to_writer(&mut part, &columns.row_to_json(row))
                    .map_err(|source| TargetExportError::Encode { window, source })?;
                part.push(b'\n');
                rows += 1;
                for descriptor in &bound {
                    acc.push(descriptor.extract(row));
                }
            }
        }
        Ok((part, rows))
    }
}

impl std::fmt::Debug for TableExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableExporter")
            .field("catalog", &self.catalog.is_some())
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, Column};
    use crate::query::{InMemoryCatalog, InMemoryQuerySource};
    use crate::storage::InMemoryArtifactSink;
    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn ts(minutes_ago: i64) -> Cell {
        Cell::from(
            (now() - TimeDelta::minutes(minutes_ago))
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        )
    }

    fn log_columns() -> Vec<Column> {
        [
            "TimeGenerated",
            "PodNamespace",
            "PodName",
            "ContainerName",
            "LogSource",
            "LogMessage",
        ]
        .iter()
        .map(|n| Column::new(*n, "string"))
        .collect()
    }

    fn log_row(minutes_ago: i64, ns: &str, pod: &str, message: &str) -> Vec<Cell> {
        vec![
            ts(minutes_ago),
            Cell::from(ns),
            Cell::from(pod),
            Cell::from(if pod.is_empty() { "" } else { "app" }),
            Cell::from("stdout"),
            Cell::from(message),
        ]
    }

    fn exporter(source: InMemoryQuerySource) -> TableExporter {
        TableExporter::new(
            Arc::new(source),
            ExportOptions::new(Timespan::parse("1h").unwrap()),
        )
    }

    #[tokio::test]
    async fn test_parts_only_for_non_empty_windows() {
        let source = InMemoryQuerySource::new().with_table(
            "Heartbeat",
            vec![Column::new("TimeGenerated", "datetime"), Column::new("Computer", "string")],
            vec![
                vec![ts(50), Cell::from("a")],
                vec![ts(5), Cell::from("b")],
                vec![ts(4), Cell::from("c")],
            ],
        );
        let mut sink = InMemoryArtifactSink::new();
        let mut acc = StitchAccumulator::new(true, true);

        let report = exporter(source)
            .export_all(&["Heartbeat".into()], now(), &mut sink, &mut acc)
            .await
            .unwrap();

        let parts = sink.paths_under("tables/Heartbeat/parts/");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("tables/Heartbeat/parts/0000-2024-06-01T11:00:00Z_"));
        assert!(parts[1].starts_with("tables/Heartbeat/parts/0001-2024-06-01T11:45:00Z_"));

        let second = sink.get_text(parts[1]).unwrap();
        assert_eq!(second.lines().count(), 2);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(second.lines().next().unwrap()).unwrap(),
            json!({"Computer": "b", "TimeGenerated": "2024-06-01T11:55:00Z"})
        );

        assert_eq!(
            sink.get_json("tables/Heartbeat/summary.json").unwrap(),
            json!({"table": "Heartbeat", "rows": 3, "duration": "PT1H0M0S"})
        );
        assert_eq!(report.total_rows(), 3);
    }

    #[tokio::test]
    async fn test_failed_window_counts_as_empty() {
        let source = InMemoryQuerySource::new()
            .with_table(
                "Heartbeat",
                vec![Column::new("TimeGenerated", "datetime")],
                vec![vec![ts(50)], vec![ts(20)]],
            )
            .with_failing_window("Heartbeat", now() - TimeDelta::hours(1), "timeout");
        let mut sink = InMemoryArtifactSink::new();
        let mut acc = StitchAccumulator::new(false, false);

        let report = exporter(source)
            .export_all(&["Heartbeat".into()], now(), &mut sink, &mut acc)
            .await
            .unwrap();

        let target = report.target(&"Heartbeat".into()).unwrap();
        assert_eq!(target.failed_windows, 1);
        assert_eq!(target.rows, 1);
        assert_eq!(sink.paths_under("tables/Heartbeat/parts/").len(), 1);
        assert_eq!(
            sink.get_json("tables/Heartbeat/summary.json").unwrap()["rows"],
            json!(1)
        );
    }

    #[tokio::test]
    async fn test_partial_window_keeps_rows() {
        let source = InMemoryQuerySource::new()
            .with_table(
                "Heartbeat",
                vec![Column::new("TimeGenerated", "datetime")],
                vec![vec![ts(55)]],
            )
            .with_partial_window("Heartbeat", now() - TimeDelta::hours(1), "shard lost");
        let mut sink = InMemoryArtifactSink::new();
        let mut acc = StitchAccumulator::new(false, false);

        let report = exporter(source)
            .export_all(&["Heartbeat".into()], now(), &mut sink, &mut acc)
            .await
            .unwrap();

        let target = report.target(&"Heartbeat".into()).unwrap();
        assert_eq!(target.partial_windows, 1);
        assert_eq!(target.rows, 1);
    }

    #[tokio::test]
    async fn test_failing_target_does_not_stop_later_targets() {
        let source = InMemoryQuerySource::new()
            .with_table("Perf", vec![Column::new("TimeGenerated", "datetime")], vec![vec![ts(1)]])
            .with_failing_table("KubeEvents", "boom");
        let mut sink = InMemoryArtifactSink::new();
        let mut acc = StitchAccumulator::new(true, true);

        let report = exporter(source)
            .export_all(
                &["KubeEvents".into(), " ".into(), "Perf".into()],
                now(),
                &mut sink,
                &mut acc,
            )
            .await
            .unwrap();

        assert_eq!(sink.get_json("tables/KubeEvents/summary.json").unwrap()["rows"], json!(0));
        assert_eq!(sink.get_json("tables/Perf/summary.json").unwrap()["rows"], json!(1));
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(
            report.skipped[0].1,
            TargetExportError::InvalidTarget(_)
        ));
    }

    #[tokio::test]
    async fn test_stitching_excludes_noise_but_parts_keep_it() {
        let source = InMemoryQuerySource::new().with_table(
            "ContainerLogV2",
            log_columns(),
            vec![
                log_row(10, "default", "web-0", "second"),
                log_row(12, "default", "web-0", "first"),
                log_row(11, "", "", "noise"),
                log_row(40, "default", "web-0", "zeroth"),
            ],
        );
        let mut sink = InMemoryArtifactSink::new();
        let mut acc = StitchAccumulator::new(true, true);

        exporter(source)
            .export_all(&["ContainerLogV2".into()], now(), &mut sink, &mut acc)
            .await
            .unwrap();
        acc.flush(&mut sink).unwrap();

        let raw: String = sink
            .paths_under("tables/ContainerLogV2/parts/")
            .iter()
            .filter_map(|p| sink.get_text(p))
            .collect();
        assert!(raw.contains("noise"));

        let stitched = sink
            .get_text("namespaces/default/pods/web-0/app.log")
            .unwrap();
        let messages: Vec<&str> = stitched
            .lines()
            .map(|l| l.rsplit(' ').next().unwrap())
            .collect();
        assert_eq!(messages, vec!["zeroth", "first", "second"]);
        assert!(!stitched.contains("noise"));
    }

    #[tokio::test]
    async fn test_schema_written_when_available() {
        let source = InMemoryQuerySource::new()
            .with_table("Perf", vec![Column::new("TimeGenerated", "datetime")], vec![]);
        let catalog = InMemoryCatalog::new()
            .with_schema("Perf", json!({"name": "Perf"}))
            .with_table("Heartbeat");
        let exporter = exporter(source).with_catalog(Arc::new(catalog));
        let mut sink = InMemoryArtifactSink::new();
        let mut acc = StitchAccumulator::new(false, false);

        let report = exporter
            .export_all(&["Perf".into(), "Heartbeat".into()], now(), &mut sink, &mut acc)
            .await
            .unwrap();

        assert!(report.target(&"Perf".into()).unwrap().schema_written);
        assert!(!report.target(&"Heartbeat".into()).unwrap().schema_written);
        assert!(sink.get("tables/Perf/schema.json").is_some());
        assert!(sink.get("tables/Heartbeat/schema.json").is_none());
        assert!(sink.get("tables/Heartbeat/summary.json").is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let exporter = exporter(InMemoryQuerySource::new()).with_cancellation(token);
        let mut sink = InMemoryArtifactSink::new();
        let mut acc = StitchAccumulator::new(false, false);

        let result = exporter
            .export_all(&["Perf".into()], now(), &mut sink, &mut acc)
            .await;

        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_hanging_query() {
        let token = CancellationToken::new();
        let source = InMemoryQuerySource::new().with_hanging_table("Perf");
        let exporter = exporter(source).with_cancellation(token.clone());
        let mut sink = InMemoryArtifactSink::new();
        let mut acc = StitchAccumulator::new(false, false);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let result = exporter
            .export_all(&["Perf".into()], now(), &mut sink, &mut acc)
            .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert!(sink.get("tables/Perf/summary.json").is_none());
    }
}
