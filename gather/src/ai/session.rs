//! Query-generation run.
//!
//! Generate a query from the question, validate it (client side once, then on the
//! server with up to [`MAX_ATTEMPTS`] generator fixes), execute it over the full
//! lookback, write the results into `ai-results-<timestamp>/` and print an
//! analysis or, failing that, the raw rows.

use super::generator::{QueryGenerator, ResultAnalyzer};
use super::prompt::AI_KNOWN_TABLES;
use super::validate::{basic_validation, validate_on_server, QueryValidationError};
use crate::config::ai_results_dir_name;
use crate::error::GatherError;
use crate::gatherer::{Gatherer, ResolvedWorkspace};
use chrono::{Local, SecondsFormat, TimeDelta, Utc};
use serde::Serialize;
use shared::models::{Cell, ResultTable, Window, WorkspaceMetadata};
use shared::query::{QueryRequest, QuerySource};
use shared::storage::{
    put_json, ArtifactSink, DirectoryArtifactSink, AZURE_METADATA_PATH, WORKSPACE_METADATA_PATH,
};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Validation attempts before giving up.
pub const MAX_ATTEMPTS: usize = 3;

/// Rows printed per table when falling back to raw output.
pub const MAX_DISPLAY_ROWS: usize = 50;

/// Cells longer than this are cut when printed.
pub const MAX_CELL_WIDTH: usize = 100;

const RESULTS_DIR: &str = "ai-query-results";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultsSummary {
    table_count: usize,
    timestamp: String,
}

/// Outcome of a query-generation run.
#[derive(Debug)]
pub struct AiReport {
    /// The query that was executed.
    pub query: String,
    /// Directory holding the results.
    pub results_dir: PathBuf,
    /// Result tables returned.
    pub tables: usize,
    /// Analyzer output, when it produced one.
    pub analysis: Option<String>,
}

/// Runs the question-to-results flow for one gatherer.
pub struct AiSession {
    generator: Arc<dyn QueryGenerator>,
    analyzer: Arc<dyn ResultAnalyzer>,
    results_root: PathBuf,
}

impl AiSession {
    /// Creates a session writing results under the current directory.
    #[must_use]
    pub fn new(generator: Arc<dyn QueryGenerator>, analyzer: Arc<dyn ResultAnalyzer>) -> Self {
        Self {
            generator,
            analyzer,
            results_root: PathBuf::from("."),
        }
    }

    /// Sets the directory the timestamped results directory is created in.
    #[must_use]
    pub fn with_results_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.results_root = root.into();
        self
    }

    /// Runs the flow, printing progress and results to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the question is missing, the workspace cannot be
    /// resolved, generation or validation fails, the query cannot be executed,
    /// the results cannot be written, or the run is cancelled.
    pub async fn run(
        &self,
        gatherer: &Gatherer,
        out: &mut (dyn Write + Send),
    ) -> Result<AiReport, GatherError> {
        let question = gatherer
            .config()
            .ai_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| GatherError::Configuration("ai-mode requires a question".to_string()))?
            .to_string();
        writeln!(out, "Running in AI mode with query: {question}")?;

        let resolved = gatherer.resolve_workspace().await?;
        let source = gatherer.backend().query_source(&resolved.workspace_guid);

        writeln!(out, "Generating KQL query from natural language...")?;
        let cancel = gatherer.cancellation();
        let generated =
            cancellable(cancel, self.generator.generate(&question, AI_KNOWN_TABLES)).await??;
        writeln!(out, "Generated KQL query:\n{generated}\n")?;

        writeln!(out, "Validating KQL syntax...")?;
        if let Err(err) = basic_validation(&generated) {
            writeln!(out, "Basic validation failed: {err}")?;
            return Err(err.into());
        }
        let query = self
            .validate_and_fix(cancel, source.as_ref(), &question, generated)
            .await?;
        writeln!(out, "KQL syntax is valid\n")?;

        writeln!(out, "Executing query...")?;
        let lookback = TimeDelta::from_std(resolved.timespan.duration())
            .map_err(|e| GatherError::Configuration(format!("timespan out of range: {e}")))?;
        let now = Utc::now();
        let window = Window::new(now - lookback, now);
        let request = QueryRequest::new(query.clone(), window).with_wait(gatherer.config().query_wait());
        let response = cancellable(cancel, source.query(&request)).await??;
        if let Some(partial) = &response.partial_error {
            tracing::warn!(error = %partial, "Partial query result; keeping returned rows");
        }

        let results_dir = self.results_root.join(ai_results_dir_name(Local::now()));
        writeln!(out, "Writing results to directory: {}", results_dir.display())?;
        let mut sink = DirectoryArtifactSink::create(&results_dir)?;
        write_results(
            &mut sink,
            gatherer,
            &resolved,
            &question,
            &query,
            &response.tables,
        )?;
        sink.finish()?;

        writeln!(out, "Analyzing results with AI...")?;
        let analysis = match cancellable(
            cancel,
            self.analyzer.analyze(&question, &query, &results_dir),
        )
        .await?
        {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                writeln!(out, "Warning: AI analysis returned empty result")?;
                None
            }
            Err(err) => {
                writeln!(out, "Warning: Failed to analyze results with AI: {err}")?;
                None
            }
        };

        match &analysis {
            Some(text) => {
                let rule = "=".repeat(80);
                writeln!(out, "\n{rule}\nAI ANALYSIS\n{rule}\n{}\n{rule}", text.trim())?;
            }
            None => {
                writeln!(out, "Falling back to raw results display...")?;
                display_results(&response.tables, out)?;
            }
        }

        writeln!(out, "\nQuery results saved to: {}", results_dir.display())?;
        writeln!(
            out,
            "You can inspect the raw data, KQL query, and metadata in this directory."
        )?;

        Ok(AiReport {
            query,
            results_dir,
            tables: response.tables.len(),
            analysis,
        })
    }

    async fn validate_and_fix(
        &self,
        cancel: &CancellationToken,
        source: &dyn QuerySource,
        question: &str,
        mut query: String,
    ) -> Result<String, GatherError> {
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                tracing::info!(attempt, max = MAX_ATTEMPTS, "Retrying validation");
            }
            let rejection = match cancellable(cancel, validate_on_server(source, &query, Utc::now()))
                .await?
            {
                Ok(()) => return Ok(query),
                Err(rejection) => rejection,
            };

            if attempt == MAX_ATTEMPTS {
                return Err(QueryValidationError::Exhausted {
                    attempts: MAX_ATTEMPTS,
                    last: Box::new(rejection),
                }
                .into());
            }

            tracing::warn!(error = %rejection, "Validation failed; asking the generator for a fix");
            let fixed = cancellable(
                cancel,
                self.generator
                    .fix(question, &query, &rejection.to_string(), AI_KNOWN_TABLES),
            )
            .await?;
            match fixed {
                Ok(fixed) => {
                    tracing::info!(query = %fixed, "Fixed KQL query");
                    query = fixed;
                }
                Err(err) => tracing::warn!(error = %err, "Failed to fix query"),
            }
        }
        Ok(query)
    }
}

async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, GatherError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GatherError::Cancelled),
        output = future => Ok(output),
    }
}

impl std::fmt::Debug for AiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiSession")
            .field("results_root", &self.results_root)
            .finish_non_exhaustive()
    }
}

fn write_results(
    sink: &mut dyn ArtifactSink,
    gatherer: &Gatherer,
    resolved: &ResolvedWorkspace,
    question: &str,
    query: &str,
    tables: &[ResultTable],
) -> Result<(), GatherError> {
    let metadata = WorkspaceMetadata::for_export(
        Utc::now(),
        &resolved.workspace_guid,
        &gatherer.config().workspace_id,
        resolved.timespan.iso(),
        0,
    )
    .with_generated_query(question, query);
    put_json(sink, WORKSPACE_METADATA_PATH, &metadata)?;
    put_json(sink, AZURE_METADATA_PATH, &resolved.workspace.identity())?;

    if tables.is_empty() {
        return Ok(());
    }
    sink.put(&format!("{RESULTS_DIR}/query.kql"), query.as_bytes())?;
    for (i, table) in tables.iter().enumerate() {
        put_json(sink, &format!("{RESULTS_DIR}/table_{i}.json"), table)?;
    }
    put_json(
        sink,
        &format!("{RESULTS_DIR}/summary.json"),
        &ResultsSummary {
            table_count: tables.len(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        },
    )?;
    Ok(())
}

/// Prints result tables as `|`-separated text, at most [`MAX_DISPLAY_ROWS`] rows each.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn display_results(tables: &[ResultTable], out: &mut dyn Write) -> std::io::Result<()> {
    if tables.is_empty() {
        return writeln!(out, "No results found.");
    }

    for (i, table) in tables.iter().enumerate() {
        if i > 0 {
            writeln!(out, "\n{}", "=".repeat(80))?;
        }
        writeln!(out, "Results (Table {}):", i + 1)?;
        writeln!(out, "{}", "-".repeat(40))?;

        if table.columns.is_empty() {
            writeln!(out, "No data in this table.")?;
            continue;
        }

        let header = table
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        writeln!(out, "{header}")?;
        writeln!(out, "{}", "-".repeat(header.len()))?;

        let total = table.rows.len();
        if total > MAX_DISPLAY_ROWS {
            writeln!(out, "Showing first {MAX_DISPLAY_ROWS} of {total} rows:")?;
        }
        for row in table.rows.iter().take(MAX_DISPLAY_ROWS) {
            let line = row.iter().map(display_cell).collect::<Vec<_>>().join(" | ");
            writeln!(out, "{line}")?;
        }
        if total > MAX_DISPLAY_ROWS {
            writeln!(out, "\n... and {} more rows", total - MAX_DISPLAY_ROWS)?;
        }
    }
    Ok(())
}

fn display_cell(cell: &Cell) -> String {
    if cell.is_null() {
        return "<null>".to_string();
    }
    let text = cell.as_text();
    if text.chars().count() > MAX_CELL_WIDTH {
        let cut: String = text.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{cut}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::Column;

    fn render(tables: &[ResultTable]) -> String {
        let mut out = Vec::new();
        display_results(tables, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_display_no_tables() {
        assert_eq!(render(&[]), "No results found.\n");
    }

    #[test]
    fn test_display_truncates_rows_and_cells() {
        let mut table = ResultTable::new(vec![
            Column::new("Name", "string"),
            Column::new("Count", "long"),
        ]);
        for i in 0..52 {
            table.rows.push(vec![Cell::from(format!("pod-{i}")), Cell::Null]);
        }
        table.rows[0][0] = Cell::from("x".repeat(150));

        let text = render(&[table]);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Results (Table 1):");
        assert_eq!(lines[2], "Name | Count");
        assert_eq!(lines[3], "-".repeat(12));
        assert_eq!(lines[4], "Showing first 50 of 52 rows:");
        assert_eq!(lines[5], format!("{}... | <null>", "x".repeat(97)));
        assert_eq!(lines[6], "pod-1 | <null>");
        assert!(text.contains("pod-49 | <null>"));
        assert!(!text.contains("pod-50"));
        assert!(text.ends_with("\n... and 2 more rows\n"));
    }

    #[test]
    fn test_display_separates_tables() {
        let a = ResultTable::new(vec![Column::new("A", "string")]);
        let b = ResultTable::new(vec![]);
        let text = render(&[a, b]);
        assert!(text.contains(&format!("\n{}\nResults (Table 2):", "=".repeat(80))));
        assert!(text.trim_end().ends_with("No data in this table."));
    }
}
