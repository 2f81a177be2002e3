//! Query-generation runs with scripted generators.

use async_trait::async_trait;
use chrono::{SecondsFormat, TimeDelta, Utc};
use gather::ai::{AiSession, GeneratorError, QueryGenerator, QueryValidationError, ResultAnalyzer};
use gather::{GatherConfig, GatherError, Gatherer, InMemoryWorkspace};
use shared::models::{Cell, Column};
use shared::query::InMemoryQuerySource;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const WORKSPACE: &str =
    "/subscriptions/sub-1/resourceGroups/rg-aks/providers/Microsoft.OperationalInsights/workspaces/ws-aks";

/// Returns `first` from `generate` and then each `fixes` entry in turn.
struct ScriptedGenerator {
    first: String,
    fixes: Mutex<Vec<String>>,
    fix_errors: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(first: &str, fixes: &[&str]) -> Self {
        Self {
            first: first.to_string(),
            fixes: Mutex::new(fixes.iter().rev().map(ToString::to_string).collect()),
            fix_errors: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryGenerator for ScriptedGenerator {
    async fn generate(&self, _question: &str, known_tables: &[&str]) -> Result<String, GeneratorError> {
        assert!(known_tables.contains(&"KubePodInventory"));
        Ok(self.first.clone())
    }

    async fn fix(
        &self,
        _question: &str,
        _failed_query: &str,
        error: &str,
        _known_tables: &[&str],
    ) -> Result<String, GeneratorError> {
        self.fix_errors.lock().unwrap().push(error.to_string());
        self.fixes.lock().unwrap().pop().ok_or(GeneratorError::Empty)
    }
}

struct FixedAnalyzer {
    reply: Result<String, ()>,
    seen: Mutex<Option<PathBuf>>,
}

impl FixedAnalyzer {
    fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            seen: Mutex::new(None),
        }
    }

    fn failing() -> Self {
        Self {
            reply: Err(()),
            seen: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ResultAnalyzer for FixedAnalyzer {
    async fn analyze(
        &self,
        _question: &str,
        _query: &str,
        results_dir: &Path,
    ) -> Result<String, GeneratorError> {
        *self.seen.lock().unwrap() = Some(results_dir.to_path_buf());
        self.reply.clone().map_err(|()| GeneratorError::Empty)
    }
}

fn perf_source() -> InMemoryQuerySource {
    let at = (Utc::now() - TimeDelta::minutes(10)).to_rfc3339_opts(SecondsFormat::Secs, true);
    InMemoryQuerySource::new().with_table(
        "Perf",
        vec![
            Column::new("TimeGenerated", "datetime"),
            Column::new("Computer", "string"),
            Column::new("CounterValue", "real"),
        ],
        vec![vec![Cell::from(at), Cell::from("aks-node-0"), Cell::Null]],
    )
}

fn gatherer(backend: InMemoryWorkspace) -> Gatherer {
    let config = GatherConfig::new(WORKSPACE)
        .with_timespan("1h")
        .with_ai_query("which node is busiest?");
    Gatherer::new(config, Arc::new(backend))
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_fixes_query_and_falls_back_to_raw_results() {
    let dir = tempfile::tempdir().unwrap();
    let backend = InMemoryWorkspace::new("guid-1").with_source(perf_source());
    let source = backend.source().clone();
    let generator = Arc::new(ScriptedGenerator::new(
        "KubeServices | take 5",
        &["Perf | take 5"],
    ));
    let analyzer = Arc::new(FixedAnalyzer::replying("   "));
    let session = AiSession::new(generator.clone(), analyzer.clone()).with_results_root(dir.path());
    let mut out = Vec::new();

    let report = session.run(&gatherer(backend), &mut out).await.unwrap();

    assert_eq!(report.query, "Perf | take 5");
    assert_eq!(report.tables, 1);
    assert!(report.analysis.is_none());

    let fix_errors = generator.fix_errors.lock().unwrap().clone();
    assert_eq!(fix_errors.len(), 1);
    assert!(fix_errors[0].contains("semantic error"));

    let queries: Vec<String> = source.requests().into_iter().map(|r| r.query).collect();
    assert_eq!(
        queries,
        vec![
            "KubeServices | take 5 | limit 0",
            "Perf | take 5 | limit 0",
            "Perf | take 5",
        ]
    );

    assert!(report
        .results_dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("ai-results-"));
    assert_eq!(
        analyzer.seen.lock().unwrap().as_deref(),
        Some(report.results_dir.as_path())
    );

    let results = report.results_dir.join("ai-query-results");
    assert_eq!(
        std::fs::read_to_string(results.join("query.kql")).unwrap(),
        "Perf | take 5"
    );
    assert_eq!(read_json(&results.join("summary.json"))["tableCount"], 1);
    assert_eq!(read_json(&results.join("table_0.json"))["rows"][0][1], "aks-node-0");

    let metadata = read_json(&report.results_dir.join("metadata/workspace.json"));
    assert_eq!(metadata["aiMode"], true);
    assert_eq!(metadata["userQuery"], "which node is busiest?");
    assert_eq!(metadata["kqlQuery"], "Perf | take 5");
    assert!(metadata.get("tablesCount").is_none());

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Warning: AI analysis returned empty result"));
    assert!(text.contains("Results (Table 1):"));
    assert!(text.contains("aks-node-0 | <null>"));
    assert!(text.contains("Query results saved to: "));
}

#[tokio::test]
async fn test_prints_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let backend = InMemoryWorkspace::new("guid-1").with_source(perf_source());
    let session = AiSession::new(
        Arc::new(ScriptedGenerator::new("Perf | top 1 by CounterValue", &[])),
        Arc::new(FixedAnalyzer::replying("aks-node-0 is the busiest node.\n")),
    )
    .with_results_root(dir.path());
    let mut out = Vec::new();

    let report = session.run(&gatherer(backend), &mut out).await.unwrap();

    assert_eq!(report.analysis.as_deref(), Some("aks-node-0 is the busiest node.\n"));
    let text = String::from_utf8(out).unwrap();
    let rule = "=".repeat(80);
    assert!(text.contains(&format!("{rule}\nAI ANALYSIS\n{rule}\naks-node-0 is the busiest node.\n{rule}")));
    assert!(!text.contains("Results (Table 1):"));
}

#[tokio::test]
async fn test_analyzer_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let backend = InMemoryWorkspace::new("guid-1").with_source(perf_source());
    let session = AiSession::new(
        Arc::new(ScriptedGenerator::new("Perf", &[])),
        Arc::new(FixedAnalyzer::failing()),
    )
    .with_results_root(dir.path());
    let mut out = Vec::new();

    session.run(&gatherer(backend), &mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Warning: Failed to analyze results with AI"));
    assert!(text.contains("Falling back to raw results display..."));
}

#[tokio::test]
async fn test_gives_up_after_three_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let backend = InMemoryWorkspace::new("guid-1").with_source(perf_source());
    let source = backend.source().clone();
    let session = AiSession::new(
        Arc::new(ScriptedGenerator::new(
            "KubeServices | take 5",
            &["KubeServices | take 6", "KubeServices | take 7"],
        )),
        Arc::new(FixedAnalyzer::replying("unused")),
    )
    .with_results_root(dir.path());
    let mut out = Vec::new();

    let err = session.run(&gatherer(backend), &mut out).await.unwrap_err();

    assert!(matches!(
        err,
        GatherError::QueryValidation(QueryValidationError::Exhausted { attempts: 3, .. })
    ));
    assert_eq!(source.requests().len(), 3);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_basic_validation_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let backend = InMemoryWorkspace::new("guid-1").with_source(perf_source());
    let source = backend.source().clone();
    let session = AiSession::new(
        Arc::new(ScriptedGenerator::new("SELECT * FROM Perf", &[])),
        Arc::new(FixedAnalyzer::replying("unused")),
    )
    .with_results_root(dir.path());
    let mut out = Vec::new();

    let err = session.run(&gatherer(backend), &mut out).await.unwrap_err();

    assert!(matches!(
        err,
        GatherError::QueryValidation(QueryValidationError::SqlSyntax)
    ));
    assert!(source.requests().is_empty());
    assert!(String::from_utf8(out).unwrap().contains("Basic validation failed"));
}

#[tokio::test]
async fn test_requires_question() {
    let session = AiSession::new(
        Arc::new(ScriptedGenerator::new("Perf", &[])),
        Arc::new(FixedAnalyzer::replying("unused")),
    );
    let config = GatherConfig::new(WORKSPACE).with_ai_query("  ");
    let gatherer = Gatherer::new(config, Arc::new(InMemoryWorkspace::new("guid-1")));

    let err = session.run(&gatherer, &mut Vec::<u8>::new()).await.unwrap_err();

    assert!(matches!(err, GatherError::Configuration(_)));
}
