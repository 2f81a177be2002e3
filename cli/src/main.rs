//! aks-must-gather CLI
//!
//! Exports AKS diagnostics from a Log Analytics workspace into a `.tar.zst`
//! archive, or answers a natural-language question with a generated query.
//!
//! # Usage
//!
//! ```bash
//! aks-must-gather --workspace-id /subscriptions/.../workspaces/ws --timespan 6h
//! aks-must-gather --workspace-id ... --profiles podLogs,metrics --out bundle.tar.zst
//! aks-must-gather --workspace-id ... --ai-mode "why are my pods restarting?"
//! ```
//!
//! Bearer tokens are read from `MUST_GATHER_LOGS_TOKEN`,
//! `MUST_GATHER_MANAGEMENT_TOKEN` or `AZURE_ACCESS_TOKEN`.

#![deny(unsafe_code)]

use anyhow::Context;
use clap::{ArgAction, Parser};
use gather::ai::{AiSession, ClaudeCli};
use gather::config::{DEFAULT_QUERY_WAIT_SECS, DEFAULT_TIMESPAN};
use gather::{AzureWorkspace, Endpoints, GatherConfig, GatherError, Gatherer, StaticTokenCredential};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// aks-must-gather - collect AKS diagnostics from Log Analytics
#[derive(Parser, Debug)]
#[command(name = "aks-must-gather")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log Analytics workspace resource id
    #[arg(short, long, env = "AKS_MUST_GATHER_WORKSPACE_ID")]
    workspace_id: String,

    /// Lookback, e.g. PT2H or 90m
    #[arg(short, long, default_value = DEFAULT_TIMESPAN)]
    timespan: String,

    /// Output archive (default: must-gather-<timestamp>.tar.zst)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Comma-separated tables to export
    #[arg(long)]
    tables: Option<String>,

    /// Comma-separated profiles to export
    #[arg(long)]
    profiles: Option<String>,

    /// Export every table of the workspace
    #[arg(long)]
    all_tables: bool,

    /// Stitch container logs into per-container files
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    stitch_logs: bool,

    /// Also stitch cluster events into per-namespace files
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    stitch_include_events: bool,

    /// Server wait budget per query, in seconds
    #[arg(long, default_value_t = DEFAULT_QUERY_WAIT_SECS)]
    query_wait: u64,

    /// Answer a natural-language question with a generated query
    #[arg(long, value_name = "QUESTION")]
    ai_mode: Option<String>,
}

impl Cli {
    fn into_config(self) -> GatherConfig {
        let mut config = GatherConfig::new(self.workspace_id)
            .with_timespan(self.timespan)
            .with_all_tables(self.all_tables)
            .with_stitching(self.stitch_logs, self.stitch_include_events)
            .with_query_wait_secs(self.query_wait)
            .with_endpoints(Endpoints::from_env());
        if let Some(out) = self.out {
            config = config.with_output(out);
        }
        if let Some(tables) = self.tables {
            config = config.with_tables(tables);
        }
        if let Some(profiles) = self.profiles {
            config = config.with_profiles(profiles);
        }
        if let Some(question) = self.ai_mode {
            config = config.with_ai_query(question);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, stopping");
            on_interrupt.cancel();
        }
    });

    match run(cli.into_config(), cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

async fn run(config: GatherConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let backend = AzureWorkspace::new(
        config.endpoints.clone(),
        Arc::new(StaticTokenCredential::from_env()),
    )
    .context("build HTTP client")?;
    let ai_mode = config.ai_query.is_some();
    let gatherer = Gatherer::new(config, Arc::new(backend)).with_cancellation(cancel);

    if ai_mode {
        let claude = Arc::new(ClaudeCli::locate()?);
        let session = AiSession::new(claude.clone(), claude)
            .with_results_root(std::env::current_dir().context("resolve current directory")?);
        let mut stdout = std::io::stdout();
        session.run(&gatherer, &mut stdout).await?;
        return Ok(());
    }

    let report = gatherer.run().await?;
    tracing::info!(
        path = %report.output.display(),
        tables = report.export.completed.len(),
        skipped = report.export.skipped.len(),
        rows = report.export.total_rows(),
        "Export complete"
    );
    println!("{}", report.output.display());
    Ok(())
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<GatherError>() {
        Some(GatherError::Cancelled) => 130,
        Some(e) if e.is_configuration() => 2,
        _ => 1,
    }
}
