//! Run configuration.
//!
//! Values come from command-line flags; endpoints come from environment variables:
//! - `MUST_GATHER_LOGS_ENDPOINT`: Log Analytics endpoint (default: `https://api.loganalytics.io`)
//! - `MUST_GATHER_MANAGEMENT_ENDPOINT`: Resource Manager endpoint (default: `https://management.azure.com`)

use crate::client::{DEFAULT_LOGS_ENDPOINT, DEFAULT_MANAGEMENT_ENDPOINT};
use chrono::{DateTime, Local};
use shared::config::TargetSelection;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Default lookback.
pub const DEFAULT_TIMESPAN: &str = "PT2H";

/// Default server-side wait budget per query, in seconds.
pub const DEFAULT_QUERY_WAIT_SECS: u64 = 180;

/// Service endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Log Analytics data-plane endpoint.
    pub logs: String,
    /// Azure Resource Manager endpoint.
    pub management: String,
}

impl Endpoints {
    /// Reads endpoint overrides from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let read = |name: &str, default: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            logs: read("MUST_GATHER_LOGS_ENDPOINT", DEFAULT_LOGS_ENDPOINT),
            management: read("MUST_GATHER_MANAGEMENT_ENDPOINT", DEFAULT_MANAGEMENT_ENDPOINT),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            logs: DEFAULT_LOGS_ENDPOINT.to_string(),
            management: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
        }
    }
}

/// Settings of one gather run.
#[derive(Debug, Clone, Validate)]
pub struct GatherConfig {
    /// Workspace ARM resource id.
    #[validate(length(min = 1, message = "workspace-id is required"))]
    pub workspace_id: String,

    /// Lookback, simple (`2h30m`) or ISO-8601 (`PT2H30M`).
    #[validate(length(min = 1, message = "timespan cannot be empty"))]
    pub timespan: String,

    /// Output archive path. Generated from the start time when unset.
    pub output: Option<PathBuf>,

    /// Comma-separated explicit tables.
    pub tables: Option<String>,

    /// Comma-separated profile names.
    pub profiles: Option<String>,

    /// Export every table of the workspace.
    pub all_tables: bool,

    /// Write stitched container logs.
    pub stitch_logs: bool,

    /// Write stitched event logs.
    pub stitch_events: bool,

    /// Server-side wait budget per query, in seconds.
    #[validate(range(min = 1, max = 600, message = "query wait must be between 1 and 600 seconds"))]
    pub query_wait_secs: u64,

    /// Natural-language question; switches the run to query-generation mode.
    pub ai_query: Option<String>,

    /// Service endpoints.
    pub endpoints: Endpoints,
}

impl GatherConfig {
    /// Creates a configuration with defaults for everything but the workspace.
    #[must_use]
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            timespan: DEFAULT_TIMESPAN.to_string(),
            output: None,
            tables: None,
            profiles: None,
            all_tables: false,
            stitch_logs: true,
            stitch_events: true,
            query_wait_secs: DEFAULT_QUERY_WAIT_SECS,
            ai_query: None,
            endpoints: Endpoints::default(),
        }
    }

    /// Sets the lookback.
    #[must_use]
    pub fn with_timespan(mut self, timespan: impl Into<String>) -> Self {
        self.timespan = timespan.into();
        self
    }

    /// Sets the output archive path.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Sets the comma-separated table list.
    #[must_use]
    pub fn with_tables(mut self, tables: impl Into<String>) -> Self {
        self.tables = Some(tables.into());
        self
    }

    /// Sets the comma-separated profile list.
    #[must_use]
    pub fn with_profiles(mut self, profiles: impl Into<String>) -> Self {
        self.profiles = Some(profiles.into());
        self
    }

    /// Exports the whole workspace catalog.
    #[must_use]
    pub fn with_all_tables(mut self, all_tables: bool) -> Self {
        self.all_tables = all_tables;
        self
    }

    /// Enables or disables the two stitch outputs.
    #[must_use]
    pub fn with_stitching(mut self, logs: bool, events: bool) -> Self {
        self.stitch_logs = logs;
        self.stitch_events = events;
        self
    }

    /// Sets the wait budget in seconds.
    #[must_use]
    pub fn with_query_wait_secs(mut self, secs: u64) -> Self {
        self.query_wait_secs = secs;
        self
    }

    /// Switches to query-generation mode.
    #[must_use]
    pub fn with_ai_query(mut self, question: impl Into<String>) -> Self {
        self.ai_query = Some(question.into());
        self
    }

    /// Sets the service endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Returns the wait budget.
    #[must_use]
    pub fn query_wait(&self) -> Duration {
        Duration::from_secs(self.query_wait_secs)
    }

    /// Returns the target selection expressed by the table, profile and catalog flags.
    #[must_use]
    pub fn selection(&self) -> TargetSelection {
        TargetSelection::from_csv(
            self.tables.as_deref(),
            self.profiles.as_deref(),
            self.all_tables,
        )
    }

    /// Returns the output path, generating one from `started` when unset.
    #[must_use]
    pub fn output_path(&self, started: DateTime<Local>) -> PathBuf {
        self.output
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(default_output_name(started)))
    }
}

/// Returns `must-gather-YYYYmmdd-HHMMSS.tar.zst`.
#[must_use]
pub fn default_output_name(started: DateTime<Local>) -> String {
    format!("must-gather-{}.tar.zst", started.format("%Y%m%d-%H%M%S"))
}

/// Returns `ai-results-YYYYmmdd-HHMMSS`.
#[must_use]
pub fn ai_results_dir_name(started: DateTime<Local>) -> String {
    format!("ai-results-{}", started.format("%Y%m%d-%H%M%S"))
}
