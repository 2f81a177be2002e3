//! Export targets and the JSON documents written alongside exported data.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Identifier naming one queryable table to export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportTarget(String);

impl ExportTarget {
    /// Creates a new export target.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the target identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExportTarget {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExportTarget {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ExportTarget {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Per-target aggregate written as `tables/<target>/summary.json`.
///
/// `rows` counts only rows that were serialized into part files; windows whose
/// query failed contribute nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// The exported target.
    pub table: ExportTarget,
    /// Total rows written across all windows.
    pub rows: u64,
    /// Requested lookback as an ISO-8601 duration.
    pub duration: String,
}

/// Run-level descriptor written as `metadata/workspace.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMetadata {
    /// When the run started, RFC 3339 with nanoseconds.
    pub generated_at: String,
    /// Resolved workspace GUID used by the query endpoint.
    #[serde(rename = "workspaceGUID")]
    pub workspace_guid: String,
    /// Workspace resource id as supplied by the user.
    #[serde(rename = "workspaceID")]
    pub workspace_id: String,
    /// Requested lookback as an ISO-8601 duration.
    pub timespan: String,
    /// Number of resolved export targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables_count: Option<usize>,
    /// Set when the run was driven by a generated query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_mode: Option<bool>,
    /// Natural-language question behind a generated query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_query: Option<String>,
    /// The generated query that was executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kql_query: Option<String>,
}

impl WorkspaceMetadata {
    /// Creates the descriptor for a table export run.
    #[must_use]
    pub fn for_export(
        generated_at: DateTime<Utc>,
        workspace_guid: impl Into<String>,
        workspace_id: impl Into<String>,
        timespan: impl Into<String>,
        tables_count: usize,
    ) -> Self {
        Self {
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            workspace_guid: workspace_guid.into(),
            workspace_id: workspace_id.into(),
            timespan: timespan.into(),
            tables_count: Some(tables_count),
            ai_mode: None,
            user_query: None,
            kql_query: None,
        }
    }

    /// Marks the descriptor as produced by a generated query.
    #[must_use]
    pub fn with_generated_query(
        mut self,
        user_query: impl Into<String>,
        kql_query: impl Into<String>,
    ) -> Self {
        self.tables_count = None;
        self.ai_mode = Some(true);
        self.user_query = Some(user_query.into());
        self.kql_query = Some(kql_query.into());
        self
    }
}

/// Management-plane identity triple written as `metadata/azure.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementIdentity {
    /// Subscription id.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Workspace name.
    pub workspace_name: String,
}

/// Global index written as `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Every resolved target, in resolution order.
    pub tables: Vec<ExportTarget>,
}
