//! Azure Resource Manager client for one Log Analytics workspace.

use super::{decode_error, trim_endpoint, DEFAULT_MANAGEMENT_ENDPOINT};
use crate::azure::WorkspaceResourceId;
use crate::credential::{TokenCredential, TokenScope};
use async_trait::async_trait;
use serde::Deserialize;
use shared::models::ExportTarget;
use shared::query::{CatalogError, TableCatalog};
use std::sync::Arc;

/// `Microsoft.OperationalInsights` API version used for every call.
pub const MANAGEMENT_API_VERSION: &str = "2022-10-01";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TablePage {
    #[serde(default)]
    value: Vec<TableEntry>,
    #[serde(default)]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct TableEntry {
    #[serde(default)]
    name: Option<String>,
}

/// Management-plane lookups: workspace GUID, table listing and table documents.
#[derive(Clone)]
pub struct ManagementClient {
    http: reqwest::Client,
    endpoint: String,
    workspace: WorkspaceResourceId,
    credential: Arc<dyn TokenCredential>,
}

impl ManagementClient {
    /// Creates a client for the given workspace.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        workspace: WorkspaceResourceId,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self {
            http,
            endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            workspace,
            credential,
        }
    }

    /// Overrides the management endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = trim_endpoint(endpoint);
        self
    }

    /// Returns the workspace this client targets.
    #[must_use]
    pub fn workspace(&self) -> &WorkspaceResourceId {
        &self.workspace
    }

    /// Looks up the workspace GUID (`properties.customerId`).
    ///
    /// Returns `Ok(None)` when the workspace document carries no GUID.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace cannot be fetched.
    pub async fn workspace_guid(&self) -> Result<Option<String>, CatalogError> {
        let url = self.url("");
        let document = self
            .get_json(&url)
            .await
            .map_err(|e| not_found_as(e, &self.workspace.workspace_name))?;
        Ok(document
            .pointer("/properties/customerId")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|guid| !guid.is_empty())
            .map(ToString::to_string))
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}{}{suffix}?api-version={MANAGEMENT_API_VERSION}",
            self.endpoint,
            self.workspace.resource_path()
        )
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, CatalogError> {
        let token = self
            .credential
            .token(TokenScope::Management)
            .await
            .map_err(|e| CatalogError::Unauthorized(e.to_string()))?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .timeout(super::MANAGEMENT_TIMEOUT)
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(url.to_string()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CatalogError::Unauthorized(decode_error(&text).full_message()));
        }
        if !status.is_success() {
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: decode_error(&text).full_message(),
            });
        }
        serde_json::from_str(&text).map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

fn not_found_as(err: CatalogError, name: &str) -> CatalogError {
    match err {
        CatalogError::NotFound(_) => CatalogError::NotFound(name.to_string()),
        other => other,
    }
}

impl std::fmt::Debug for ManagementClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementClient")
            .field("endpoint", &self.endpoint)
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TableCatalog for ManagementClient {
    async fn list_tables(&self) -> Result<Vec<ExportTarget>, CatalogError> {
        let mut tables = Vec::new();
        let mut next = Some(self.url("/tables"));
        while let Some(url) = next.take() {
            let page: TablePage = serde_json::from_value(self.get_json(&url).await?)
                .map_err(|e| CatalogError::Decode(e.to_string()))?;
            tables.extend(
                page.value
                    .into_iter()
                    .filter_map(|t| t.name)
                    .map(ExportTarget::from),
            );
            next = page.next_link.filter(|link| !link.is_empty());
        }
        tracing::debug!(tables = tables.len(), "Listed workspace tables");
        Ok(tables)
    }

    async fn table_schema(&self, table: &ExportTarget) -> Result<serde_json::Value, CatalogError> {
        let url = self.url(&format!("/tables/{table}"));
        self.get_json(&url)
            .await
            .map_err(|e| not_found_as(e, table.as_str()))
    }
}
