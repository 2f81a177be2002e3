//! Log Analytics data-plane client.

use super::{decode_error, trim_endpoint, DEFAULT_LOGS_ENDPOINT};
use crate::credential::{TokenCredential, TokenScope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::ResultTable;
use shared::query::{QueryError, QueryRequest, QueryResponse, QuerySource};
use std::sync::Arc;
use std::time::Duration;

/// Client-side slack on top of the server-side wait budget.
pub const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    timespan: String,
}

#[derive(Deserialize)]
struct QueryResults {
    #[serde(default)]
    tables: Vec<ResultTable>,
    #[serde(default)]
    error: Option<super::ErrorDetail>,
}

/// Runs queries against one workspace through the Log Analytics REST API.
///
/// Every window becomes `POST {endpoint}/v1/workspaces/{guid}/query` with the
/// window as the request timespan and the wait budget as a `Prefer: wait=N` header.
#[derive(Clone)]
pub struct LogAnalyticsClient {
    http: reqwest::Client,
    endpoint: String,
    workspace_guid: String,
    credential: Arc<dyn TokenCredential>,
}

impl LogAnalyticsClient {
    /// Creates a client for the workspace with the given GUID.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        workspace_guid: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Self {
        Self {
            http,
            endpoint: DEFAULT_LOGS_ENDPOINT.to_string(),
            workspace_guid: workspace_guid.into(),
            credential,
        }
    }

    /// Overrides the data-plane endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = trim_endpoint(endpoint);
        self
    }

    /// Returns the workspace GUID queries run against.
    #[must_use]
    pub fn workspace_guid(&self) -> &str {
        &self.workspace_guid
    }

    fn query_url(&self) -> String {
        format!("{}/v1/workspaces/{}/query", self.endpoint, self.workspace_guid)
    }
}

impl std::fmt::Debug for LogAnalyticsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogAnalyticsClient")
            .field("endpoint", &self.endpoint)
            .field("workspace_guid", &self.workspace_guid)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QuerySource for LogAnalyticsClient {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let token = self
            .credential
            .token(TokenScope::LogAnalytics)
            .await
            .map_err(|e| QueryError::Unauthorized(e.to_string()))?;

        let body = QueryBody {
            query: &request.query,
            timespan: request.window.to_interval(),
        };
        let response = self
            .http
            .post(self.query_url())
            .bearer_auth(token)
            .header("Prefer", format!("wait={}", request.wait.as_secs()))
            .timeout(request.wait + REQUEST_TIMEOUT_MARGIN)
            .json(&body)
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        if !status.is_success() {
            let detail = decode_error(&text);
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(QueryError::Unauthorized(detail.full_message()));
            }
            return Err(QueryError::Api {
                status: status.as_u16(),
                code: detail.code_chain(),
                message: detail.full_message(),
            });
        }

        let results: QueryResults =
            serde_json::from_str(&text).map_err(|e| QueryError::Decode(e.to_string()))?;
        let mut response = QueryResponse::new(results.tables);
        if let Some(error) = results.error {
            response = response.with_partial_error(format!(
                "{}: {}",
                error.code_chain(),
                error.full_message()
            ));
        }
        Ok(response)
    }
}
