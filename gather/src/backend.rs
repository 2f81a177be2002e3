//! Workspace backends.
//!
//! A [`WorkspaceBackend`] hands the gatherer everything it needs to talk to one
//! workspace: the GUID lookup, the table catalog and a query source.

use crate::azure::WorkspaceResourceId;
use crate::client::{LogAnalyticsClient, ManagementClient};
use crate::config::Endpoints;
use crate::credential::TokenCredential;
use async_trait::async_trait;
use shared::query::{CatalogError, InMemoryCatalog, InMemoryQuerySource, QuerySource, TableCatalog};
use std::sync::Arc;

/// Trait for workspace backends.
#[async_trait]
pub trait WorkspaceBackend: Send + Sync {
    /// Resolves the workspace GUID used by the query endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace cannot be looked up.
    async fn workspace_guid(
        &self,
        workspace: &WorkspaceResourceId,
    ) -> Result<Option<String>, CatalogError>;

    /// Returns the table catalog of the workspace.
    fn catalog(&self, workspace: &WorkspaceResourceId) -> Arc<dyn TableCatalog>;

    /// Returns a query source bound to the workspace GUID.
    fn query_source(&self, workspace_guid: &str) -> Arc<dyn QuerySource>;
}

/// Backend talking to Azure over HTTPS.
#[derive(Clone)]
pub struct AzureWorkspace {
    http: reqwest::Client,
    endpoints: Endpoints,
    credential: Arc<dyn TokenCredential>,
}

impl AzureWorkspace {
    /// Creates a backend with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoints: Endpoints,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("aks-must-gather/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoints,
            credential,
        })
    }

    fn management(&self, workspace: &WorkspaceResourceId) -> ManagementClient {
        ManagementClient::new(self.http.clone(), workspace.clone(), self.credential.clone())
            .with_endpoint(&self.endpoints.management)
    }
}

impl std::fmt::Debug for AzureWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureWorkspace")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WorkspaceBackend for AzureWorkspace {
    async fn workspace_guid(
        &self,
        workspace: &WorkspaceResourceId,
    ) -> Result<Option<String>, CatalogError> {
        self.management(workspace).workspace_guid().await
    }

    fn catalog(&self, workspace: &WorkspaceResourceId) -> Arc<dyn TableCatalog> {
        Arc::new(self.management(workspace))
    }

    fn query_source(&self, workspace_guid: &str) -> Arc<dyn QuerySource> {
        Arc::new(
            LogAnalyticsClient::new(self.http.clone(), workspace_guid, self.credential.clone())
                .with_endpoint(&self.endpoints.logs),
        )
    }
}

/// In-memory backend for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkspace {
    guid: Option<String>,
    lookup_error: Option<String>,
    catalog: InMemoryCatalog,
    source: InMemoryQuerySource,
}

impl InMemoryWorkspace {
    /// Creates a backend whose workspace has the given GUID.
    #[must_use]
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: Some(guid.into()),
            ..Self::default()
        }
    }

    /// Creates a backend whose workspace document carries no GUID.
    #[must_use]
    pub fn without_guid() -> Self {
        Self::default()
    }

    /// Makes the workspace lookup fail.
    #[must_use]
    pub fn with_lookup_error(mut self, message: impl Into<String>) -> Self {
        self.lookup_error = Some(message.into());
        self
    }

    /// Sets the table catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: InMemoryCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Sets the query source.
    #[must_use]
    pub fn with_source(mut self, source: InMemoryQuerySource) -> Self {
        self.source = source;
        self
    }

    /// Returns the query source, sharing its request log.
    #[must_use]
    pub fn source(&self) -> &InMemoryQuerySource {
        &self.source
    }
}

#[async_trait]
impl WorkspaceBackend for InMemoryWorkspace {
    async fn workspace_guid(
        &self,
        _workspace: &WorkspaceResourceId,
    ) -> Result<Option<String>, CatalogError> {
        match &self.lookup_error {
            Some(message) => Err(CatalogError::Api {
                status: 403,
                message: message.clone(),
            }),
            None => Ok(self.guid.clone()),
        }
    }

    fn catalog(&self, _workspace: &WorkspaceResourceId) -> Arc<dyn TableCatalog> {
        Arc::new(self.catalog.clone())
    }

    fn query_source(&self, _workspace_guid: &str) -> Arc<dyn QuerySource> {
        Arc::new(self.source.clone())
    }
}
