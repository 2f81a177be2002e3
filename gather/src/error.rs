//! Run-level errors.

use crate::ai::{GeneratorError, QueryValidationError};
use crate::azure::ResourceIdError;
use shared::config::TimespanError;
use shared::export::ExportError;
use shared::query::{CatalogError, PlanError, QueryError};
use shared::storage::SinkError;
use thiserror::Error;

/// Errors that end a run with a non-zero outcome.
///
/// Per-window and per-target failures never surface here; the exporter logs and
/// swallows them.
#[derive(Debug, Error)]
pub enum GatherError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] validator::ValidationErrors),

    /// The timespan could not be parsed.
    #[error("invalid timespan: {0}")]
    InvalidTimespan(#[from] TimespanError),

    /// The workspace resource id could not be parsed.
    #[error("parse workspace-id: {0}")]
    InvalidResourceId(#[from] ResourceIdError),

    /// A required input is missing or inconsistent.
    #[error("{0}")]
    Configuration(String),

    /// The workspace could not be looked up.
    #[error("get workspace: {0}")]
    WorkspaceLookup(#[source] CatalogError),

    /// The workspace was found but carries no GUID.
    #[error("could not determine workspace GUID from workspace; check permissions or workspace-id")]
    MissingWorkspaceGuid,

    /// Listing the workspace tables failed.
    #[error("list tables: {0}")]
    CatalogListing(#[source] CatalogError),

    /// Creating or writing the output failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The lookback could not be planned.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The run was interrupted.
    #[error("run cancelled")]
    Cancelled,

    /// The query generator failed.
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// A generated query was rejected.
    #[error(transparent)]
    QueryValidation(#[from] QueryValidationError),

    /// A generated query could not be executed.
    #[error("execute query: {0}")]
    Query(#[from] QueryError),

    /// Writing results to the terminal failed.
    #[error("write output: {0}")]
    Output(#[from] std::io::Error),
}

impl From<ExportError> for GatherError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Plan(e) => Self::Plan(e),
            ExportError::Sink(e) => Self::Sink(e),
            ExportError::Cancelled => Self::Cancelled,
        }
    }
}

impl GatherError {
    /// Returns true for errors raised before any export began.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::InvalidTimespan(_)
                | Self::InvalidResourceId(_)
                | Self::Configuration(_)
                | Self::WorkspaceLookup(_)
                | Self::MissingWorkspaceGuid
                | Self::CatalogListing(_)
                | Self::Plan(_)
        )
    }
}
