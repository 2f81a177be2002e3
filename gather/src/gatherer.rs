//! Run orchestration.
//!
//! A [`Gatherer`] turns a [`GatherConfig`] into one archive: it resolves the
//! workspace, decides the targets, writes the metadata documents, runs the
//! [`TableExporter`], flushes the stitched logs and finishes with `index.json`.

use crate::azure::WorkspaceResourceId;
use crate::backend::WorkspaceBackend;
use crate::config::GatherConfig;
use crate::error::GatherError;
use chrono::{DateTime, Local, Utc};
use shared::config::{resolve_targets, ProfileRegistry, Timespan};
use shared::export::{ExportOptions, ExportReport, TableExporter};
use shared::models::{ExportTarget, IndexManifest, WorkspaceMetadata};
use shared::query::{QuerySource, TableCatalog, WindowPlan};
use shared::stitch::{FlushStats, StitchAccumulator};
use shared::storage::{
    put_json, ArtifactSink, TarArtifactSink, AZURE_METADATA_PATH, INDEX_PATH,
    WORKSPACE_METADATA_PATH,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use validator::Validate;

/// A validated workspace and lookback.
#[derive(Debug, Clone)]
pub struct ResolvedWorkspace {
    /// Parsed lookback.
    pub timespan: Timespan,
    /// Parsed workspace id.
    pub workspace: WorkspaceResourceId,
    /// Workspace GUID used by the query endpoint.
    pub workspace_guid: String,
}

/// Everything resolved before the first artifact is written.
pub struct PreparedRun {
    /// Parsed lookback.
    pub timespan: Timespan,
    /// Parsed workspace id.
    pub workspace: WorkspaceResourceId,
    /// Workspace GUID used by the query endpoint.
    pub workspace_guid: String,
    /// Ordered, duplicate-free targets.
    pub targets: Vec<ExportTarget>,
    /// Catalog used for schema documents.
    pub catalog: Arc<dyn TableCatalog>,
    /// Query source bound to the workspace.
    pub source: Arc<dyn QuerySource>,
}

impl std::fmt::Debug for PreparedRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedRun")
            .field("timespan", &self.timespan)
            .field("workspace", &self.workspace)
            .field("workspace_guid", &self.workspace_guid)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunReport {
    /// Where the archive was written. Empty for caller-supplied sinks.
    pub output: PathBuf,
    /// Resolved targets, as written to `index.json`.
    pub targets: Vec<ExportTarget>,
    /// Per-target export outcome.
    pub export: ExportReport,
    /// Stitched files written.
    pub stitched: FlushStats,
}

/// Drives one gather run.
pub struct Gatherer {
    config: GatherConfig,
    backend: Arc<dyn WorkspaceBackend>,
    registry: ProfileRegistry,
    cancel: CancellationToken,
}

impl Gatherer {
    /// Creates a gatherer with the builtin profiles.
    #[must_use]
    pub fn new(config: GatherConfig, backend: Arc<dyn WorkspaceBackend>) -> Self {
        Self {
            config,
            backend,
            registry: ProfileRegistry::builtin(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the profile registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ProfileRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Stops the run when the token is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &GatherConfig {
        &self.config
    }

    /// Returns the workspace backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn WorkspaceBackend> {
        &self.backend
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Validates the configuration, parses the timespan and workspace id, and
    /// looks up the workspace GUID. The lookback must be plannable from now.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any input is invalid or the workspace
    /// cannot be resolved.
    pub async fn resolve_workspace(&self) -> Result<ResolvedWorkspace, GatherError> {
        self.config.validate()?;
        let timespan = Timespan::parse(&self.config.timespan)?;
        WindowPlan::new(timespan.duration(), Utc::now())?;
        let workspace: WorkspaceResourceId = self.config.workspace_id.parse()?;

        let workspace_guid = self
            .backend
            .workspace_guid(&workspace)
            .await
            .map_err(GatherError::WorkspaceLookup)?
            .ok_or(GatherError::MissingWorkspaceGuid)?;
        tracing::info!(workspace = %workspace.workspace_name, guid = %workspace_guid, "Resolved workspace");

        Ok(ResolvedWorkspace {
            timespan,
            workspace,
            workspace_guid,
        })
    }

    /// Validates the configuration and resolves the workspace and targets.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any input is invalid, the workspace
    /// cannot be looked up or has no GUID, or the catalog listing fails with
    /// `all_tables` set.
    pub async fn prepare(&self) -> Result<PreparedRun, GatherError> {
        let ResolvedWorkspace {
            timespan,
            workspace,
            workspace_guid,
        } = self.resolve_workspace().await?;

        let catalog = self.backend.catalog(&workspace);
        let selection = self.config.selection();
        let listing = if selection.all_tables && selection.tables.is_empty() {
            Some(
                catalog
                    .list_tables()
                    .await
                    .map_err(GatherError::CatalogListing)?,
            )
        } else {
            None
        };
        let resolution = resolve_targets(&selection, &self.registry, listing.as_deref());
        if resolution.targets.is_empty() {
            tracing::warn!("No tables resolved; the archive will only carry metadata");
        }

        Ok(PreparedRun {
            timespan,
            source: self.backend.query_source(&workspace_guid),
            workspace,
            workspace_guid,
            targets: resolution.targets,
            catalog,
        })
    }

    /// Runs the export into a `.tar.zst` archive at the configured path.
    ///
    /// The archive is finalized even when the export stops early.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration, when the archive cannot be
    /// created or written, or when the run is cancelled.
    pub async fn run(&self) -> Result<RunReport, GatherError> {
        let prepared = self.prepare().await?;
        let output = self.config.output_path(Local::now());
        let mut sink = TarArtifactSink::create(&output)?;

        let result = self.export_prepared(&prepared, &mut sink).await;
        let finished = sink.finish();
        let mut report = result?;
        finished?;

        report.output = output;
        tracing::info!(path = %report.output.display(), "Wrote archive");
        Ok(report)
    }

    /// Runs the export into a caller-supplied sink. The sink is not finished.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run), minus archive creation.
    pub async fn run_into(&self, sink: &mut dyn ArtifactSink) -> Result<RunReport, GatherError> {
        let prepared = self.prepare().await?;
        self.export_prepared(&prepared, sink).await
    }

    async fn export_prepared(
        &self,
        prepared: &PreparedRun,
        sink: &mut dyn ArtifactSink,
    ) -> Result<RunReport, GatherError> {
        let now = Utc::now();
        self.write_metadata(prepared, now, sink)?;

        let exporter = TableExporter::new(
            prepared.source.clone(),
            ExportOptions::new(prepared.timespan.clone()).with_wait(self.config.query_wait()),
        )
        .with_catalog(prepared.catalog.clone())
        .with_cancellation(self.cancel.clone());

        let stitch_logs = self.config.stitch_logs;
        let mut acc = StitchAccumulator::new(stitch_logs, stitch_logs && self.config.stitch_events);
        let export = exporter
            .export_all(&prepared.targets, now, sink, &mut acc)
            .await?;

        let stitched = if stitch_logs {
            acc.flush(sink)?
        } else {
            FlushStats::default()
        };

        put_json(
            sink,
            INDEX_PATH,
            &IndexManifest {
                tables: prepared.targets.clone(),
            },
        )?;

        Ok(RunReport {
            output: PathBuf::new(),
            targets: prepared.targets.clone(),
            export,
            stitched,
        })
    }

    fn write_metadata(
        &self,
        prepared: &PreparedRun,
        now: DateTime<Utc>,
        sink: &mut dyn ArtifactSink,
    ) -> Result<(), GatherError> {
        let metadata = WorkspaceMetadata::for_export(
            now,
            &prepared.workspace_guid,
            &self.config.workspace_id,
            prepared.timespan.iso(),
            prepared.targets.len(),
        );
        put_json(sink, WORKSPACE_METADATA_PATH, &metadata)?;
        put_json(sink, AZURE_METADATA_PATH, &prepared.workspace.identity())?;
        Ok(())
    }
}

impl std::fmt::Debug for Gatherer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatherer")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
