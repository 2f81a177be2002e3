//! aks-must-gather collectors
//!
//! This crate connects the export core in `shared` to Azure: it parses workspace
//! ids, fetches bearer tokens, talks to the Log Analytics query and management
//! APIs, and drives complete runs.
//!
//! # Modules
//!
//! - [`azure`] - Workspace resource id parsing
//! - [`credential`] - Bearer token sources
//! - [`client`] - HTTP clients for the query and management APIs
//! - [`backend`] - Workspace backends (Azure and in-memory)
//! - [`config`] - Run configuration
//! - [`gatherer`] - Table export runs
//! - [`ai`] - Query-generation mode
//! - [`error`] - Run errors
//!
//! # Example
//!
//! ```no_run
//! use gather::{AzureWorkspace, Endpoints, GatherConfig, Gatherer, StaticTokenCredential};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatherConfig::new(
//!     "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.OperationalInsights/workspaces/ws",
//! )
//! .with_timespan("PT6H")
//! .with_profiles("podLogs");
//!
//! let backend = AzureWorkspace::new(Endpoints::default(), Arc::new(StaticTokenCredential::from_env()))?;
//! let report = Gatherer::new(config, Arc::new(backend)).run().await?;
//! println!("wrote {}", report.output.display());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ai;
pub mod azure;
pub mod backend;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod gatherer;

pub use azure::{ResourceIdError, WorkspaceResourceId};
pub use backend::{AzureWorkspace, InMemoryWorkspace, WorkspaceBackend};
pub use config::{Endpoints, GatherConfig};
pub use credential::{CredentialError, StaticTokenCredential, TokenCredential, TokenScope};
pub use error::GatherError;
pub use gatherer::{Gatherer, ResolvedWorkspace, RunReport};
