//! aks-must-gather Shared Library
//!
//! This crate contains the core of aks-must-gather: it splits a lookback into
//! query windows, exports tables window by window and stitches container logs
//! and cluster events into per-entity files.
//!
//! # Modules
//!
//! - [`models`] - Cells, rows, windows and the JSON documents of an export
//! - [`config`] - Timespan parsing and the profile registry
//! - [`query`] - Window planning, query source and table catalog traits
//! - [`storage`] - Artifact sinks and archive naming
//! - [`stitch`] - Row classification and stitched log buffers
//! - [`export`] - The per-target, per-window export loop
//!
//! # Example
//!
//! ```
//! use shared::config::{resolve_targets, ProfileRegistry, TargetSelection};
//!
//! let registry = ProfileRegistry::builtin();
//! let selection = TargetSelection::from_csv(None, Some("podLogs,aks-debug"), false);
//! let resolution = resolve_targets(&selection, &registry, None);
//!
//! assert_eq!(resolution.targets.len(), 16);
//! assert!(resolution.unknown_profiles.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod export;
pub mod models;
pub mod query;
pub mod stitch;
pub mod storage;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio_util;
