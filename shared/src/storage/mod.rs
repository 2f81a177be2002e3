//! Artifact storage.
//!
//! The exporter writes everything it produces through the [`ArtifactSink`] trait.
//! Implementations keep artifacts in memory (tests), as plain files
//! ([`DirectoryArtifactSink`]) or in a zstd-compressed tar archive
//! ([`TarArtifactSink`]). [`naming`] holds the archive layout.

pub mod archive;
pub mod naming;
pub mod sink;

pub use archive::TarArtifactSink;
pub use naming::{sanitize, AZURE_METADATA_PATH, INDEX_PATH, WORKSPACE_METADATA_PATH};
pub use sink::{put_json, ArtifactSink, DirectoryArtifactSink, InMemoryArtifactSink, SinkError};
