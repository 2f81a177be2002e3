//! Artifact sinks.
//!
//! An [`ArtifactSink`] durably stores named byte payloads. The exporter never
//! reads back what it wrote, so a sink only needs `put` and `finish`.

use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while storing artifacts.
///
/// Every sink error is fatal for a run.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The artifact store could not be created.
    #[error("failed to create artifact store at {path}: {source}")]
    Create {
        /// Location of the store.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An artifact could not be written.
    #[error("failed to write artifact {path}: {source}")]
    Write {
        /// Artifact path inside the store.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An artifact could not be serialized.
    #[error("failed to serialize artifact {path}: {source}")]
    Serialize {
        /// Artifact path inside the store.
        path: String,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The artifact path is absolute or escapes the store.
    #[error("invalid artifact path: {0}")]
    InvalidPath(String),

    /// The store could not be finalized.
    #[error("failed to finalize artifact store: {0}")]
    Finish(#[source] io::Error),

    /// The store was already finalized.
    #[error("artifact store is closed")]
    Closed,
}

/// Trait for artifact stores.
pub trait ArtifactSink: Send {
    /// Stores one artifact under a relative, `/`-separated path.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload could not be stored.
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), SinkError>;

    /// Finalizes the store. Further writes fail with [`SinkError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if buffered data could not be flushed.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: ArtifactSink + ?Sized> ArtifactSink for Box<S> {
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), SinkError> {
        (**self).put(path, data)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// Serializes `value` as pretty JSON and stores it.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn put_json<T: Serialize + ?Sized>(
    sink: &mut dyn ArtifactSink,
    path: &str,
    value: &T,
) -> Result<(), SinkError> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| SinkError::Serialize {
        path: path.to_string(),
        source,
    })?;
    sink.put(path, &data)
}

/// Rejects absolute paths and paths containing `..`.
pub(crate) fn check_relative(path: &str) -> Result<&Path, SinkError> {
    let relative = Path::new(path);
    let valid = !path.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if valid {
        Ok(relative)
    } else {
        Err(SinkError::InvalidPath(path.to_string()))
    }
}

/// In-memory artifact sink.
///
/// Keeps artifacts in insertion order. Writing a path twice replaces the payload
/// but keeps the original position.
///
/// # Example
///
/// ```
/// use shared::storage::{ArtifactSink, InMemoryArtifactSink};
///
/// let mut sink = InMemoryArtifactSink::new();
/// sink.put("index.json", b"{}").unwrap();
/// assert_eq!(sink.get("index.json"), Some(&b"{}"[..]));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryArtifactSink {
    entries: Vec<(String, Vec<u8>)>,
    positions: HashMap<String, usize>,
    finished: bool,
}

impl InMemoryArtifactSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the payload stored under `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.positions
            .get(path)
            .map(|&i| self.entries[i].1.as_slice())
    }

    /// Returns the payload stored under `path` as UTF-8 text.
    #[must_use]
    pub fn get_text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|data| std::str::from_utf8(data).ok())
    }

    /// Returns the payload stored under `path` parsed as JSON.
    #[must_use]
    pub fn get_json(&self, path: &str) -> Option<serde_json::Value> {
        self.get(path)
            .and_then(|data| serde_json::from_slice(data).ok())
    }

    /// Returns all paths in insertion order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|(p, _)| p.as_str()).collect()
    }

    /// Returns all paths starting with `prefix`, in insertion order.
    #[must_use]
    pub fn paths_under(&self, prefix: &str) -> Vec<&str> {
        self.entries
            .iter()
            .map(|(p, _)| p.as_str())
            .filter(|p| p.starts_with(prefix))
            .collect()
    }

    /// Returns the number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true once [`ArtifactSink::finish`] was called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl ArtifactSink for InMemoryArtifactSink {
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), SinkError> {
        if self.finished {
            return Err(SinkError::Closed);
        }
        check_relative(path)?;
        match self.positions.get(path) {
            Some(&i) => self.entries[i].1 = data.to_vec(),
            None => {
                self.positions.insert(path.to_string(), self.entries.len());
                self.entries.push((path.to_string(), data.to_vec()));
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.finished = true;
        Ok(())
    }
}

/// Artifact sink writing plain files below a root directory.
#[derive(Debug)]
pub struct DirectoryArtifactSink {
    root: PathBuf,
    finished: bool,
}

impl DirectoryArtifactSink {
    /// Creates the root directory (and parents) and returns a sink writing into it.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Create`] if the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| SinkError::Create {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            finished: false,
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSink for DirectoryArtifactSink {
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), SinkError> {
        if self.finished {
            return Err(SinkError::Closed);
        }
        let target = self.root.join(check_relative(path)?);
        let write = || -> io::Result<()> {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, data)
        };
        write().map_err(|source| SinkError::Write {
            path: path.to_string(),
            source,
        })
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.finished = true;
        Ok(())
    }
}
