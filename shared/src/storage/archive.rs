//! Tar archive sink compressed with zstd.

use super::sink::{check_relative, ArtifactSink, SinkError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Artifact sink that streams entries into a `.tar.zst` archive.
///
/// Entries are regular files with mode `0644` and the current time as mtime. The
/// archive is only valid after [`ArtifactSink::finish`].
pub struct TarArtifactSink<W: Write + Send> {
    builder: Option<tar::Builder<zstd::Encoder<'static, W>>>,
    location: PathBuf,
}

impl TarArtifactSink<BufWriter<File>> {
    /// Creates the archive file and its parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Create`] if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let create_err = |source| SinkError::Create {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(create_err)?;
        }
        let file = File::create(path).map_err(create_err)?;
        let mut sink = Self::from_writer(BufWriter::new(file)).map_err(|e| match e {
            SinkError::Create { source, .. } => create_err(source),
            other => other,
        })?;
        sink.location = path.to_path_buf();
        Ok(sink)
    }
}

impl<W: Write + Send> TarArtifactSink<W> {
    /// Wraps an arbitrary writer.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Create`] if the zstd encoder cannot be initialized.
    pub fn from_writer(writer: W) -> Result<Self, SinkError> {
        let encoder = zstd::Encoder::new(writer, DEFAULT_COMPRESSION_LEVEL).map_err(|source| {
            SinkError::Create {
                path: PathBuf::new(),
                source,
            }
        })?;
        Ok(Self {
            builder: Some(tar::Builder::new(encoder)),
            location: PathBuf::new(),
        })
    }

    /// Returns the archive path, empty for writer-backed sinks.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Finalizes the archive and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive was already finished or cannot be flushed.
    pub fn into_inner(mut self) -> Result<W, SinkError> {
        self.finish_inner()?.ok_or(SinkError::Closed)
    }

    fn finish_inner(&mut self) -> Result<Option<W>, SinkError> {
        let Some(builder) = self.builder.take() else {
            return Ok(None);
        };
        let encoder = builder.into_inner().map_err(SinkError::Finish)?;
        let mut writer = encoder.finish().map_err(SinkError::Finish)?;
        writer.flush().map_err(SinkError::Finish)?;
        Ok(Some(writer))
    }
}

impl<W: Write + Send> ArtifactSink for TarArtifactSink<W> {
    fn put(&mut self, path: &str, data: &[u8]) -> Result<(), SinkError> {
        check_relative(path)?;
        let builder = self.builder.as_mut().ok_or(SinkError::Closed)?;

        let mtime = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();

        builder
            .append_data(&mut header, path, data)
            .map_err(|source| SinkError::Write {
                path: path.to_string(),
                source,
            })
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.finish_inner().map(|_| ())
    }
}

impl<W: Write + Send> std::fmt::Debug for TarArtifactSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarArtifactSink")
            .field("location", &self.location)
            .field("open", &self.builder.is_some())
            .finish()
    }
}
