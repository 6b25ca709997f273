//! Destinations for rendered documents.

use std::fmt::{self, Debug};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Output writer is unavailable: {0}")]
    Unavailable(String),
}

/// Receives the final document text. Called at most once per render, and
/// only after every stage has succeeded.
pub trait OutputSink: Send + Sync + Debug {
    fn write(&self, text: &str) -> Result<(), SinkError>;

    fn describe(&self) -> String;
}

/// Writes to a file through a temporary file in the same directory, so the
/// destination is either replaced whole or left as it was.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl OutputSink for FileSink {
    fn write(&self, text: &str) -> Result<(), SinkError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        file.write_all(text.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| self.io_error(e))?;
        file.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        log::debug!("Wrote {} bytes to '{}'", text.len(), self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Writes to any `io::Write`, such as stdout or an in-memory buffer.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the writer, or `None` if a write panicked while holding it.
    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner().ok()
    }
}

impl<W> Debug for WriterSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterSink").finish_non_exhaustive()
    }
}

impl<W: Write + Send> OutputSink for WriterSink<W> {
    fn write(&self, text: &str) -> Result<(), SinkError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SinkError::Unavailable("writer lock poisoned".to_string()))?;
        writer
            .write_all(text.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|source| SinkError::Io {
                path: self.describe(),
                source,
            })
    }

    fn describe(&self) -> String {
        "writer".to_string()
    }
}
