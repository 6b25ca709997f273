//! Metadata sources for the pipeline.
//!
//! Acquiring metadata from a dataset store is outside this crate; a source
//! only has to hand back the XML text as a `MetadataDocument`.
//!
//! ## Available Sources
//!
//! - `FileMetadataSource`: Reads an XML file; its directory becomes the base
//! - `StaticMetadataSource`: Text already in memory

use metadoc_template_core::MetadataDocument;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Failed to read metadata from '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata from '{0}' is empty")]
    Empty(String),

    #[error("Metadata source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the XML metadata document for one render.
pub trait MetadataSource: Send + Sync + Debug {
    fn fetch(&self) -> Result<MetadataDocument, AcquisitionError>;

    /// A short description for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct FileMetadataSource {
    path: PathBuf,
}

impl FileMetadataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataSource for FileMetadataSource {
    fn fetch(&self) -> Result<MetadataDocument, AcquisitionError> {
        let xml = std::fs::read_to_string(&self.path).map_err(|source| AcquisitionError::Read {
            path: self.path.display().to_string(),
            source,
        })?;
        if xml.trim().is_empty() {
            return Err(AcquisitionError::Empty(self.path.display().to_string()));
        }
        let document = MetadataDocument::new(xml);
        Ok(match self.path.parent() {
            Some(dir) => document.with_base(dir),
            None => document,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct StaticMetadataSource {
    document: MetadataDocument,
}

impl StaticMetadataSource {
    pub fn new(xml: impl Into<std::sync::Arc<str>>) -> Self {
        Self {
            document: MetadataDocument::new(xml),
        }
    }
}

impl From<MetadataDocument> for StaticMetadataSource {
    fn from(document: MetadataDocument) -> Self {
        Self { document }
    }
}

impl MetadataSource for StaticMetadataSource {
    fn fetch(&self) -> Result<MetadataDocument, AcquisitionError> {
        if self.document.xml().trim().is_empty() {
            return Err(AcquisitionError::Empty("static source".to_string()));
        }
        Ok(self.document.clone())
    }

    fn describe(&self) -> String {
        "static source".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_source_sets_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.xml");
        std::fs::write(&path, "<metadata/>").unwrap();

        let doc = FileMetadataSource::new(&path).fetch().unwrap();
        assert_eq!(doc.xml(), "<metadata/>");
        assert_eq!(doc.base(), Some(dir.path()));
    }

    #[test]
    fn test_missing_file_is_acquisition_error() {
        let err = FileMetadataSource::new("/no/such/meta.xml").fetch().unwrap_err();
        assert!(matches!(err, AcquisitionError::Read { .. }));
        assert!(err.to_string().contains("meta.xml"));
    }

    #[test]
    fn test_empty_static_source() {
        assert!(StaticMetadataSource::new("<m/>").fetch().is_ok());
        let err = StaticMetadataSource::new("  ").fetch().unwrap_err();
        assert!(matches!(err, AcquisitionError::Empty(_)));
    }
}
