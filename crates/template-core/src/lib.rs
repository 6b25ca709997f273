//! Core abstractions for stylesheet compilation and execution
//!
//! This crate defines the contract between stylesheet compilers (the XSLT
//! subset in `metadoc-xslt`, or any other engine) and the rendering
//! pipeline.
//!
//! ## Key Abstractions
//!
//! - **`StylesheetCompiler`**: Turns stylesheet source into a compiled artifact
//! - **`CompiledStylesheet`**: Reusable program, executed once per document
//! - **`ImportResolver`**: Loads `xsl:import`/`xsl:include` targets
//! - **`ExtensionNamespaceBinding`**: Callback namespaces visible to a run
//! - **`MetadataDocument`** / **`TransformResult`**: Input and raw output

mod extension;

pub use extension::{
    ExtensionBinding, ExtensionNamespaceBinding, METADATA_NAMESPACE, METADATA_RES_NAMESPACE,
};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while compiling or executing a stylesheet.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to load stylesheet '{locator}': {message}")]
    StylesheetLoad { locator: String, message: String },

    #[error("Failed to resolve import '{href}': {message}")]
    Import { href: String, message: String },

    #[error("Transform execution failed: {0}")]
    TransformExecution(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// An XML metadata document handed to the pipeline by an external source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDocument {
    xml: Arc<str>,
    base: Option<PathBuf>,
}

impl MetadataDocument {
    pub fn new(xml: impl Into<Arc<str>>) -> Self {
        Self {
            xml: xml.into(),
            base: None,
        }
    }

    /// Attach the directory the document came from. Relative stylesheet
    /// imports resolve against it when the stylesheet has no directory of
    /// its own.
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn base(&self) -> Option<&Path> {
        self.base.as_deref()
    }
}

/// Where a stylesheet comes from. Its identity is part of the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StylesheetLocator {
    /// A stylesheet file. Relative imports resolve against its directory.
    Path(PathBuf),
    /// Stylesheet text supplied directly, named by `id` for diagnostics.
    /// Relative imports resolve against the policy's fallback base.
    Inline { id: String, source: Arc<str> },
}

impl StylesheetLocator {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        StylesheetLocator::Path(path.into())
    }

    pub fn inline(id: impl Into<String>, source: impl Into<Arc<str>>) -> Self {
        StylesheetLocator::Inline {
            id: id.into(),
            source: source.into(),
        }
    }

    /// Reads the stylesheet text.
    pub fn read_source(&self) -> Result<Arc<str>, TemplateError> {
        match self {
            StylesheetLocator::Path(path) => std::fs::read_to_string(path)
                .map(Arc::from)
                .map_err(|e| TemplateError::StylesheetLoad {
                    locator: path.display().to_string(),
                    message: e.to_string(),
                }),
            StylesheetLocator::Inline { source, .. } => Ok(Arc::clone(source)),
        }
    }

    /// The contextual base for relative imports, if the locator has one.
    pub fn base_dir(&self) -> Option<&Path> {
        match self {
            StylesheetLocator::Path(path) => path.parent(),
            StylesheetLocator::Inline { .. } => None,
        }
    }
}

impl fmt::Display for StylesheetLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StylesheetLocator::Path(path) => write!(f, "{}", path.display()),
            StylesheetLocator::Inline { id, .. } => write!(f, "inline:{}", id),
        }
    }
}

/// How relative imports inside a stylesheet are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportPolicy {
    /// Used when neither the importing stylesheet nor the caller supplies a base.
    pub fallback_base: PathBuf,
    /// Reject absolute hrefs and hrefs that climb out of the base directory.
    pub confine_to_base: bool,
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self {
            fallback_base: PathBuf::from("."),
            confine_to_base: false,
        }
    }
}

impl ImportPolicy {
    pub fn with_fallback_base(base: impl Into<PathBuf>) -> Self {
        Self {
            fallback_base: base.into(),
            ..Default::default()
        }
    }

    pub fn confined(mut self, confine: bool) -> Self {
        self.confine_to_base = confine;
        self
    }
}

/// The text of an imported stylesheet together with where it was found.
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub path: PathBuf,
    pub source: String,
}

/// Loads stylesheets referenced by `xsl:import` and `xsl:include`.
pub trait ImportResolver: Send + Sync {
    /// Resolve `href` against `base` (the importing stylesheet's directory),
    /// or against the resolver's fallback when `base` is `None`.
    fn resolve(&self, href: &str, base: Option<&Path>) -> Result<ResolvedImport, TemplateError>;
}

/// Raw text produced by executing a compiled stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult(String);

impl TransformResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for TransformResult {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// A reusable, document-agnostic, compiled stylesheet.
pub trait CompiledStylesheet: Send + Sync + fmt::Debug {
    /// Apply the program to `document`, routing extension calls through `binding`.
    ///
    /// Must be deterministic: equal inputs give byte-identical output.
    fn execute(
        &self,
        document: &MetadataDocument,
        binding: &ExtensionNamespaceBinding,
    ) -> Result<TransformResult, TemplateError>;

    /// The locator this program was compiled from.
    fn locator(&self) -> &StylesheetLocator;

    /// Namespace URIs of extension functions referenced by the program.
    fn extension_namespaces(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Compiles stylesheet source into a `CompiledStylesheet`.
pub trait StylesheetCompiler: Send + Sync {
    fn compile(
        &self,
        source: &str,
        locator: &StylesheetLocator,
        imports: &dyn ImportResolver,
    ) -> Result<Arc<dyn CompiledStylesheet>, TemplateError>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_locator_reads_its_own_source() {
        let locator = StylesheetLocator::inline("t", "<xsl:stylesheet/>");
        assert_eq!(&*locator.read_source().unwrap(), "<xsl:stylesheet/>");
        assert!(locator.base_dir().is_none());
        assert_eq!(locator.to_string(), "inline:t");
    }

    #[test]
    fn test_missing_path_locator_is_a_load_error() {
        let locator = StylesheetLocator::path("/definitely/not/here.xsl");
        let err = locator.read_source().unwrap_err();
        assert!(matches!(err, TemplateError::StylesheetLoad { .. }));
        assert!(err.to_string().contains("here.xsl"));
    }

    #[test]
    fn test_locator_identity_includes_source() {
        let a = StylesheetLocator::inline("t", "one");
        let b = StylesheetLocator::inline("t", "two");
        assert_ne!(a, b);
        assert_eq!(a, StylesheetLocator::inline("t", "one"));
    }

    #[test]
    fn test_metadata_document_base() {
        let doc = MetadataDocument::new("<meta/>").with_base("/data");
        assert_eq!(doc.xml(), "<meta/>");
        assert_eq!(doc.base(), Some(Path::new("/data")));
    }
}
