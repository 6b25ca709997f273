//! Renders XML dataset metadata into localized HTML.
//!
//! A metadata document is transformed by a cached stylesheet that calls back
//! into resource-string providers, then leftover placeholder tokens are
//! localized and the markup is finalized before it is written out.

pub mod cache;
pub mod error;
pub mod localize;
pub mod pipeline;
pub mod postprocess;
pub mod sink;
pub mod source;

pub use cache::StylesheetCache;
pub use error::{PipelineError, PipelineStage};
pub use localize::{LocalizationResolver, LocalizeError, Localized, UnresolvedPolicy};
pub use pipeline::{
    DocumentPipeline, PipelineBuilder, RenderConfig, RenderReport, RenderedDocument,
};
pub use postprocess::finalize;
pub use sink::{FileSink, OutputSink, SinkError, WriterSink};
pub use source::{AcquisitionError, FileMetadataSource, MetadataSource, StaticMetadataSource};

pub use metadoc_executor::{ExecutorImpl, SyncExecutor};
#[cfg(feature = "rayon-executor")]
pub use metadoc_executor::RayonExecutor;
pub use metadoc_resource::{FilesystemImportResolver, JsonResourceTable};
pub use metadoc_template_core::{
    CompiledStylesheet, ExtensionBinding, ExtensionNamespaceBinding, ImportPolicy,
    METADATA_NAMESPACE, METADATA_RES_NAMESPACE, MetadataDocument, StylesheetCompiler,
    StylesheetLocator, TemplateError, TransformResult,
};
pub use metadoc_traits::{InMemoryResourceResolver, ResourceResolver, SharedResourceResolver};
pub use metadoc_xslt::XsltCompiler;

use std::sync::Arc;

/// Transforms `document` with `stylesheet`, routing extension calls through `binding`.
pub fn transform(
    stylesheet: &Arc<dyn CompiledStylesheet>,
    document: &MetadataDocument,
    binding: &ExtensionNamespaceBinding,
) -> Result<TransformResult, TemplateError> {
    stylesheet.execute(document, binding)
}
