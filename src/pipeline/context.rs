use crate::cache::StylesheetCache;
use crate::localize::LocalizationResolver;
use metadoc_template_core::{
    ExtensionBinding, ExtensionNamespaceBinding, ImportPolicy, MetadataDocument,
    StylesheetLocator,
};
use metadoc_traits::SharedResourceResolver;
use std::borrow::Cow;
use std::sync::Arc;

/// Everything a render needs, shared read-only between concurrent renders.
/// Created once by the `PipelineBuilder`.
///
/// The cache is the only part with interior mutability. Extension bindings
/// are rebuilt for every render from `resources` and `extra_bindings`.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub cache: Arc<StylesheetCache>,
    pub stylesheet: StylesheetLocator,
    pub import_policy: ImportPolicy,
    pub resources: SharedResourceResolver,
    /// Bindings added on top of the two metadata namespaces.
    pub extra_bindings: ExtensionNamespaceBinding,
    pub localizer: LocalizationResolver,
}

impl PipelineContext {
    /// A fresh binding for one render.
    pub fn extension_binding(&self) -> ExtensionNamespaceBinding {
        ExtensionBinding::new()
            .merge(&ExtensionNamespaceBinding::metadata_defaults(Arc::clone(
                &self.resources,
            )))
            .merge(&self.extra_bindings)
            .build()
    }

    /// The import policy for rendering `document`.
    ///
    /// A stylesheet without a directory of its own resolves relative imports
    /// against the document's base when the document has one, and against
    /// the configured fallback otherwise.
    pub fn import_policy_for(&self, document: &MetadataDocument) -> Cow<'_, ImportPolicy> {
        match (self.stylesheet.base_dir(), document.base()) {
            (None, Some(base)) => Cow::Owned(ImportPolicy {
                fallback_base: base.to_path_buf(),
                ..self.import_policy.clone()
            }),
            _ => Cow::Borrowed(&self.import_policy),
        }
    }
}
