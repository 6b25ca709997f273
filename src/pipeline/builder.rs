// src/pipeline/builder.rs
use super::config::RenderConfig;
use super::context::PipelineContext;
use super::orchestrator::DocumentPipeline;
use crate::cache::StylesheetCache;
use crate::error::PipelineError;
use crate::localize::{DEFAULT_PREFIX, DEFAULT_TIMEOUT, LocalizationResolver, UnresolvedPolicy};
use metadoc_executor::{ExecutorImpl, SyncExecutor};
use metadoc_resource::{InMemoryResourceResolver, JsonResourceTable};
use metadoc_template_core::{
    ExtensionBinding, ExtensionNamespaceBinding, ImportPolicy, StylesheetLocator,
};
use metadoc_traits::SharedResourceResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A builder for creating a `DocumentPipeline`.
pub struct PipelineBuilder {
    stylesheet: Option<StylesheetLocator>,
    import_policy: ImportPolicy,
    resources: Option<SharedResourceResolver>,
    extra_bindings: ExtensionBinding,
    timeout: Duration,
    prefix: String,
    policy: UnresolvedPolicy,
    cache: Option<Arc<StylesheetCache>>,
    executor: ExecutorImpl,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            stylesheet: None,
            import_policy: ImportPolicy::default(),
            resources: None,
            extra_bindings: ExtensionBinding::new(),
            timeout: DEFAULT_TIMEOUT,
            prefix: DEFAULT_PREFIX.to_string(),
            policy: UnresolvedPolicy::default(),
            cache: None,
            executor: ExecutorImpl::default(),
        }
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Configures the builder from a `RenderConfig`, loading its resource table.
    pub fn from_config(config: &RenderConfig) -> Result<Self, PipelineError> {
        let mut builder = Self::new()
            .with_stylesheet_file(config.require_stylesheet()?)
            .with_fallback_base(&config.fallback_base)
            .with_confined_imports(config.confine_imports)
            .with_timeout(config.resolution_timeout())
            .with_placeholder_prefix(&config.placeholder_prefix)
            .with_unresolved_policy(config.unresolved_policy);
        if let Some(table) = &config.resource_table {
            builder = builder.with_resource_table_file(table)?;
        }
        Ok(builder)
    }

    /// Uses the stylesheet at `path`. Relative imports resolve against its directory.
    pub fn with_stylesheet_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.stylesheet = Some(StylesheetLocator::path(path.as_ref()));
        self
    }

    /// Uses stylesheet text held in memory, identified by `id` in logs and the cache.
    pub fn with_stylesheet_source(mut self, id: &str, source: &str) -> Self {
        self.stylesheet = Some(StylesheetLocator::inline(id, source));
        self
    }

    pub fn with_import_policy(mut self, policy: ImportPolicy) -> Self {
        self.import_policy = policy;
        self
    }

    /// Base directory for relative imports of inline stylesheets.
    pub fn with_fallback_base<P: Into<PathBuf>>(mut self, base: P) -> Self {
        self.import_policy.fallback_base = base.into();
        self
    }

    /// Rejects imports that escape their base directory.
    pub fn with_confined_imports(mut self, confine: bool) -> Self {
        self.import_policy.confine_to_base = confine;
        self
    }

    /// The resolver behind both the extension namespaces and placeholder resolution.
    pub fn with_resource_resolver(mut self, resolver: SharedResourceResolver) -> Self {
        self.resources = Some(resolver);
        self
    }

    pub fn with_resource_table_file<P: AsRef<Path>>(self, path: P) -> Result<Self, PipelineError> {
        let table = JsonResourceTable::load(path.as_ref())
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(self.with_resource_resolver(Arc::new(table)))
    }

    /// Binds an extra extension namespace, or replaces one of the defaults.
    pub fn with_extension_namespace(
        mut self,
        namespace: &str,
        provider: SharedResourceResolver,
    ) -> Self {
        self.extra_bindings = self.extra_bindings.bind(namespace, provider);
        self
    }

    /// Wall-clock budget for placeholder resolution.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_placeholder_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn with_unresolved_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shares a stylesheet cache with other pipelines.
    pub fn with_cache(mut self, cache: Arc<StylesheetCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_executor(mut self, executor: ExecutorImpl) -> Self {
        self.executor = executor;
        self
    }

    /// Renders batches on the calling thread.
    pub fn sequential(self) -> Self {
        self.with_executor(ExecutorImpl::Sync(SyncExecutor::new()))
    }

    /// Consumes the builder and creates the `DocumentPipeline`.
    pub fn build(self) -> Result<DocumentPipeline, PipelineError> {
        let stylesheet = self.stylesheet.ok_or_else(|| {
            PipelineError::Config(
                "No stylesheet has been configured. Use `with_stylesheet_file` or `with_stylesheet_source`."
                    .to_string(),
            )
        })?;
        let valid_prefix = !self.prefix.is_empty()
            && self
                .prefix
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid_prefix {
            return Err(PipelineError::Config(format!(
                "Invalid placeholder prefix '{}'",
                self.prefix
            )));
        }

        let resources = self
            .resources
            .unwrap_or_else(|| Arc::new(InMemoryResourceResolver::new()));
        let localizer = LocalizationResolver::new(Arc::clone(&resources))
            .with_prefix(self.prefix)
            .with_policy(self.policy)
            .with_timeout(self.timeout);
        let extra_bindings: ExtensionNamespaceBinding = self.extra_bindings.build();

        log::info!(
            "Built pipeline for '{}' ({} extra namespaces, policy {}, executor {})",
            stylesheet,
            extra_bindings.len(),
            localizer.policy(),
            metadoc_executor::Executor::name(&self.executor)
        );

        let context = Arc::new(PipelineContext {
            cache: self.cache.unwrap_or_default(),
            stylesheet,
            import_policy: self.import_policy,
            resources,
            extra_bindings,
            localizer,
        });
        Ok(DocumentPipeline::new(context, self.executor))
    }
}
