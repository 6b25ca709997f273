//! Extension namespaces a stylesheet may call into during a transform.

use crate::TemplateError;
use log::warn;
use metadoc_traits::SharedResourceResolver;
use std::collections::BTreeMap;
use std::fmt;

/// Namespace used by metadata stylesheets for general helper calls.
pub const METADATA_NAMESPACE: &str = "http://www.esri.com/metadata/";
/// Namespace used by metadata stylesheets for resource-string lookups.
pub const METADATA_RES_NAMESPACE: &str = "http://www.esri.com/metadata/res/";

/// The set of namespace URIs bound to callback providers for one transform.
///
/// Built per invocation and never cached: providers may carry
/// request-specific locale state.
#[derive(Clone, Default)]
pub struct ExtensionNamespaceBinding {
    providers: BTreeMap<String, SharedResourceResolver>,
}

impl ExtensionNamespaceBinding {
    /// Bind every `(namespace, provider)` pair in `map`.
    pub fn bind<I, S>(map: I) -> Self
    where
        I: IntoIterator<Item = (S, SharedResourceResolver)>,
        S: Into<String>,
    {
        Self {
            providers: map.into_iter().map(|(ns, p)| (ns.into(), p)).collect(),
        }
    }

    /// Binds both conventional metadata namespaces to the same provider.
    pub fn metadata_defaults(provider: SharedResourceResolver) -> Self {
        ExtensionBinding::new()
            .bind(METADATA_NAMESPACE, provider.clone())
            .bind(METADATA_RES_NAMESPACE, provider)
            .build()
    }

    pub fn provider(&self, namespace: &str) -> Option<&SharedResourceResolver> {
        self.providers.get(namespace)
    }

    pub fn is_bound(&self, namespace: &str) -> bool {
        self.providers.contains_key(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Dispatches a stylesheet call `prefix:function(args…)`.
    ///
    /// Every bound operation is a string lookup: the key is the first
    /// argument, or the function's own name when called without arguments.
    /// An unknown key yields the empty string.
    pub fn invoke(
        &self,
        namespace: &str,
        function: &str,
        args: &[String],
    ) -> Result<String, TemplateError> {
        let provider = self.providers.get(namespace).ok_or_else(|| {
            TemplateError::TransformExecution(format!(
                "No extension provider bound for namespace '{}' (called '{}')",
                namespace, function
            ))
        })?;
        let key = args.first().map(String::as_str).unwrap_or(function);
        match provider.resolve_resource_string(key) {
            Some(text) => Ok(text),
            None => {
                warn!(
                    "Extension call '{}' in '{}' found no resource string for key '{}'",
                    function, namespace, key
                );
                Ok(String::new())
            }
        }
    }
}

impl fmt::Debug for ExtensionNamespaceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.providers.iter().map(|(ns, p)| (ns, p.name())))
            .finish()
    }
}

/// Fluent builder for `ExtensionNamespaceBinding`.
///
/// The same provider may be registered under several namespaces to satisfy
/// the different calling conventions a stylesheet uses.
#[derive(Default)]
pub struct ExtensionBinding {
    providers: BTreeMap<String, SharedResourceResolver>,
}

impl ExtensionBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, namespace: impl Into<String>, provider: SharedResourceResolver) -> Self {
        self.providers.insert(namespace.into(), provider);
        self
    }

    pub fn bind_all<I, S>(mut self, map: I) -> Self
    where
        I: IntoIterator<Item = (S, SharedResourceResolver)>,
        S: Into<String>,
    {
        for (namespace, provider) in map {
            self.providers.insert(namespace.into(), provider);
        }
        self
    }

    /// Adds every binding of `other`, replacing providers for namespaces bound in both.
    pub fn merge(mut self, other: &ExtensionNamespaceBinding) -> Self {
        for (ns, provider) in &other.providers {
            self.providers.insert(ns.clone(), provider.clone());
        }
        self
    }

    pub fn build(self) -> ExtensionNamespaceBinding {
        ExtensionNamespaceBinding {
            providers: self.providers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadoc_traits::InMemoryResourceResolver;
    use std::sync::Arc;

    fn strings() -> SharedResourceResolver {
        Arc::new(InMemoryResourceResolver::from_pairs([("title", "Overview")]))
    }

    #[test]
    fn test_defaults_share_one_provider() {
        let binding = ExtensionNamespaceBinding::metadata_defaults(strings());
        assert_eq!(binding.len(), 2);
        let a = binding.provider(METADATA_NAMESPACE).unwrap();
        let b = binding.provider(METADATA_RES_NAMESPACE).unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_invoke_uses_first_argument_as_key() {
        let binding = ExtensionBinding::new().bind("urn:x", strings()).build();
        let text = binding
            .invoke("urn:x", "GetResString", &["title".to_string()])
            .unwrap();
        assert_eq!(text, "Overview");
    }

    #[test]
    fn test_invoke_without_arguments_uses_function_name() {
        let binding = ExtensionBinding::new().bind("urn:x", strings()).build();
        assert_eq!(binding.invoke("urn:x", "title", &[]).unwrap(), "Overview");
    }

    #[test]
    fn test_invoke_unknown_key_is_empty() {
        let binding = ExtensionBinding::new().bind("urn:x", strings()).build();
        assert_eq!(binding.invoke("urn:x", "nope", &[]).unwrap(), "");
    }

    #[test]
    fn test_invoke_unbound_namespace_fails() {
        let binding = ExtensionNamespaceBinding::default();
        let err = binding.invoke("urn:missing", "f", &[]).unwrap_err();
        assert!(matches!(err, TemplateError::TransformExecution(_)));
        assert!(err.to_string().contains("urn:missing"));
    }

    #[test]
    fn test_builder_bind_all_and_merge() {
        let extra = ExtensionBinding::new().bind("urn:c", strings()).build();
        let binding = ExtensionBinding::new()
            .bind_all([("urn:a", strings()), ("urn:b", strings())])
            .merge(&extra)
            .build();
        assert_eq!(
            binding.namespaces().collect::<Vec<_>>(),
            vec!["urn:a", "urn:b", "urn:c"]
        );
    }

    #[test]
    fn test_bind_from_map() {
        let binding = ExtensionNamespaceBinding::bind([("urn:a", strings()), ("urn:b", strings())]);
        assert_eq!(binding.namespaces().collect::<Vec<_>>(), vec!["urn:a", "urn:b"]);
    }
}
