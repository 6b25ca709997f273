//! ResourceResolver trait for localized resource-string lookup.
//!
//! Stylesheets call back into a resolver through bound extension namespaces,
//! and the localization pass uses the same resolver for placeholder tokens
//! the stylesheet left behind.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Error type for loading or querying resource tables.
#[derive(Error, Debug, Clone)]
pub enum ResourceError {
    #[error("Resource table not found: {0}")]
    NotFound(String),

    #[error("Failed to load resource table '{path}': {message}")]
    LoadFailed { path: String, message: String },

    #[error("Invalid resource table format: {0}")]
    InvalidFormat(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        ResourceError::Io(err.to_string())
    }
}

/// A resolver shared between the extension binding and the localization pass.
pub type SharedResourceResolver = Arc<dyn ResourceResolver>;

/// The callback capability exposed to stylesheets.
///
/// One operation is required: map a short resource key (for example
/// `"title"`) to its localized text. `None` means the key is unknown; what
/// happens then is decided by the caller, not the resolver.
///
/// # Example
///
/// ```ignore
/// let resolver = InMemoryResourceResolver::new();
/// resolver.insert("title", "Overview")?;
/// assert_eq!(resolver.resolve_resource_string("title").as_deref(), Some("Overview"));
/// ```
pub trait ResourceResolver: Send + Sync + Debug {
    /// Look up the localized string for `key`.
    fn resolve_resource_string(&self, key: &str) -> Option<String>;

    /// Returns a human-readable name for this resolver (for logging/debugging).
    fn name(&self) -> &'static str {
        "ResourceResolver"
    }
}

impl<R: ResourceResolver + ?Sized> ResourceResolver for Arc<R> {
    fn resolve_resource_string(&self, key: &str) -> Option<String> {
        (**self).resolve_resource_string(key)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// An in-memory resource table.
///
/// Entries are stored behind a lock so a resolver already bound into a
/// pipeline can still be extended.
#[derive(Debug, Default)]
pub struct InMemoryResourceResolver {
    strings: RwLock<HashMap<String, String>>,
}

impl InMemoryResourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resolver from `(key, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let strings = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            strings: RwLock::new(strings),
        }
    }

    /// Add or replace a resource string.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::LoadFailed` if the internal lock is poisoned.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ResourceError> {
        let key = key.into();
        let mut strings = self.strings.write().map_err(|_| ResourceError::LoadFailed {
            path: key.clone(),
            message: "resource table lock poisoned".to_string(),
        })?;
        strings.insert(key, value.into());
        Ok(())
    }

    /// Remove a resource string, returning the previous value.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.strings.write().ok()?.remove(key)
    }

    /// Number of entries. Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.strings.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceResolver for InMemoryResourceResolver {
    fn resolve_resource_string(&self, key: &str) -> Option<String> {
        self.strings.read().ok()?.get(key).cloned()
    }

    fn name(&self) -> &'static str {
        "InMemoryResourceResolver"
    }
}
