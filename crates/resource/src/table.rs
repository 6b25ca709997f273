//! Resource strings loaded from a JSON file.
//!
//! The file is a flat object mapping keys to localized text:
//!
//! ```json
//! { "title": "Overview", "heading": "Title" }
//! ```

use metadoc_traits::{ResourceError, ResourceResolver};
use std::collections::HashMap;
use std::path::Path;

/// An immutable resource table parsed from JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonResourceTable {
    strings: HashMap<String, String>,
}

impl JsonResourceTable {
    /// Loads a table from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResourceError::NotFound(path.display().to_string())
            } else {
                ResourceError::LoadFailed {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }
            }
        })?;
        let table = Self::from_json(&text)?;
        log::debug!(
            "Loaded {} resource strings from '{}'",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parses a table from JSON text. Non-string values are rejected.
    pub fn from_json(text: &str) -> Result<Self, ResourceError> {
        let strings: HashMap<String, String> =
            serde_json::from_str(text).map_err(|e| ResourceError::InvalidFormat(e.to_string()))?;
        Ok(Self { strings })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl ResourceResolver for JsonResourceTable {
    fn resolve_resource_string(&self, key: &str) -> Option<String> {
        self.strings.get(key).cloned()
    }

    fn name(&self) -> &'static str {
        "JsonResourceTable"
    }
}
