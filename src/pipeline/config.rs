//! Render configuration, read from JSON with camelCase keys.
//!
//! ```json
//! {
//!   "metadataSourceLocator": "meta.xml",
//!   "stylesheetLocator": "stylesheets/ArcGIS.xsl",
//!   "outputSink": "out/meta.html",
//!   "resolutionTimeoutMs": 250,
//!   "resourceTable": "strings/en.json",
//!   "unresolvedPolicy": "keepToken"
//! }
//! ```

use crate::localize::{DEFAULT_PREFIX, UnresolvedPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_MS: u64 = 250;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing required setting '{0}'")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    pub metadata_source_locator: Option<PathBuf>,
    pub stylesheet_locator: Option<PathBuf>,
    pub output_sink: Option<PathBuf>,
    pub resolution_timeout_ms: u64,
    /// Base for relative imports of stylesheets that have no directory of their own.
    pub fallback_base: PathBuf,
    /// JSON object of resource strings.
    pub resource_table: Option<PathBuf>,
    pub placeholder_prefix: String,
    pub unresolved_policy: UnresolvedPolicy,
    pub confine_imports: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            metadata_source_locator: None,
            stylesheet_locator: None,
            output_sink: None,
            resolution_timeout_ms: DEFAULT_TIMEOUT_MS,
            fallback_base: PathBuf::from("."),
            resource_table: None,
            placeholder_prefix: DEFAULT_PREFIX.to_string(),
            unresolved_policy: UnresolvedPolicy::default(),
            confine_imports: false,
        }
    }
}

impl RenderConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_millis(self.resolution_timeout_ms)
    }

    /// The stylesheet path, which every render needs.
    pub fn require_stylesheet(&self) -> Result<&Path, ConfigError> {
        self.stylesheet_locator
            .as_deref()
            .ok_or(ConfigError::Missing("stylesheetLocator"))
    }
}
