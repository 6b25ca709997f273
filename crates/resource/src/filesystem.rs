//! Filesystem import resolution for stylesheets.
//!
//! # Security
//!
//! When the policy confines imports, resolved paths must stay within the
//! base directory: absolute hrefs and `..` traversal are rejected.

use metadoc_template_core::{ImportPolicy, ImportResolver, ResolvedImport, TemplateError};
use std::path::{Component, Path, PathBuf};

/// Resolves import hrefs against the importing stylesheet's directory, or
/// the policy's fallback base when there is none.
#[derive(Debug, Clone)]
pub struct FilesystemImportResolver {
    fallback_base: PathBuf,
    confine: bool,
}

impl FilesystemImportResolver {
    pub fn new<P: AsRef<Path>>(fallback_base: P) -> Self {
        Self {
            fallback_base: fallback_base.as_ref().to_path_buf(),
            confine: false,
        }
    }

    pub fn from_policy(policy: &ImportPolicy) -> Self {
        Self {
            fallback_base: policy.fallback_base.clone(),
            confine: policy.confine_to_base,
        }
    }

    pub fn fallback_base(&self) -> &Path {
        &self.fallback_base
    }

    /// Joins `href` onto `base`, applying confinement rules.
    ///
    /// Returns `None` if a confined href would escape the base directory.
    fn resolve_path(&self, href: &str, base: &Path) -> Option<PathBuf> {
        let href = href.strip_prefix("file://").unwrap_or(href);
        let href_path = Path::new(href);

        if !self.confine {
            return Some(if href_path.is_absolute() {
                href_path.to_path_buf()
            } else {
                base.join(href_path)
            });
        }

        if href_path.is_absolute() {
            return None;
        }
        let full_path = base.join(href_path);

        if let (Ok(canonical), Ok(canonical_base)) = (full_path.canonicalize(), base.canonicalize()) {
            return canonical.starts_with(&canonical_base).then_some(canonical);
        }

        // Target does not exist yet: fall back to a component check.
        if href_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return None;
        }
        Some(full_path)
    }
}

impl ImportResolver for FilesystemImportResolver {
    fn resolve(&self, href: &str, base: Option<&Path>) -> Result<ResolvedImport, TemplateError> {
        let base = base.unwrap_or(&self.fallback_base);
        let path = self
            .resolve_path(href, base)
            .ok_or_else(|| TemplateError::Import {
                href: href.to_string(),
                message: format!("escapes base directory '{}'", base.display()),
            })?;

        log::debug!("Resolved import '{}' to '{}'", href, path.display());
        let source = std::fs::read_to_string(&path).map_err(|e| TemplateError::Import {
            href: href.to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;
        Ok(ResolvedImport { path, source })
    }
}
