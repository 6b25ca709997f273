//! Filesystem-backed providers for the metadoc pipeline.
//!
//! ## Available Providers
//!
//! - [`FilesystemImportResolver`]: Loads `xsl:import`/`xsl:include` targets
//! - [`JsonResourceTable`]: Resource strings loaded from a JSON file
//!
//! ## Re-exports
//!
//! - [`InMemoryResourceResolver`]: Pre-populated in-memory table

mod filesystem;
mod table;

pub use filesystem::FilesystemImportResolver;
pub use table::JsonResourceTable;

pub use metadoc_traits::InMemoryResourceResolver;
