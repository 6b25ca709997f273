//! Metadata rendering pipeline orchestration.
//!
//! - [`PipelineBuilder`]: Fluent builder for constructing document pipelines
//! - [`DocumentPipeline`]: Runs Loading → Transforming → Localizing → Finalizing
//!   and emits the result
//! - [`RenderConfig`]: JSON configuration consumed by the builder and the CLI
//!
//! # Example
//!
//! ```ignore
//! use metadoc::{PipelineBuilder, FileSink};
//!
//! let pipeline = PipelineBuilder::new()
//!     .with_stylesheet_file("stylesheets/ArcGIS.xsl")
//!     .with_resource_table_file("strings/en.json")?
//!     .build()?;
//!
//! let report = pipeline.render_to_sink(&document, &FileSink::new("out.html"))?;
//! ```

mod builder;
pub mod config;
pub mod context;
mod orchestrator;

pub use builder::PipelineBuilder;
pub use config::{ConfigError, RenderConfig};
pub use context::PipelineContext;
pub use orchestrator::{DocumentPipeline, RenderReport, RenderedDocument, StageTiming};
