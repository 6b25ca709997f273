//! A reference XSLT 1.0 subset engine for metadoc.
//!
//! Stylesheets are compiled into an owned `CompiledProgram` that can be shared
//! across threads. Execution walks the input with roxmltree and serializes the
//! result tree straight to text.

pub mod ast;
pub mod compiler;
pub mod datasources;
pub mod error;
pub mod eval;
pub mod executor;
pub mod expression;
pub mod output;
pub mod pattern;
pub mod processor;

mod compiler_handlers;
mod executor_handlers;

pub use error::{Location, XsltError};
pub use processor::{XsltCompiler, XsltStylesheet};
