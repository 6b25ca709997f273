#![allow(dead_code)]

pub mod fixtures;

use metadoc::{
    DocumentPipeline, InMemoryResourceResolver, OutputSink, PipelineBuilder, SinkError,
    UnresolvedPolicy,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn sample_resources() -> Arc<InMemoryResourceResolver> {
    Arc::new(InMemoryResourceResolver::from_pairs(fixtures::sample_strings()))
}

/// A sequential pipeline over an inline stylesheet with the sample strings.
pub fn pipeline_for(stylesheet: &str) -> DocumentPipeline {
    builder_for(stylesheet)
        .build()
        .expect("pipeline should build")
}

pub fn builder_for(stylesheet: &str) -> PipelineBuilder {
    PipelineBuilder::new()
        .with_stylesheet_source("test", stylesheet)
        .with_resource_resolver(sample_resources())
        .with_unresolved_policy(UnresolvedPolicy::KeepToken)
        .sequential()
}

/// A sink that only counts how often it is written to.
#[derive(Debug, Default)]
pub struct CountingSink {
    writes: AtomicUsize,
}

impl CountingSink {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl OutputSink for CountingSink {
    fn write(&self, _text: &str) -> Result<(), SinkError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "counting sink".to_string()
    }
}
