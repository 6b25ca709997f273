// src/pipeline/orchestrator.rs
use super::context::PipelineContext;
use crate::error::{PipelineError, PipelineStage};
use crate::postprocess;
use crate::sink::OutputSink;
use crate::source::MetadataSource;
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use metadoc_executor::{Executor, ExecutorImpl};
use metadoc_template_core::MetadataDocument;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Time spent in one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub stage: PipelineStage,
    pub elapsed_ms: f64,
}

/// What happened during one render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderReport {
    pub stylesheet: String,
    /// RFC 3339 timestamp of when the render finished.
    pub built_at: String,
    pub stages: Vec<StageTiming>,
    pub placeholders_resolved: usize,
    pub unresolved_keys: Vec<String>,
    pub output_bytes: usize,
}

impl RenderReport {
    pub fn elapsed_ms(&self, stage: PipelineStage) -> Option<f64> {
        self.stages
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| t.elapsed_ms)
    }

    pub fn total_ms(&self) -> f64 {
        self.stages.iter().map(|t| t.elapsed_ms).sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// The final document of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub text: String,
    pub report: RenderReport,
}

/// The stage a render is in, readable from outside the thread running it.
#[derive(Debug, Clone)]
struct StageTracker(Arc<Mutex<PipelineStage>>);

impl StageTracker {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(PipelineStage::Idle)))
    }

    fn enter(&self, stage: PipelineStage) {
        match self.0.lock() {
            Ok(mut current) => *current = stage,
            Err(poisoned) => *poisoned.into_inner() = stage,
        }
    }

    fn current(&self) -> PipelineStage {
        match self.0.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Runs stages in order, recording how long each one took.
struct StageRunner {
    timings: Vec<StageTiming>,
    tracker: StageTracker,
}

impl StageRunner {
    fn new(tracker: StageTracker) -> Self {
        Self {
            timings: Vec::new(),
            tracker,
        }
    }

    fn run<T, E>(&mut self, stage: PipelineStage, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        self.tracker.enter(stage);
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        match &result {
            Ok(_) => info!("[{}] finished in {:.2?}", stage, elapsed),
            Err(_) => warn!("[{}] failed after {:.2?}", stage, elapsed),
        }
        self.timings.push(StageTiming {
            stage,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        });
        result
    }
}

/// Loading → Transforming → Localizing → Finalizing for one document.
pub(crate) fn render_document(
    context: &PipelineContext,
    document: &MetadataDocument,
) -> Result<RenderedDocument, PipelineError> {
    render_tracked(context, document, StageTracker::new())
}

fn render_tracked(
    context: &PipelineContext,
    document: &MetadataDocument,
    tracker: StageTracker,
) -> Result<RenderedDocument, PipelineError> {
    let mut runner = StageRunner::new(tracker);

    let import_policy = context.import_policy_for(document);
    let stylesheet = runner
        .run(PipelineStage::Loading, || {
            context
                .cache
                .get_or_compile(&context.stylesheet, &import_policy)
        })
        .map_err(|e| PipelineError::from_template(e, PipelineStage::Loading))?;

    let binding = context.extension_binding();
    let raw = runner
        .run(PipelineStage::Transforming, || stylesheet.execute(document, &binding))
        .map_err(|e| PipelineError::from_template(e, PipelineStage::Transforming))?;

    let localized = runner.run(PipelineStage::Localizing, || {
        context.localizer.resolve(raw.as_str())
    })?;

    let text = runner.run(PipelineStage::Finalizing, || {
        Ok::<_, PipelineError>(postprocess::finalize(&localized.text))
    })?;
    runner.tracker.enter(PipelineStage::Done);

    let report = RenderReport {
        stylesheet: context.stylesheet.to_string(),
        built_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        stages: runner.timings,
        placeholders_resolved: localized.resolved,
        unresolved_keys: localized.unresolved,
        output_bytes: text.len(),
    };
    Ok(RenderedDocument { text, report })
}

/// The metadata rendering pipeline.
///
/// Each render is a strict sequence of stages; the first failure ends it and
/// carries the stage it happened in. Nothing reaches a sink unless every
/// stage before emission succeeded.
#[derive(Debug, Clone)]
pub struct DocumentPipeline {
    context: Arc<PipelineContext>,
    executor: ExecutorImpl,
}

impl DocumentPipeline {
    pub fn new(context: Arc<PipelineContext>, executor: ExecutorImpl) -> Self {
        Self { context, executor }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Compiles the stylesheet into the cache ahead of the first render.
    pub fn preload(&self) -> Result<(), PipelineError> {
        self.context
            .cache
            .get_or_compile(&self.context.stylesheet, &self.context.import_policy)
            .map(|_| ())
            .map_err(|e| PipelineError::from_template(e, PipelineStage::Loading))
    }

    pub fn render(&self, document: &MetadataDocument) -> Result<RenderedDocument, PipelineError> {
        render_document(&self.context, document)
    }

    /// Renders `document` and writes the result to `sink` as the last step.
    pub fn render_to_sink(
        &self,
        document: &MetadataDocument,
        sink: &dyn OutputSink,
    ) -> Result<RenderReport, PipelineError> {
        let rendered = self.render(document)?;
        self.emit(rendered, sink)
    }

    /// Fetches the document from `source`, renders it and writes it to `sink`.
    pub fn render_source_to_sink(
        &self,
        source: &dyn MetadataSource,
        sink: &dyn OutputSink,
    ) -> Result<RenderReport, PipelineError> {
        let start = Instant::now();
        let document = source.fetch().inspect_err(|e| {
            warn!("[{}] '{}' failed: {}", PipelineStage::Acquiring, source.describe(), e);
        })?;
        let acquiring = StageTiming {
            stage: PipelineStage::Acquiring,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };

        let mut rendered = self.render(&document)?;
        rendered.report.stages.insert(0, acquiring);
        self.emit(rendered, sink)
    }

    /// Renders every document on the pipeline's executor. Results are in
    /// input order; one failure does not affect the others.
    pub fn render_batch(
        &self,
        documents: Vec<MetadataDocument>,
    ) -> Vec<Result<RenderedDocument, PipelineError>> {
        info!(
            "Rendering batch of {} documents on {} (parallelism {})",
            documents.len(),
            self.executor.name(),
            self.executor.parallelism()
        );
        let context = Arc::clone(&self.context);
        self.executor
            .execute_all(documents, move |document| render_document(&context, &document))
    }

    /// Renders on tokio's blocking pool. A render task that dies is reported
    /// against the stage it was running.
    pub async fn render_async(
        &self,
        document: MetadataDocument,
    ) -> Result<RenderedDocument, PipelineError> {
        let context = Arc::clone(&self.context);
        let tracker = StageTracker::new();
        let running = tracker.clone();
        tokio::task::spawn_blocking(move || render_tracked(&context, &document, running))
            .await
            .map_err(|e| PipelineError::Aborted {
                stage: tracker.current(),
                message: e.to_string(),
            })?
    }

    fn emit(
        &self,
        rendered: RenderedDocument,
        sink: &dyn OutputSink,
    ) -> Result<RenderReport, PipelineError> {
        let RenderedDocument { text, mut report } = rendered;
        let mut runner = StageRunner::new(StageTracker::new());
        runner.run(PipelineStage::Emitting, || sink.write(&text))?;
        report.stages.extend(runner.timings);
        info!(
            "Rendered '{}' to {} ({} bytes, {:.2} ms)",
            report.stylesheet,
            sink.describe(),
            report.output_bytes,
            report.total_ms()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StylesheetCache;
    use crate::pipeline::PipelineBuilder;
    use metadoc_template_core::{
        CompiledStylesheet, ExtensionNamespaceBinding, ImportResolver, StylesheetCompiler,
        StylesheetLocator, TemplateError, TransformResult,
    };

    #[derive(Debug)]
    struct Panicking(StylesheetLocator);

    impl CompiledStylesheet for Panicking {
        fn execute(
            &self,
            _document: &MetadataDocument,
            _binding: &ExtensionNamespaceBinding,
        ) -> Result<TransformResult, TemplateError> {
            panic!("stylesheet blew up");
        }

        fn locator(&self) -> &StylesheetLocator {
            &self.0
        }
    }

    struct PanickingCompiler;

    impl StylesheetCompiler for PanickingCompiler {
        fn compile(
            &self,
            _source: &str,
            locator: &StylesheetLocator,
            _imports: &dyn ImportResolver,
        ) -> Result<Arc<dyn CompiledStylesheet>, TemplateError> {
            Ok(Arc::new(Panicking(locator.clone())))
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_aborted_async_render_reports_running_stage() {
        let pipeline = PipelineBuilder::new()
            .with_stylesheet_source("boom", "<xsl:stylesheet/>")
            .with_cache(Arc::new(StylesheetCache::new(Arc::new(PanickingCompiler))))
            .sequential()
            .build()
            .unwrap();

        let err = pipeline
            .render_async(MetadataDocument::new("<m/>"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Aborted { .. }));
        assert_eq!(err.stage(), PipelineStage::Transforming);
    }

    #[test]
    fn test_tracker_follows_the_render() {
        let pipeline = PipelineBuilder::new()
            .with_stylesheet_source(
                "ok",
                r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                    <xsl:template match="/"><p><xsl:value-of select="/m"/></p></xsl:template>
                </xsl:stylesheet>"#,
            )
            .sequential()
            .build()
            .unwrap();

        let tracker = StageTracker::new();
        assert_eq!(tracker.current(), PipelineStage::Idle);
        render_tracked(pipeline.context(), &MetadataDocument::new("<m>x</m>"), tracker.clone())
            .unwrap();
        assert_eq!(tracker.current(), PipelineStage::Done);

        let failed = StageTracker::new();
        let result = render_tracked(pipeline.context(), &MetadataDocument::new("<m>"), failed.clone());
        assert!(result.is_err());
        assert_eq!(failed.current(), PipelineStage::Transforming);
    }
}
