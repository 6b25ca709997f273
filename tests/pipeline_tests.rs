mod common;

use common::fixtures::*;
use common::{TestResult, builder_for, pipeline_for, sample_resources};
use metadoc::postprocess::{XHTML_DOCTYPE, XML_PROLOG};
use metadoc::{
    FileMetadataSource, FileSink, MetadataDocument, PipelineBuilder, PipelineStage,
    StylesheetCache, UnresolvedPolicy, WriterSink,
};
use std::fs;
use std::sync::Arc;

#[test]
fn test_end_to_end_render() -> TestResult {
    let pipeline = pipeline_for(SAMPLE_STYLESHEET);
    let rendered = pipeline.render(&MetadataDocument::new(SAMPLE_METADATA))?;

    assert!(rendered.text.starts_with(&format!("{}{}", XML_PROLOG, XHTML_DOCTYPE)));
    assert!(rendered.text.contains("<body>Title: Sample</body>"));
    assert!(rendered.text.contains("<title>Metadata</title>"));
    assert!(!rendered.text.contains("<res:"));
    assert_eq!(rendered.report.placeholders_resolved, 1);
    assert!(rendered.report.unresolved_keys.is_empty());
    assert_eq!(rendered.report.output_bytes, rendered.text.len());
    Ok(())
}

#[test]
fn test_render_is_deterministic() -> TestResult {
    let pipeline = pipeline_for(SAMPLE_STYLESHEET);
    let document = MetadataDocument::new(SAMPLE_METADATA);
    let first = pipeline.render(&document)?;
    let second = pipeline.render(&document)?;
    assert_eq!(first.text, second.text);
    Ok(())
}

#[test]
fn test_report_lists_stages_in_order() -> TestResult {
    let pipeline = pipeline_for(SAMPLE_STYLESHEET);
    let sink = WriterSink::new(Vec::new());
    let report = pipeline.render_to_sink(&MetadataDocument::new(SAMPLE_METADATA), &sink)?;

    let stages: Vec<_> = report.stages.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::Loading,
            PipelineStage::Transforming,
            PipelineStage::Localizing,
            PipelineStage::Finalizing,
            PipelineStage::Emitting,
        ]
    );
    assert!(report.elapsed_ms(PipelineStage::Transforming).is_some());

    let json: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
    assert_eq!(json["placeholdersResolved"], 1);
    assert_eq!(json["stages"][0]["stage"], "loading");
    assert!(json["builtAt"].as_str().unwrap_or_default().contains('T'));

    let written = sink.into_inner().ok_or("writer poisoned")?;
    assert_eq!(String::from_utf8(written)?.len(), report.output_bytes);
    Ok(())
}

#[test]
fn test_unresolved_key_policies() -> TestResult {
    let document = MetadataDocument::new(SAMPLE_METADATA);

    let kept = pipeline_for(STYLED_STYLESHEET).render(&document)?;
    assert!(kept.text.contains("<p>Title</p>"));
    assert!(kept.text.contains("<res:idUnknown"));
    assert_eq!(kept.report.unresolved_keys, vec!["idUnknown".to_string()]);

    let removed = builder_for(STYLED_STYLESHEET)
        .with_unresolved_policy(UnresolvedPolicy::Remove)
        .build()?
        .render(&document)?;
    assert!(removed.text.contains("<p>Title</p><p></p>"));
    assert!(!removed.text.contains("<res:"));

    let err = builder_for(STYLED_STYLESHEET)
        .with_unresolved_policy(UnresolvedPolicy::Fail)
        .build()?
        .render(&document)
        .unwrap_err();
    assert_eq!(err.stage(), PipelineStage::Localizing);
    assert!(err.to_string().contains("idUnknown"));
    Ok(())
}

#[test]
fn test_thumbnail_css_is_patched() -> TestResult {
    let rendered = pipeline_for(STYLED_STYLESHEET).render(&MetadataDocument::new("<m/>"))?;
    assert!(rendered.text.contains(".noThumbnail {display:inline-block;color:gray;}"));
    Ok(())
}

#[test]
fn test_file_stylesheet_with_import() -> TestResult {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("common.xsl"), COMMON_MODULE)?;
    let main = dir.path().join("main.xsl");
    fs::write(&main, MAIN_WITH_IMPORT)?;

    let pipeline = PipelineBuilder::new()
        .with_stylesheet_file(&main)
        .with_confined_imports(true)
        .sequential()
        .build()?;
    let rendered = pipeline.render(&MetadataDocument::new(
        "<meta><title>Rivers</title><abstract>Flow</abstract></meta>",
    ))?;
    assert_eq!(rendered.text, "<div><h1>Rivers</h1><p>Flow</p></div>");
    Ok(())
}

#[test]
fn test_inline_stylesheet_imports_from_fallback_base() -> TestResult {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("common.xsl"), COMMON_MODULE)?;

    let pipeline = PipelineBuilder::new()
        .with_stylesheet_source("inline-main", MAIN_WITH_IMPORT)
        .with_fallback_base(dir.path())
        .sequential()
        .build()?;
    let rendered = pipeline.render(&MetadataDocument::new("<meta><title>T</title></meta>"))?;
    assert_eq!(rendered.text, "<div><h1>T</h1></div>");
    Ok(())
}

#[test]
fn test_inline_stylesheet_imports_from_document_directory() -> TestResult {
    let records = tempfile::tempdir()?;
    let elsewhere = tempfile::tempdir()?;
    fs::write(records.path().join("common.xsl"), COMMON_MODULE)?;
    let input = records.path().join("meta.xml");
    fs::write(&input, "<meta><title>Wells</title></meta>")?;

    let pipeline = PipelineBuilder::new()
        .with_stylesheet_source("inline-main", MAIN_WITH_IMPORT)
        .with_fallback_base(elsewhere.path())
        .sequential()
        .build()?;
    let sink = WriterSink::new(Vec::new());
    pipeline.render_source_to_sink(&FileMetadataSource::new(&input), &sink)?;
    let written = String::from_utf8(sink.into_inner().ok_or("writer poisoned")?)?;
    assert_eq!(written, "<div><h1>Wells</h1></div>");

    // Without a document base the import falls back and is not found.
    assert!(pipeline.render(&MetadataDocument::new("<meta/>")).is_err());
    Ok(())
}

#[test]
fn test_source_to_file_sink() -> TestResult {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("meta.xml");
    let output = dir.path().join("meta.html");
    fs::write(&input, SAMPLE_METADATA)?;

    let report = pipeline_for(SAMPLE_STYLESHEET)
        .render_source_to_sink(&FileMetadataSource::new(&input), &FileSink::new(&output))?;

    assert_eq!(report.stages.first().map(|t| t.stage), Some(PipelineStage::Acquiring));
    assert_eq!(report.stages.last().map(|t| t.stage), Some(PipelineStage::Emitting));
    let html = fs::read_to_string(&output)?;
    assert!(html.contains("<body>Title: Sample</body>"));
    assert_eq!(html.len(), report.output_bytes);
    Ok(())
}

#[test]
fn test_batch_shares_one_compilation() -> TestResult {
    let cache = Arc::new(StylesheetCache::default());
    let pipeline = PipelineBuilder::new()
        .with_stylesheet_source("batch", SAMPLE_STYLESHEET)
        .with_resource_resolver(sample_resources())
        .with_cache(Arc::clone(&cache))
        .build()?;

    let documents: Vec<_> = (0..16)
        .map(|i| MetadataDocument::new(format!("<meta><title>Doc {}</title></meta>", i)))
        .collect();
    let results = pipeline.render_batch(documents);

    assert_eq!(results.len(), 16);
    for (i, result) in results.into_iter().enumerate() {
        let rendered = result?;
        assert!(rendered.text.contains(&format!("<body>Title: Doc {}</body>", i)));
    }
    assert_eq!(cache.compilations(), 1);
    Ok(())
}

#[test]
fn test_batch_failures_are_isolated() -> TestResult {
    let pipeline = pipeline_for(SAMPLE_STYLESHEET);
    let results = pipeline.render_batch(vec![
        MetadataDocument::new(SAMPLE_METADATA),
        MetadataDocument::new("<meta><title>"),
        MetadataDocument::new(SAMPLE_METADATA),
    ]);
    assert!(results[0].is_ok());
    assert_eq!(
        results[1].as_ref().map_err(|e| e.stage()).unwrap_err(),
        PipelineStage::Transforming
    );
    assert!(results[2].is_ok());
    Ok(())
}

#[test]
fn test_pipelines_share_a_cache() -> TestResult {
    let cache = Arc::new(StylesheetCache::default());
    let build = || {
        builder_for(SAMPLE_STYLESHEET)
            .with_cache(Arc::clone(&cache))
            .build()
    };
    let (a, b) = (build()?, build()?);
    a.preload()?;
    b.render(&MetadataDocument::new(SAMPLE_METADATA))?;
    assert_eq!(cache.compilations(), 1);
    assert_eq!(cache.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_render_async() -> TestResult {
    let pipeline = pipeline_for(SAMPLE_STYLESHEET);
    let rendered = pipeline
        .render_async(MetadataDocument::new(SAMPLE_METADATA))
        .await?;
    assert!(rendered.text.contains("<body>Title: Sample</body>"));
    Ok(())
}
