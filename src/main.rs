use clap::Parser;
use metadoc::{
    FileMetadataSource, FileSink, OutputSink, PipelineBuilder, PipelineError, RenderConfig,
    UnresolvedPolicy, WriterSink,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Renders an XML metadata document to localized HTML.
#[derive(Parser, Debug)]
#[command(name = "metadoc", version, about)]
struct Cli {
    /// JSON config file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Metadata XML to render.
    #[arg(short, long)]
    metadata: Option<PathBuf>,

    /// Stylesheet (.xsl) to transform with.
    #[arg(short, long)]
    stylesheet: Option<PathBuf>,

    /// Output file. Written to stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON object of resource strings.
    #[arg(short, long)]
    resources: Option<PathBuf>,

    /// Placeholder resolution budget in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Element prefix of placeholder tokens.
    #[arg(long)]
    prefix: Option<String>,

    /// What to do with unknown placeholder keys: keep-token, remove or fail.
    #[arg(long)]
    policy: Option<UnresolvedPolicy>,

    /// Base directory for imports of stylesheets without one.
    #[arg(long)]
    fallback_base: Option<PathBuf>,

    /// Reject stylesheet imports outside their base directory.
    #[arg(long)]
    confine_imports: bool,

    /// Print the render report as JSON to stderr.
    #[arg(long)]
    report: bool,
}

impl Cli {
    fn into_config(self) -> Result<(RenderConfig, bool), PipelineError> {
        let mut config = match &self.config {
            Some(path) => RenderConfig::from_file(path)?,
            None => RenderConfig::default(),
        };
        if let Some(metadata) = self.metadata {
            config.metadata_source_locator = Some(metadata);
        }
        if let Some(stylesheet) = self.stylesheet {
            config.stylesheet_locator = Some(stylesheet);
        }
        if let Some(output) = self.output {
            config.output_sink = Some(output);
        }
        if let Some(resources) = self.resources {
            config.resource_table = Some(resources);
        }
        if let Some(timeout) = self.timeout_ms {
            config.resolution_timeout_ms = timeout;
        }
        if let Some(prefix) = self.prefix {
            config.placeholder_prefix = prefix;
        }
        if let Some(policy) = self.policy {
            config.unresolved_policy = policy;
        }
        if let Some(base) = self.fallback_base {
            config.fallback_base = base;
        }
        config.confine_imports |= self.confine_imports;
        Ok((config, self.report))
    }
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    let (config, print_report) = cli.into_config()?;
    let metadata = config
        .metadata_source_locator
        .clone()
        .ok_or_else(|| PipelineError::Config("No metadata document given (--metadata)".into()))?;

    let pipeline = PipelineBuilder::from_config(&config)?.sequential().build()?;
    let source = FileMetadataSource::new(metadata);
    let sink: Box<dyn OutputSink> = match &config.output_sink {
        Some(path) => Box::new(FileSink::new(path)),
        None => Box::new(WriterSink::new(std::io::stdout())),
    };

    let report = pipeline.render_source_to_sink(&source, sink.as_ref())?;
    if print_report {
        let json = report.to_json()?;
        eprintln!("{}", json);
    }
    if !report.unresolved_keys.is_empty() {
        log::warn!(
            "{} placeholders had no resource string",
            report.unresolved_keys.len()
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Render failed at stage {}: {}", e.stage(), e);
            ExitCode::FAILURE
        }
    }
}
