// src/error.rs
use crate::localize::LocalizeError;
use crate::pipeline::config::ConfigError;
use crate::sink::SinkError;
use crate::source::AcquisitionError;
use metadoc_template_core::TemplateError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Where a render is: `Idle` before the first stage, then each stage in
/// order, then `Done`. A failure is reported against the stage it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    Idle,
    Acquiring,
    Loading,
    Transforming,
    Localizing,
    Finalizing,
    Emitting,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Acquiring => "acquiring",
            PipelineStage::Loading => "loading",
            PipelineStage::Transforming => "transforming",
            PipelineStage::Localizing => "localizing",
            PipelineStage::Finalizing => "finalizing",
            PipelineStage::Emitting => "emitting",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A comprehensive error type for the metadata rendering pipeline.
///
/// Every variant is fatal to the render that produced it.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Metadata acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Stylesheet could not be loaded: {0}")]
    StylesheetLoad(TemplateError),

    #[error("Transform failed: {0}")]
    TransformExecution(TemplateError),

    #[error("Localization exceeded its {budget_ms} ms budget after {elapsed_ms} ms")]
    LocalizationTimeout { budget_ms: u64, elapsed_ms: u64 },

    #[error("No resource string for placeholder '{key}'")]
    UnresolvedPlaceholder { key: String },

    #[error("Writing output failed: {0}")]
    SinkWrite(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Render task aborted while {stage}: {message}")]
    Aborted {
        stage: PipelineStage,
        message: String,
    },

    #[error("Render report could not be serialized: {0}")]
    Report(#[from] serde_json::Error),
}

impl PipelineError {
    /// The stage this error aborted.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::Acquisition(_) => PipelineStage::Acquiring,
            PipelineError::StylesheetLoad(_) => PipelineStage::Loading,
            PipelineError::TransformExecution(_) => PipelineStage::Transforming,
            PipelineError::LocalizationTimeout { .. }
            | PipelineError::UnresolvedPlaceholder { .. } => PipelineStage::Localizing,
            PipelineError::SinkWrite(_) => PipelineStage::Emitting,
            PipelineError::Config(_) => PipelineStage::Idle,
            PipelineError::Aborted { stage, .. } => *stage,
            PipelineError::Report(_) => PipelineStage::Done,
        }
    }

    /// Classifies an error from the stylesheet layer: compile-time problems
    /// are load errors, everything else happened while transforming.
    pub(crate) fn from_template(err: TemplateError, stage: PipelineStage) -> Self {
        match (err, stage) {
            (err @ TemplateError::TransformExecution(_), _) => PipelineError::TransformExecution(err),
            (err, PipelineStage::Transforming) => PipelineError::TransformExecution(err),
            (err, _) => PipelineError::StylesheetLoad(err),
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<LocalizeError> for PipelineError {
    fn from(err: LocalizeError) -> Self {
        match err {
            LocalizeError::Timeout { budget, elapsed } => PipelineError::LocalizationTimeout {
                budget_ms: budget.as_millis() as u64,
                elapsed_ms: elapsed.as_millis() as u64,
            },
            LocalizeError::UnresolvedPlaceholder { key } => {
                PipelineError::UnresolvedPlaceholder { key }
            }
        }
    }
}
