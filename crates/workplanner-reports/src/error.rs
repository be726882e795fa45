use std::fmt;
use std::io;
use std::path::PathBuf;

use workplanner_core::{DataError, ManagerId};

/// Failure turning report data into markup or a document.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template not found: {0}")]
    TemplateNotFound(PathBuf),
    #[error("malformed template {path}: {reason}")]
    MalformedTemplate { path: PathBuf, reason: String },
    #[error("malformed markup: {0}")]
    MalformedMarkup(String),
    #[error("missing resource: {0}")]
    MissingResource(String),
    #[error("document conversion failed: {0}")]
    Conversion(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Pipeline step a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    ResolveManager,
    FetchViews,
    RenderHtml,
    ConvertPdf,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::ResolveManager => "resolve_manager",
            PipelineStage::FetchViews => "fetch_views",
            PipelineStage::RenderHtml => "render_html",
            PipelineStage::ConvertPdf => "convert_pdf",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// A single-manager pipeline run failed; no partial report exists.
#[derive(Debug, thiserror::Error)]
#[error("report for manager {manager_id} failed at {stage}: {source}")]
pub struct PipelineError {
    pub manager_id: ManagerId,
    pub stage: PipelineStage,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(manager_id: ManagerId, stage: PipelineStage, source: impl Into<StageError>) -> Self {
        Self {
            manager_id,
            stage,
            source: source.into(),
        }
    }

    /// True for store failures (surfaced as a server error, never retried).
    pub fn is_data_unavailable(&self) -> bool {
        matches!(self.source, StageError::Data(_))
    }
}
