//! Workplanner report generation.
//!
//! A [`ReportPipeline`] turns a manager id into a [`ReportDraft`]: chart PNGs,
//! an HTML page and a PDF, all written under a run-scoped directory. [`package`]
//! then reads the artifacts back into a [`workplanner_core::ManagerReport`].
//!
//! The renderer and converter sit behind traits ([`ReportRenderer`],
//! [`DocumentConverter`]) so front ends and tests can swap them.

pub mod charts;
pub mod error;
pub mod html;
pub mod output;
pub mod package;
pub mod pdf;
pub mod pipeline;

pub use charts::{ChartRefs, ChartRenderer};
pub use error::{PipelineError, PipelineStage, RenderError, StageError};
pub use html::{ReportInput, ReportRenderer, TemplateReportRenderer};
pub use output::{OutputRoots, RunDirs};
pub use package::package;
pub use pdf::{DocumentConverter, GenPdfConverter};
pub use pipeline::{ReportDraft, ReportPipeline};

#[cfg(test)]
mod tests;
