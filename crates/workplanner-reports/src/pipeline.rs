//! Single-manager report pipeline.
//!
//! `build` runs resolve → fetch → chart → render → convert for one manager,
//! writing only into its own [`RunDirs`]. Any stage failure ends the run with a
//! [`PipelineError`] naming that stage; there are no retries.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use workplanner_core::model::display_name;
use workplanner_core::{ManagerId, ReportStore, Settings};

use crate::charts::{ChartRefs, ChartRenderer};
use crate::error::{PipelineError, PipelineStage, StageError};
use crate::html::{ReportInput, ReportRenderer, TemplateReportRenderer};
use crate::output::{OutputRoots, RunDirs};
use crate::pdf::{DocumentConverter, GenPdfConverter};

/// Timestamp format of generated PDF names (second granularity).
pub const PDF_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A built but not yet packaged report. Its artifacts live under `run`.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub manager_id: ManagerId,
    pub manager_name: Option<String>,
    /// False when all four views came back empty.
    pub has_data: bool,
    pub html: String,
    pub pdf_path: PathBuf,
    pub charts: ChartRefs,
    pub run: RunDirs,
}

pub struct ReportPipeline {
    store: Arc<dyn ReportStore>,
    renderer: Box<dyn ReportRenderer>,
    converter: Box<dyn DocumentConverter>,
    roots: OutputRoots,
}

impl ReportPipeline {
    pub fn new(
        store: Arc<dyn ReportStore>,
        renderer: Box<dyn ReportRenderer>,
        converter: Box<dyn DocumentConverter>,
        roots: OutputRoots,
    ) -> Self {
        Self {
            store,
            renderer,
            converter,
            roots,
        }
    }

    /// Pipeline with the template renderer and the genpdf converter from `settings`.
    /// Relative image references resolve against the diagrams root.
    pub fn from_settings(store: Arc<dyn ReportStore>, settings: &Settings) -> Self {
        Self::new(
            store,
            Box::new(TemplateReportRenderer::new(&settings.templates_path)),
            Box::new(GenPdfConverter::new(
                &settings.fonts_path,
                &settings.font_family,
                &settings.diagrams_path,
            )),
            OutputRoots::from_settings(settings),
        )
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    pub fn roots(&self) -> &OutputRoots {
        &self.roots
    }

    /// Builds the report for `manager_id`. On failure this run's directories
    /// are removed before returning.
    pub fn build(&self, manager_id: ManagerId) -> Result<ReportDraft, PipelineError> {
        let run = self.roots.allocate(manager_id);
        debug!(manager_id, run = %run.run_id, "pipeline run started");
        self.run_stages(manager_id, run.clone()).map_err(|e| {
            error!(manager_id, stage = %e.stage, run = %run.run_id, error = %e.source, "pipeline run failed");
            run.cleanup();
            e
        })
    }

    fn run_stages(&self, manager_id: ManagerId, run: RunDirs) -> Result<ReportDraft, PipelineError> {
        let fail = |stage: PipelineStage, e: StageError| PipelineError::new(manager_id, stage, e);

        let manager_name = self
            .store
            .manager_name(manager_id)
            .map_err(|e| fail(PipelineStage::ResolveManager, e.into()))?;

        let views = self
            .store
            .manager_views(manager_id)
            .map_err(|e| fail(PipelineStage::FetchViews, e.into()))?;

        let charts = ChartRenderer::new(&run.charts_root).render_all(&views, manager_id);
        if !charts.missing().is_empty() {
            debug!(manager_id, missing = ?charts.missing(), "charts not produced");
        }

        let label = display_name(manager_id, manager_name.as_deref());
        let html = self
            .renderer
            .render(&ReportInput {
                manager_id,
                manager_name: &label,
                views: &views,
                charts: &charts,
            })
            .map_err(|e| fail(PipelineStage::RenderHtml, e.into()))?;

        let timestamp = chrono::Local::now().format(PDF_TIMESTAMP_FORMAT).to_string();
        let pdf_path = run.pdf_path(&timestamp);
        self.converter
            .convert(&html, &pdf_path)
            .map_err(|e| fail(PipelineStage::ConvertPdf, e.into()))?;

        info!(
            manager_id,
            run = %run.run_id,
            charts = charts.len(),
            pdf = %pdf_path.display(),
            "report built"
        );
        Ok(ReportDraft {
            manager_id,
            manager_name,
            has_data: !views.is_empty(),
            html,
            pdf_path,
            charts,
            run,
        })
    }
}
