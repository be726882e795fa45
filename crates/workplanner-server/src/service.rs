//! Report operations shared by both front ends.
//!
//! Every single-manager operation builds, packages and then removes its own
//! run directories, whether or not packaging succeeded. The batch operation
//! runs managers on a bounded rayon pool and keeps going past failures.

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use workplanner_core::model::display_name;
use workplanner_core::{ManagerId, ManagerReport, ReportStore, Settings};
use workplanner_reports::{package, PipelineError, ReportDraft, ReportPipeline};

/// One manager the batch could not build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub manager_id: ManagerId,
    pub stage: String,
    pub message: String,
}

impl From<&PipelineError> for BatchFailure {
    fn from(e: &PipelineError) -> Self {
        Self {
            manager_id: e.manager_id,
            stage: e.stage.to_string(),
            message: e.source.to_string(),
        }
    }
}

/// Result of the all-managers operation, in enumeration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reports: Vec<ManagerReport>,
    pub failures: Vec<BatchFailure>,
}

pub struct ReportService {
    pipeline: ReportPipeline,
    batch_pool: rayon::ThreadPool,
}

impl ReportService {
    pub fn new(
        pipeline: ReportPipeline,
        batch_parallelism: usize,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let batch_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(batch_parallelism.max(1))
            .thread_name(|i| format!("report-batch-{i}"))
            .build()?;
        Ok(Self {
            pipeline,
            batch_pool,
        })
    }

    pub fn from_settings(
        store: Arc<dyn ReportStore>,
        settings: &Settings,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        Self::new(
            ReportPipeline::from_settings(store, settings),
            settings.batch_parallelism,
        )
    }

    pub fn pipeline(&self) -> &ReportPipeline {
        &self.pipeline
    }

    /// Builds a draft, hands it to `f`, then removes the run's output.
    fn with_draft<T>(
        &self,
        manager_id: ManagerId,
        f: impl FnOnce(&ReportDraft) -> T,
    ) -> Result<T, PipelineError> {
        let draft = self.pipeline.build(manager_id)?;
        let out = f(&draft);
        draft.run.cleanup();
        Ok(out)
    }

    /// Full packaged report for one manager.
    pub fn manager_report(&self, manager_id: ManagerId) -> Result<ManagerReport, PipelineError> {
        self.with_draft(manager_id, package)
    }

    /// Report markup, `None` for a manager with neither a name nor any data.
    pub fn manager_html(&self, manager_id: ManagerId) -> Result<Option<String>, PipelineError> {
        self.with_draft(manager_id, |draft| {
            let empty = draft.html.trim().is_empty()
                || (draft.manager_name.is_none() && !draft.has_data);
            (!empty).then(|| draft.html.clone())
        })
    }

    /// PDF bytes; empty when the generated document could not be read back.
    pub fn manager_pdf(&self, manager_id: ManagerId) -> Result<Vec<u8>, PipelineError> {
        self.with_draft(manager_id, |draft| package::read_pdf(&draft.pdf_path))
    }

    /// The single-manager report wrapped in a list.
    pub fn all_reports_of_manager(
        &self,
        manager_id: ManagerId,
    ) -> Result<Vec<ManagerReport>, PipelineError> {
        Ok(vec![self.manager_report(manager_id)?])
    }

    pub fn manager_ids(&self) -> Vec<ManagerId> {
        self.pipeline.store().all_manager_ids()
    }

    /// Reports for every known manager. A manager whose run fails is logged
    /// and listed in `failures`; the rest of the batch continues. Managers
    /// without a stored name are labelled `Manager {id}`.
    pub fn all_manager_reports(&self) -> BatchReport {
        let ids = self.manager_ids();
        if ids.is_empty() {
            info!("no managers to report on");
            return BatchReport::default();
        }

        let results: Vec<Result<ManagerReport, PipelineError>> = self.batch_pool.install(|| {
            ids.par_iter()
                .map(|&id| {
                    self.manager_report(id).map(|mut report| {
                        let label = display_name(id, report.manager_name.as_deref());
                        report.manager_name = Some(label);
                        report
                    })
                })
                .collect()
        });

        let mut batch = BatchReport::default();
        for result in results {
            match result {
                Ok(report) => batch.reports.push(report),
                Err(e) => {
                    warn!(
                        manager_id = e.manager_id,
                        stage = %e.stage,
                        error = %e.source,
                        "skipping manager in batch"
                    );
                    batch.failures.push(BatchFailure::from(&e));
                }
            }
        }
        info!(
            managers = ids.len(),
            built = batch.reports.len(),
            failed = batch.failures.len(),
            "batch finished"
        );
        batch
    }
}
