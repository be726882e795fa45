use super::*;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use workplanner_core::{ChartKind, DataError, ManagerId, ReportStore, TabularView, ViewName, ViewScope};
use workplanner_store::SqliteReportStore;

const FIXTURE: &str = include_str!("../../workplanner-store/fixtures/workplanner.sql");
const TEMPLATES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../templates");

fn fixture_store() -> Arc<dyn ReportStore> {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(FIXTURE).unwrap();
    Arc::new(SqliteReportStore::from_connection(conn))
}

/// Writes the markup behind a PDF header so tests can inspect what was converted.
struct EchoConverter;

impl DocumentConverter for EchoConverter {
    fn convert(&self, markup: &str, output_path: &Path) -> Result<(), RenderError> {
        fs::create_dir_all(output_path.parent().unwrap()).unwrap();
        fs::write(output_path, format!("%PDF-echo\n{markup}")).unwrap();
        Ok(())
    }
}

struct FailingConverter;

impl DocumentConverter for FailingConverter {
    fn convert(&self, _markup: &str, _output_path: &Path) -> Result<(), RenderError> {
        Err(RenderError::Conversion("engine crashed".into()))
    }
}

fn pipeline(root: &Path, store: Arc<dyn ReportStore>) -> ReportPipeline {
    ReportPipeline::new(
        store,
        Box::new(TemplateReportRenderer::new(TEMPLATES)),
        Box::new(EchoConverter),
        OutputRoots::new(root.join("diagrams"), root.join("pdf")),
    )
}

#[test]
fn busy_manager_gets_full_report() {
    let dir = tempfile::tempdir().unwrap();
    let draft = pipeline(dir.path(), fixture_store()).build(42).unwrap();

    assert_eq!(draft.manager_name.as_deref(), Some("Ada Lovelace"));
    assert!(draft.has_data);
    assert!(draft.html.contains("Ada Lovelace"));
    assert!(draft.html.contains("Compiler"));
    assert!(draft.pdf_path.starts_with(dir.path().join("pdf")));
    assert!(draft.pdf_path.exists());
    let name = draft.pdf_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("manager_42_") && name.ends_with(".pdf"), "{name}");
    assert_eq!(draft.charts.len(), 3);

    let report = package(&draft);
    assert_eq!(report.manager_id, 42);
    assert!(report.pdf.starts_with(b"%PDF"));
    assert_eq!(report.charts.len(), 3);
    for chart in &report.charts {
        assert!(!chart.is_empty(), "{} has no data", chart.title);
        let bytes = package::decode(&chart.data).unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
    }

    draft.run.cleanup();
    assert!(!draft.pdf_path.exists());
    assert!(!draft.run.charts_root.exists());
}

#[test]
fn unknown_manager_gets_fallback_label_and_empty_charts() {
    let dir = tempfile::tempdir().unwrap();
    let draft = pipeline(dir.path(), fixture_store()).build(999).unwrap();

    assert_eq!(draft.manager_name, None);
    assert!(!draft.has_data);
    assert!(draft.html.contains("Manager 999"));
    assert!(!draft.html.contains("<img"));
    assert!(draft.charts.is_empty());
    assert_eq!(draft.charts.missing(), ChartKind::ALL.to_vec());

    let report = package(&draft);
    assert_eq!(report.charts.len(), 3);
    assert!(report.charts.iter().all(|c| c.is_empty()));
    assert!(!report.pdf.is_empty());
    draft.run.cleanup();
}

#[test]
fn concurrent_runs_do_not_share_directories() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(dir.path(), fixture_store());
    let a = pipeline.build(42).unwrap();
    let b = pipeline.build(42).unwrap();
    assert_ne!(a.run.run_id, b.run.run_id);

    a.run.cleanup();
    assert!(b.pdf_path.exists());
    assert!(resolve(&b, ChartKind::MonthlyHours).exists());
    b.run.cleanup();
}

fn resolve(draft: &ReportDraft, kind: ChartKind) -> std::path::PathBuf {
    charts::resolve_reference(draft.charts.get(kind).unwrap()).unwrap()
}

#[test]
fn conversion_failure_names_the_stage_and_removes_run_output() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ReportPipeline::new(
        fixture_store(),
        Box::new(TemplateReportRenderer::new(TEMPLATES)),
        Box::new(FailingConverter),
        OutputRoots::new(dir.path().join("diagrams"), dir.path().join("pdf")),
    );
    let err = pipeline.build(42).unwrap_err();
    assert_eq!(err.manager_id, 42);
    assert_eq!(err.stage, PipelineStage::ConvertPdf);
    assert!(!err.is_data_unavailable());

    let leftovers = fs::read_dir(dir.path().join("diagrams"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn missing_template_fails_render_stage() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = ReportPipeline::new(
        fixture_store(),
        Box::new(TemplateReportRenderer::new(dir.path().join("no-templates"))),
        Box::new(EchoConverter),
        OutputRoots::new(dir.path().join("diagrams"), dir.path().join("pdf")),
    );
    let err = pipeline.build(1).unwrap_err();
    assert_eq!(err.stage, PipelineStage::RenderHtml);
    assert!(matches!(
        err.source,
        StageError::Render(RenderError::TemplateNotFound(_))
    ));
}

/// Store whose view reads always fail.
struct DownStore;

impl ReportStore for DownStore {
    fn project_employee_hours(
        &self,
        _scope: ViewScope,
    ) -> Result<TabularView<workplanner_core::ProjectEmployeeHoursRow>, DataError> {
        Err(DataError::Unavailable {
            view: ViewName::ProjectEmployeeTotalHours,
            message: "connection reset".into(),
        })
    }
    fn average_duration(
        &self,
        _scope: ViewScope,
    ) -> Result<TabularView<workplanner_core::AverageDurationRow>, DataError> {
        Ok(TabularView::default())
    }
    fn duration_variance(
        &self,
        _scope: ViewScope,
    ) -> Result<TabularView<workplanner_core::DurationVarianceRow>, DataError> {
        Ok(TabularView::default())
    }
    fn monthly_hours(
        &self,
        _scope: ViewScope,
    ) -> Result<TabularView<workplanner_core::MonthlyHoursRow>, DataError> {
        Ok(TabularView::default())
    }
    fn manager_name(&self, _manager_id: ManagerId) -> Result<Option<String>, DataError> {
        Ok(Some("Someone".into()))
    }
    fn all_manager_ids(&self) -> Vec<ManagerId> {
        Vec::new()
    }
}

#[test]
fn store_outage_aborts_at_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let err = pipeline(dir.path(), Arc::new(DownStore)).build(42).unwrap_err();
    assert_eq!(err.stage, PipelineStage::FetchViews);
    assert!(err.is_data_unavailable());
    assert!(!dir.path().join("pdf").exists());
}

#[test]
fn partially_empty_views_degrade_only_their_chart() {
    let dir = tempfile::tempdir().unwrap();
    // Manager 2 has hours logged but no finished project.
    let draft = pipeline(dir.path(), fixture_store()).build(2).unwrap();
    assert_eq!(draft.charts.missing(), vec![ChartKind::DurationVariance]);
    assert!(draft.html.contains("No completed projects."));

    let report = package(&draft);
    let empty: Vec<_> = report
        .charts
        .iter()
        .filter(|c| c.is_empty())
        .map(|c| c.title.as_str())
        .collect();
    assert_eq!(empty, ["duration_variance"]);
    draft.run.cleanup();
}
