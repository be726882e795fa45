use super::*;

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use prost::Message;
use rusqlite::Connection;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use workplanner_core::{
    AverageDurationRow, DataError, DurationVarianceRow, ManagerId, MonthlyHoursRow,
    ProjectEmployeeHoursRow, TabularView, ViewScope,
};
use workplanner_reports::{
    DocumentConverter, OutputRoots, RenderError, ReportInput, ReportPipeline, ReportRenderer,
    TemplateReportRenderer,
};

use crate::rpc::proto::{self, Code, RpcResponse};
use crate::rpc::{RpcClient, RpcError};

const FIXTURE: &str = include_str!("../../workplanner-store/fixtures/workplanner.sql");
const TEMPLATES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../templates");
const TOKEN: &str = "s3cret";

// ============================================================================
// Fixtures
// ============================================================================

/// Fixture store that counts every read and can pin the manager list.
struct CountingStore {
    inner: SqliteReportStore,
    reads: AtomicUsize,
    ids: Option<Vec<ManagerId>>,
}

impl CountingStore {
    fn new(ids: Option<Vec<ManagerId>>) -> Self {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(FIXTURE).unwrap();
        Self {
            inner: SqliteReportStore::from_connection(conn),
            reads: AtomicUsize::new(0),
            ids,
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

impl ReportStore for CountingStore {
    fn project_employee_hours(
        &self,
        scope: ViewScope,
    ) -> Result<TabularView<ProjectEmployeeHoursRow>, DataError> {
        self.hit();
        self.inner.project_employee_hours(scope)
    }
    fn average_duration(&self, scope: ViewScope) -> Result<TabularView<AverageDurationRow>, DataError> {
        self.hit();
        self.inner.average_duration(scope)
    }
    fn duration_variance(
        &self,
        scope: ViewScope,
    ) -> Result<TabularView<DurationVarianceRow>, DataError> {
        self.hit();
        self.inner.duration_variance(scope)
    }
    fn monthly_hours(&self, scope: ViewScope) -> Result<TabularView<MonthlyHoursRow>, DataError> {
        self.hit();
        self.inner.monthly_hours(scope)
    }
    fn manager_name(&self, manager_id: ManagerId) -> Result<Option<String>, DataError> {
        self.hit();
        self.inner.manager_name(manager_id)
    }
    fn all_manager_ids(&self) -> Vec<ManagerId> {
        self.hit();
        self.ids
            .clone()
            .unwrap_or_else(|| self.inner.all_manager_ids())
    }
}

struct EchoConverter;

impl DocumentConverter for EchoConverter {
    fn convert(&self, markup: &str, output_path: &Path) -> Result<(), RenderError> {
        fs::create_dir_all(output_path.parent().unwrap()).unwrap();
        fs::write(output_path, format!("%PDF-echo\n{markup}")).unwrap();
        Ok(())
    }
}

/// Template renderer that fails for one manager.
struct FailFor {
    manager_id: ManagerId,
    inner: TemplateReportRenderer,
}

impl ReportRenderer for FailFor {
    fn render(&self, input: &ReportInput<'_>) -> Result<String, RenderError> {
        if input.manager_id == self.manager_id {
            return Err(RenderError::MalformedTemplate {
                path: PathBuf::from("report.html"),
                reason: "injected".into(),
            });
        }
        self.inner.render(input)
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    root: PathBuf,
    store: Arc<CountingStore>,
    service: Arc<ReportService>,
}

fn harness(ids: Option<Vec<ManagerId>>, fail_for: Option<ManagerId>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let store = Arc::new(CountingStore::new(ids));
    let renderer: Box<dyn ReportRenderer> = match fail_for {
        Some(manager_id) => Box::new(FailFor {
            manager_id,
            inner: TemplateReportRenderer::new(TEMPLATES),
        }),
        None => Box::new(TemplateReportRenderer::new(TEMPLATES)),
    };
    let pipeline = ReportPipeline::new(
        store.clone(),
        renderer,
        Box::new(EchoConverter),
        OutputRoots::new(root.join("diagrams"), root.join("pdf")),
    );
    Harness {
        _dir: dir,
        root,
        store,
        service: Arc::new(ReportService::new(pipeline, 2).unwrap()),
    }
}

fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

// ============================================================================
// Service
// ============================================================================

#[test]
fn single_report_cleans_up_its_run() {
    let h = harness(None, None);
    let report = h.service.manager_report(42).unwrap();
    assert_eq!(report.manager_name.as_deref(), Some("Ada Lovelace"));
    assert!(report.charts.iter().all(|c| !c.is_empty()));
    assert!(report.pdf.starts_with(b"%PDF"));
    assert!(dir_is_empty(&h.root.join("diagrams")));
    assert!(dir_is_empty(&h.root.join("pdf")));
}

#[test]
fn html_for_an_unknown_manager_is_none() {
    let h = harness(None, None);
    assert_eq!(h.service.manager_html(999).unwrap(), None);
    let html = h.service.manager_html(3).unwrap().unwrap();
    assert!(html.contains("Barbara Liskov"));
}

#[test]
fn batch_skips_a_failing_manager_and_keeps_order() {
    let h = harness(Some(vec![1, 2, 3]), Some(2));
    let batch = h.service.all_manager_reports();

    let ids: Vec<_> = batch.reports.iter().map(|r| r.manager_id).collect();
    assert_eq!(ids, [1, 3]);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].manager_id, 2);
    assert_eq!(batch.failures[0].stage, "render_html");
    assert!(dir_is_empty(&h.root.join("diagrams")));
}

#[test]
fn batch_labels_nameless_managers() {
    let h = harness(Some(vec![999, 42]), None);
    let batch = h.service.all_manager_reports();
    let names: Vec<_> = batch
        .reports
        .iter()
        .map(|r| r.manager_name.clone().unwrap())
        .collect();
    assert_eq!(names, ["Manager 999", "Ada Lovelace"]);
    assert!(batch.failures.is_empty());
}

#[test]
fn empty_enumeration_yields_an_empty_batch() {
    let h = harness(Some(vec![]), None);
    let batch = h.service.all_manager_reports();
    assert!(batch.reports.is_empty());
    assert!(batch.failures.is_empty());
}

// ============================================================================
// RPC
// ============================================================================

async fn start_rpc(h: &Harness, key: Option<&str>) -> (std::net::SocketAddr, oneshot::Sender<()>) {
    start_rpc_with_limit(h, key, rpc::MAX_FRAME_LEN).await
}

async fn start_rpc_with_limit(
    h: &Harness,
    key: Option<&str>,
    max_frame_len: usize,
) -> (std::net::SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(
        h.service.clone(),
        Arc::new(StaticTokenVerifier::new(key.map(str::to_string))),
    );
    let server = Arc::new(state.rpc_server(2).with_max_frame_len(max_frame_len));
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.serve(listener, async move {
        let _ = rx.await;
    }));
    (addr, tx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unauthorized_rpc_calls_never_touch_the_store() {
    let h = harness(None, None);

    for (key, token) in [(Some(TOKEN), None), (Some(TOKEN), Some("wrong")), (None, Some(TOKEN))] {
        let (addr, _stop) = start_rpc(&h, key).await;
        let mut client = RpcClient::connect(addr).await.unwrap();
        if let Some(token) = token {
            client = client.with_token(token);
        }
        let err = client.get_manager_html(42).await.unwrap_err();
        assert_eq!(err.code(), Some(Code::Unauthenticated), "{err}");
        let err = client.get_all_manager_reports().await.unwrap_err();
        assert_eq!(err.code(), Some(Code::Unauthenticated));
    }
    assert_eq!(h.store.reads(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn authorized_rpc_calls_return_reports() {
    let h = harness(Some(vec![1, 42]), None);
    let (addr, _stop) = start_rpc(&h, Some(TOKEN)).await;
    let mut client = RpcClient::connect(addr).await.unwrap().with_token(TOKEN);

    let html = client.get_manager_html(42).await.unwrap();
    assert!(html.contains("Ada Lovelace"));

    let pdf = client.get_manager_pdf(42).await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    let single = client.get_all_reports_of_manager(42).await.unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].charts.len(), 3);

    let all = client.get_all_manager_reports().await.unwrap();
    let ids: Vec<_> = all.iter().map(|r| r.manager_id).collect();
    assert_eq!(ids, [1, 42]);

    let err = client.get_manager_html(999).await.unwrap_err();
    assert_eq!(err.code(), Some(Code::NotFound));

    let err = client
        .call::<_, rpc::proto::Empty>("DeleteEverything", &rpc::proto::Empty {})
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Status { code: Code::Unimplemented, .. }));
}

/// Encoded size of the frame carrying one streamed report.
fn report_frame_len(h: &Harness, manager_id: ManagerId) -> usize {
    let report = h.service.manager_report(manager_id).unwrap();
    RpcResponse::item(proto::ManagerReport::from(report).encode_to_vec()).encoded_len()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_larger_than_one_frame_is_streamed_per_report() {
    let ids = vec![42, 1, 42, 1, 42, 1, 42];
    let h = harness(Some(ids.clone()), None);
    let limit = report_frame_len(&h, 42).max(report_frame_len(&h, 1)) * 2;

    // Packed into a single message, the batch would not fit in a frame.
    let packed = proto::ReportList {
        reports: ids
            .iter()
            .map(|&id| h.service.manager_report(id).unwrap().into())
            .collect(),
    };
    assert!(RpcResponse::ok(packed.encode_to_vec()).encoded_len() > limit);

    let (addr, _stop) = start_rpc_with_limit(&h, Some(TOKEN), limit).await;
    let mut client = RpcClient::connect(addr).await.unwrap().with_token(TOKEN);
    let all = client.get_all_manager_reports().await.unwrap();
    let got: Vec<_> = all.iter().map(|r| r.manager_id).collect();
    assert_eq!(got, ids);
    assert!(all.iter().all(|r| r.pdf.starts_with(b"%PDF")));

    // The connection stays usable after the stream.
    let html = client.get_manager_html(42).await.unwrap();
    assert!(html.contains("Ada Lovelace"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replies_over_the_frame_limit_are_resource_exhausted() {
    let h = harness(Some(vec![42]), None);
    let limit = report_frame_len(&h, 42) / 2;
    let (addr, _stop) = start_rpc_with_limit(&h, Some(TOKEN), limit).await;
    let mut client = RpcClient::connect(addr).await.unwrap().with_token(TOKEN);

    let err = client.get_all_reports_of_manager(42).await.unwrap_err();
    assert_eq!(err.code(), Some(Code::ResourceExhausted), "{err}");

    let err = client.get_all_manager_reports().await.unwrap_err();
    assert_eq!(err.code(), Some(Code::ResourceExhausted), "{err}");

    let err = client
        .call::<_, proto::Empty>("DeleteEverything", &proto::Empty {})
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(Code::Unimplemented));
}

// ============================================================================
// HTTP
// ============================================================================

async fn start_http(h: &Harness, key: Option<&str>) -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let state = Arc::new(AppState::new(
        h.service.clone(),
        Arc::new(StaticTokenVerifier::new(key.map(str::to_string))),
    ));
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(http::serve(listener, state, async move {
        let _ = rx.await;
    }));
    (addr, tx)
}

/// Raw HTTP/1.1 GET; returns (status, head, body).
fn http_get(addr: &str, path: &str, token: Option<&str>) -> (u16, String, Vec<u8>) {
    let mut stream = std::net::TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).ok();
    let mut request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(token) = token {
        request.push_str(&format!("Authorization: Bearer {token}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).unwrap();
    let split = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    let head = String::from_utf8_lossy(&raw[..split]).into_owned();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    (status, head, raw[split + 4..].to_vec())
}

async fn get(addr: &str, path: &str, token: Option<&str>) -> (u16, String, Vec<u8>) {
    let (addr, path, token) = (addr.to_string(), path.to_string(), token.map(str::to_string));
    tokio::task::spawn_blocking(move || http_get(&addr, &path, token.as_deref()))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_endpoints_enforce_auth_and_status_codes() {
    let h = harness(None, None);
    let (addr, _stop) = start_http(&h, Some(TOKEN)).await;

    let (status, _, body) = get(&addr, "/healthz", None).await;
    assert_eq!((status, body.as_slice()), (200, &b"ok\n"[..]));

    let (status, head, _) = get(&addr, "/reports/manager/42/pdf", None).await;
    assert_eq!(status, 401);
    assert!(head.to_ascii_lowercase().contains("www-authenticate: bearer"));
    let (status, _, _) = get(&addr, "/reports/manager/42/html", Some("wrong")).await;
    assert_eq!(status, 401);
    assert_eq!(h.store.reads(), 0);

    let (status, _, _) = get(&addr, "/reports/manager/abc/html", Some(TOKEN)).await;
    assert_eq!(status, 400);
    let (status, _, _) = get(&addr, "/nope", Some(TOKEN)).await;
    assert_eq!(status, 404);

    let (status, head, body) = get(&addr, "/reports/manager/42/html", Some(TOKEN)).await;
    assert_eq!(status, 200);
    assert!(head.to_ascii_lowercase().contains("content-type: text/html"));
    assert!(String::from_utf8_lossy(&body).contains("Ada Lovelace"));

    let (status, head, body) = get(&addr, "/reports/manager/42/pdf", Some(TOKEN)).await;
    assert_eq!(status, 200);
    let head = head.to_ascii_lowercase();
    assert!(head.contains("content-type: application/pdf"));
    assert!(head.contains("attachment; filename=\"manager_42.pdf\""));
    assert!(body.starts_with(b"%PDF"));

    let (status, _, _) = get(&addr, "/reports/manager/999/html", Some(TOKEN)).await;
    assert_eq!(status, 404);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_without_configured_key_rejects_everything() {
    let h = harness(None, None);
    let (addr, _stop) = start_http(&h, None).await;
    let (status, _, _) = get(&addr, "/reports/manager/42/html", Some(TOKEN)).await;
    assert_eq!(status, 401);
    assert_eq!(h.store.reads(), 0);
}
