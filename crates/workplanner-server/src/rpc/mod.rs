//! RPC front end.
//!
//! Each frame on the wire is a 4-byte big-endian length followed by a
//! `prost`-encoded [`proto::RpcRequest`] or [`proto::RpcResponse`]. A
//! connection carries any number of calls in order. Most calls are answered
//! with one response frame; `GetAllManagerReports` streams one frame per
//! report (`more = true`) and ends with an empty `Ok` frame. A reply that
//! would not fit in a frame becomes a `ResourceExhausted` status.
//!
//! The [`AuthInterceptor`] runs on every call before dispatch. Accepted calls
//! then wait for one of a fixed number of worker permits and execute on the
//! blocking pool, so at most `rpc_workers` reports are built at once.

mod client;
pub mod proto;

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use workplanner_core::{ManagerId, ManagerReport};

use crate::auth::{authorize, AuthError, CredentialVerifier};
use crate::service::ReportService;
use proto::{Code, RpcRequest, RpcResponse};

pub use client::RpcClient;

/// Largest accepted frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Metadata key holding `Bearer <token>`.
pub const AUTHORIZATION_KEY: &str = "authorization";

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error("undecodable message: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("connection closed by peer")]
    Closed,
    #[error("{code:?}: {message}")]
    Status { code: Code, message: String },
}

impl RpcError {
    /// Status code of a remote rejection, if this is one.
    pub fn code(&self) -> Option<Code> {
        match self {
            RpcError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// ============================================================================
// Framing
// ============================================================================

/// Reads one frame of at most `max` bytes; `None` when the stream ends
/// between frames. A stream ending inside a frame is an error.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max: usize,
) -> Result<Option<Vec<u8>>, RpcError> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("truncated frame header ({filled} of 4 bytes)"),
            )
            .into());
        }
        filled += n;
    }
    let len = u32::from_be_bytes(header) as usize;
    if len > max {
        return Err(RpcError::FrameTooLarge { len, max });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    max: usize,
) -> Result<(), RpcError> {
    if payload.len() > max {
        return Err(RpcError::FrameTooLarge {
            len: payload.len(),
            max,
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

// ============================================================================
// Methods
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    GetManagerHtml,
    GetManagerPdf,
    GetAllReportsOfManager,
    GetAllManagerReports,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 4] = [
        RpcMethod::GetManagerHtml,
        RpcMethod::GetManagerPdf,
        RpcMethod::GetAllReportsOfManager,
        RpcMethod::GetAllManagerReports,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RpcMethod::GetManagerHtml => "GetManagerHTML",
            RpcMethod::GetManagerPdf => "GetManagerPDF",
            RpcMethod::GetAllReportsOfManager => "GetAllReportsOfManager",
            RpcMethod::GetAllManagerReports => "GetAllManagerReports",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

// ============================================================================
// Server
// ============================================================================

/// Rejects calls whose `authorization` metadata does not pass the verifier.
#[derive(Clone)]
pub struct AuthInterceptor {
    verifier: Arc<dyn CredentialVerifier>,
}

impl AuthInterceptor {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { verifier }
    }

    pub fn intercept(&self, metadata: &HashMap<String, String>) -> Result<(), AuthError> {
        let header = metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(AUTHORIZATION_KEY))
            .map(|(_, v)| v.as_str());
        authorize(self.verifier.as_ref(), header)
    }
}

/// What a call sends back: one response, or a stream of reports.
#[derive(Debug)]
pub enum Reply {
    Unary(RpcResponse),
    Reports(Vec<ManagerReport>),
}

impl From<RpcResponse> for Reply {
    fn from(response: RpcResponse) -> Self {
        Reply::Unary(response)
    }
}

pub struct RpcServer {
    service: Arc<ReportService>,
    interceptor: AuthInterceptor,
    workers: Arc<Semaphore>,
    max_frame_len: usize,
}

impl RpcServer {
    pub fn new(
        service: Arc<ReportService>,
        interceptor: AuthInterceptor,
        workers: usize,
    ) -> Self {
        Self {
            service,
            interceptor,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Caps outgoing and incoming frames at `max` bytes.
    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    /// Serves RPC on `listener` until `shutdown` resolves.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let bound = listener
            .local_addr()
            .map_err(|e| anyhow!("rpc: failed to read bound addr: {e}"))?;
        info!(addr = %bound, workers = self.workers.available_permits(), "rpc listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => {
                    accepted.map_err(|e| anyhow!("rpc: accept failed: {e}"))?
                }
                _ = &mut shutdown => {
                    info!("rpc shutting down");
                    return Ok(());
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    debug!(%peer, error = %e, "rpc connection closed with error");
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), RpcError> {
        while let Some(frame) = read_frame(&mut stream, self.max_frame_len).await? {
            let reply = match RpcRequest::decode(frame.as_slice()) {
                Ok(request) => self.dispatch(request).await,
                Err(e) => {
                    RpcResponse::status(Code::InvalidArgument, format!("bad request frame: {e}"))
                        .into()
                }
            };
            self.send(&mut stream, reply).await?;
        }
        Ok(())
    }

    /// Writes a reply. Streams end with an empty `Ok` frame, or with a
    /// `ResourceExhausted` status at the first report too large for a frame.
    pub async fn send<W: AsyncWrite + Unpin>(&self, writer: &mut W, reply: Reply) -> Result<(), RpcError> {
        let reports = match reply {
            Reply::Unary(response) => return self.send_response(writer, response).await,
            Reply::Reports(reports) => reports,
        };
        let total = reports.len();
        for (sent, report) in reports.into_iter().enumerate() {
            let manager_id = report.manager_id;
            let frame = RpcResponse::item(proto::ManagerReport::from(report).encode_to_vec()).encode_to_vec();
            if frame.len() > self.max_frame_len {
                warn!(
                    manager_id,
                    bytes = frame.len(),
                    limit = self.max_frame_len,
                    sent,
                    total,
                    "report exceeds the frame limit, ending stream"
                );
                let status = RpcResponse::status(
                    Code::ResourceExhausted,
                    format!(
                        "report for manager {manager_id} is {} bytes, over the {} byte frame limit",
                        frame.len(),
                        self.max_frame_len
                    ),
                );
                return write_frame(writer, &status.encode_to_vec(), self.max_frame_len).await;
            }
            write_frame(writer, &frame, self.max_frame_len).await?;
        }
        debug!(reports = total, "report stream complete");
        self.send_response(writer, RpcResponse::ok(Vec::new())).await
    }

    async fn send_response<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        response: RpcResponse,
    ) -> Result<(), RpcError> {
        let mut frame = response.encode_to_vec();
        if frame.len() > self.max_frame_len {
            warn!(bytes = frame.len(), limit = self.max_frame_len, "response exceeds the frame limit");
            frame = RpcResponse::status(
                Code::ResourceExhausted,
                format!(
                    "response of {} bytes exceeds the {} byte frame limit",
                    frame.len(),
                    self.max_frame_len
                ),
            )
            .encode_to_vec();
        }
        write_frame(writer, &frame, self.max_frame_len).await
    }

    /// Authorizes, then runs the method on a worker.
    pub async fn dispatch(&self, request: RpcRequest) -> Reply {
        if let Err(e) = self.interceptor.intercept(&request.metadata) {
            warn!(method = %request.method, reason = %e, "rpc call rejected");
            return RpcResponse::status(Code::Unauthenticated, e.to_string()).into();
        }
        let Some(method) = RpcMethod::parse(&request.method) else {
            return RpcResponse::status(
                Code::Unimplemented,
                format!("unknown method `{}`", request.method),
            )
            .into();
        };

        let permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return RpcResponse::status(Code::Unavailable, "server shutting down").into(),
        };
        let service = self.service.clone();
        let payload = request.payload;
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            call(&service, method, &payload)
        })
        .await;
        joined.unwrap_or_else(|e| {
            error!(method = method.name(), error = %e, "rpc worker failed");
            RpcResponse::status(Code::Internal, "worker failed").into()
        })
    }
}

fn manager_id(payload: &[u8]) -> Result<ManagerId, RpcResponse> {
    proto::ManagerRequest::decode(payload)
        .map(|r| r.manager_id)
        .map_err(|e| RpcResponse::status(Code::InvalidArgument, format!("bad ManagerRequest: {e}")))
}

fn call(service: &ReportService, method: RpcMethod, payload: &[u8]) -> Reply {
    let internal = |e: workplanner_reports::PipelineError| -> Reply {
        RpcResponse::status(Code::Internal, e.to_string()).into()
    };
    match method {
        RpcMethod::GetManagerHtml => {
            let id = match manager_id(payload) {
                Ok(id) => id,
                Err(resp) => return resp.into(),
            };
            match service.manager_html(id) {
                Ok(Some(html)) => RpcResponse::ok(proto::HtmlResponse { html }.encode_to_vec()).into(),
                Ok(None) => {
                    RpcResponse::status(Code::NotFound, format!("no report for manager {id}")).into()
                }
                Err(e) => internal(e),
            }
        }
        RpcMethod::GetManagerPdf => {
            let id = match manager_id(payload) {
                Ok(id) => id,
                Err(resp) => return resp.into(),
            };
            match service.manager_pdf(id) {
                Ok(pdf) if pdf.is_empty() => {
                    RpcResponse::status(Code::Internal, "generated PDF is empty").into()
                }
                Ok(pdf) => RpcResponse::ok(proto::PdfResponse { pdf }.encode_to_vec()).into(),
                Err(e) => internal(e),
            }
        }
        RpcMethod::GetAllReportsOfManager => {
            let id = match manager_id(payload) {
                Ok(id) => id,
                Err(resp) => return resp.into(),
            };
            match service.all_reports_of_manager(id) {
                Ok(reports) => RpcResponse::ok(report_list(reports)).into(),
                Err(e) => internal(e),
            }
        }
        RpcMethod::GetAllManagerReports => {
            if let Err(e) = proto::Empty::decode(payload) {
                return RpcResponse::status(Code::InvalidArgument, format!("bad Empty: {e}")).into();
            }
            // Failures are already logged by the batch; only built reports travel.
            Reply::Reports(service.all_manager_reports().reports)
        }
    }
}

fn report_list(reports: Vec<ManagerReport>) -> Vec<u8> {
    proto::ReportList {
        reports: reports.into_iter().map(proto::ManagerReport::from).collect(),
    }
    .encode_to_vec()
}
