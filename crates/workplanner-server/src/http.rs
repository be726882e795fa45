//! HTTP front end.
//!
//! Routes:
//! - `GET /healthz` (no auth)
//! - `GET /reports/manager/{id}/pdf` → PDF download
//! - `GET /reports/manager/{id}/html` → report markup
//!
//! Report routes check the bearer token before any pipeline work starts.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use workplanner_core::ManagerId;

use crate::auth::authorize;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Pdf,
    Html,
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Health,
    Report { id: &'a str, format: ReportFormat },
    NotFound,
}

fn route(path: &str) -> Route<'_> {
    if path == "/healthz" {
        return Route::Health;
    }
    let Some(rest) = path.strip_prefix("/reports/manager/") else {
        return Route::NotFound;
    };
    match rest.split_once('/') {
        Some((id, "pdf")) if !id.is_empty() => Route::Report {
            id,
            format: ReportFormat::Pdf,
        },
        Some((id, "html")) if !id.is_empty() => Route::Report {
            id,
            format: ReportFormat::Html,
        },
        _ => Route::NotFound,
    }
}

/// Serves HTTP on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("http: failed to read bound addr: {e}"))?;
    info!(addr = %bound, "http listening");

    tokio::pin!(shutdown);
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => {
                accepted.map_err(|e| anyhow!("http: accept failed: {e}"))?
            }
            _ = &mut shutdown => {
                info!("http shutting down");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer, error = %e, "http connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().to_string();

    let resp = match (req.method(), route(&path)) {
        (&Method::GET, Route::Health) => text_response(StatusCode::OK, "ok\n"),
        (&Method::GET, Route::Report { id, format }) => match require_token(&req, &state) {
            Err(resp) => resp,
            Ok(()) => match id.parse::<ManagerId>() {
                Err(_) => json_error(StatusCode::BAD_REQUEST, &format!("invalid manager id `{id}`")),
                Ok(id) => report_response(&state, id, format).await,
            },
        },
        (_, Route::NotFound) => json_error(StatusCode::NOT_FOUND, "not found"),
        _ => json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
    };

    Ok(resp)
}

fn require_token(req: &Request<Incoming>, state: &AppState) -> Result<(), Response<Full<Bytes>>> {
    let header = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    authorize(state.verifier.as_ref(), header).map_err(|e| {
        warn!(path = %req.uri().path(), reason = %e, "http call rejected");
        let mut resp = json_error(StatusCode::UNAUTHORIZED, &e.to_string());
        resp.headers_mut()
            .insert(WWW_AUTHENTICATE, hyper::header::HeaderValue::from_static("Bearer"));
        resp
    })
}

async fn report_response(
    state: &Arc<AppState>,
    manager_id: ManagerId,
    format: ReportFormat,
) -> Response<Full<Bytes>> {
    let service = state.service.clone();
    match format {
        ReportFormat::Pdf => {
            let joined = tokio::task::spawn_blocking(move || service.manager_pdf(manager_id)).await;
            match joined {
                Ok(Ok(pdf)) if pdf.is_empty() => {
                    error!(manager_id, "generated pdf is empty");
                    json_error(StatusCode::INTERNAL_SERVER_ERROR, "generated PDF is empty")
                }
                Ok(Ok(pdf)) => pdf_response(manager_id, pdf),
                Ok(Err(e)) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
                Err(e) => json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("report task failed: {e}"),
                ),
            }
        }
        ReportFormat::Html => {
            let joined = tokio::task::spawn_blocking(move || service.manager_html(manager_id)).await;
            match joined {
                Ok(Ok(Some(html))) => html_response(html),
                Ok(Ok(None)) => json_error(
                    StatusCode::NOT_FOUND,
                    &format!("no report for manager {manager_id}"),
                ),
                Ok(Err(e)) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
                Err(e) => json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("report task failed: {e}"),
                ),
            }
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

fn internal_error_response() -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}")));
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| internal_error_response())
}

fn html_response(html: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(html)))
        .unwrap_or_else(|_| internal_error_response())
}

fn pdf_response(manager_id: ManagerId, pdf: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/pdf")
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"manager_{manager_id}.pdf\""),
        )
        .body(Full::new(Bytes::from(pdf)))
        .unwrap_or_else(|_| internal_error_response())
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| internal_error_response())
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": msg }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_report_paths() {
        assert_eq!(route("/healthz"), Route::Health);
        assert_eq!(
            route("/reports/manager/42/pdf"),
            Route::Report {
                id: "42",
                format: ReportFormat::Pdf
            }
        );
        assert_eq!(
            route("/reports/manager/abc/html"),
            Route::Report {
                id: "abc",
                format: ReportFormat::Html
            }
        );
        assert_eq!(route("/reports/manager//pdf"), Route::NotFound);
        assert_eq!(route("/reports/manager/42/csv"), Route::NotFound);
        assert_eq!(route("/reports/manager/42"), Route::NotFound);
        assert_eq!(route("/"), Route::NotFound);
    }

    #[test]
    fn pdf_response_is_an_attachment() {
        let resp = pdf_response(7, b"%PDF".to_vec());
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/pdf");
        assert_eq!(
            resp.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"manager_7.pdf\""
        );
    }
}
