//! Workplanner report serving layer.
//!
//! Two front ends over one [`ReportService`]:
//! - [`http`]: hyper server with per-endpoint bearer checks,
//! - [`rpc`]: framed `prost` request/response service behind an
//!   [`rpc::AuthInterceptor`] and a bounded worker pool.

pub mod auth;
pub mod config;
pub mod http;
pub mod rpc;
pub mod service;

use std::sync::Arc;

use anyhow::{Context, Result};

use workplanner_core::{ReportStore, Settings};
use workplanner_store::SqliteReportStore;

pub use auth::{AuthError, CredentialVerifier, StaticTokenVerifier};
pub use service::{BatchFailure, BatchReport, ReportService};

/// State shared by the HTTP handlers.
pub struct AppState {
    pub service: Arc<ReportService>,
    pub verifier: Arc<dyn CredentialVerifier>,
}

impl AppState {
    pub fn new(service: Arc<ReportService>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { service, verifier }
    }

    /// RPC server over the same service and verifier.
    pub fn rpc_server(&self, workers: usize) -> rpc::RpcServer {
        rpc::RpcServer::new(
            self.service.clone(),
            rpc::AuthInterceptor::new(self.verifier.clone()),
            workers,
        )
    }
}

/// Opens the configured store and wires the default pipeline.
pub fn build_state(settings: &Settings) -> Result<AppState> {
    settings.validate().context("invalid settings")?;
    let store: Arc<dyn ReportStore> = Arc::new(
        SqliteReportStore::open(settings.database_path())
            .with_context(|| format!("opening {}", settings.database_path()))?,
    );
    let service = ReportService::from_settings(store, settings)
        .context("building batch worker pool")?;
    Ok(AppState::new(
        Arc::new(service),
        Arc::new(StaticTokenVerifier::new(settings.api_key.clone())),
    ))
}

#[cfg(test)]
mod tests;
