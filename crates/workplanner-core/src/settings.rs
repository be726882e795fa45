//! Runtime settings.
//!
//! The binary fills this from flags and environment variables; library code
//! only ever sees the resolved struct.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Worker count of the RPC front end when nothing else is configured.
pub const DEFAULT_RPC_WORKERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database path, optionally prefixed with `sqlite://`.
    pub database_url: String,
    /// Root under which chart images are written.
    pub diagrams_path: PathBuf,
    /// Directory containing `report.html`.
    pub templates_path: PathBuf,
    /// Root under which PDFs are written.
    pub pdf_path: PathBuf,
    /// Directory holding `{font_family}-Regular.ttf` and friends.
    pub fonts_path: PathBuf,
    pub font_family: String,
    /// Shared secret for bearer auth. `None` rejects every call.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub http_host: String,
    pub http_port: u16,
    #[serde(default = "default_rpc_workers")]
    pub rpc_workers: usize,
    #[serde(default = "default_batch_parallelism")]
    pub batch_parallelism: usize,
}

fn default_rpc_workers() -> usize {
    DEFAULT_RPC_WORKERS
}

fn default_batch_parallelism() -> usize {
    4
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("setting `{0}` must not be empty")]
    Empty(&'static str),
    #[error("setting `{0}` must be at least 1")]
    Zero(&'static str),
    #[error("invalid {name} address `{value}`")]
    Address { name: &'static str, value: String },
}

impl Settings {
    /// Rejects values the servers cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.database_path().trim().is_empty() {
            return Err(SettingsError::Empty("database_url"));
        }
        for (name, path) in [
            ("diagrams_path", &self.diagrams_path),
            ("templates_path", &self.templates_path),
            ("pdf_path", &self.pdf_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(SettingsError::Empty(name));
            }
        }
        if self.rpc_workers == 0 {
            return Err(SettingsError::Zero("rpc_workers"));
        }
        if self.batch_parallelism == 0 {
            return Err(SettingsError::Zero("batch_parallelism"));
        }
        self.rpc_addr()?;
        self.http_addr()?;
        Ok(())
    }

    /// Filesystem path of the database with any `sqlite://` scheme removed.
    pub fn database_path(&self) -> &str {
        self.database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))
            .unwrap_or(&self.database_url)
    }

    pub fn rpc_addr(&self) -> Result<SocketAddr, SettingsError> {
        parse_addr("rpc", &self.rpc_host, self.rpc_port)
    }

    pub fn http_addr(&self) -> Result<SocketAddr, SettingsError> {
        parse_addr("http", &self.http_host, self.http_port)
    }
}

fn parse_addr(name: &'static str, host: &str, port: u16) -> Result<SocketAddr, SettingsError> {
    let value = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    value
        .parse()
        .map_err(|_| SettingsError::Address { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            database_url: "sqlite://data/workplanner.db".into(),
            diagrams_path: "out/diagrams".into(),
            templates_path: "templates".into(),
            pdf_path: "out/pdf".into(),
            fonts_path: "fonts".into(),
            font_family: "LiberationSans".into(),
            api_key: Some("secret".into()),
            rpc_host: "127.0.0.1".into(),
            rpc_port: 50051,
            http_host: "0.0.0.0".into(),
            http_port: 8000,
            rpc_workers: DEFAULT_RPC_WORKERS,
            batch_parallelism: 4,
        }
    }

    #[test]
    fn strips_sqlite_scheme() {
        let mut s = settings();
        assert_eq!(s.database_path(), "data/workplanner.db");
        s.database_url = "sqlite:reports.db".into();
        assert_eq!(s.database_path(), "reports.db");
        s.database_url = "/var/lib/wp.db".into();
        assert_eq!(s.database_path(), "/var/lib/wp.db");
    }

    #[test]
    fn validate_accepts_defaults_and_rejects_zero_workers() {
        let mut s = settings();
        assert_eq!(s.validate(), Ok(()));
        s.rpc_workers = 0;
        assert_eq!(s.validate(), Err(SettingsError::Zero("rpc_workers")));
    }

    #[test]
    fn validate_rejects_bad_hosts_and_empty_paths() {
        let mut s = settings();
        s.http_host = "not a host".into();
        assert!(matches!(s.validate(), Err(SettingsError::Address { name: "http", .. })));

        let mut s = settings();
        s.pdf_path = PathBuf::new();
        assert_eq!(s.validate(), Err(SettingsError::Empty("pdf_path")));
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let mut s = settings();
        s.rpc_host = "::1".into();
        assert_eq!(s.rpc_addr().unwrap().port(), 50051);
    }

    #[test]
    fn api_key_is_never_serialized() {
        let json = serde_json::to_string(&settings()).unwrap();
        assert!(!json.contains("secret"));
    }
}
