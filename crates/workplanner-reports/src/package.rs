//! Packaging of a built report for transport.
//!
//! Artifacts are read back off disk here. A read failure degrades that one
//! artifact to empty data; packaging itself never fails.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{error, warn};

use workplanner_core::{Chart, ChartKind, ManagerReport};

use crate::charts::{resolve_reference, ChartRefs};
use crate::pipeline::ReportDraft;

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

/// One [`Chart`] per kind, in report order. Missing or unreadable charts
/// carry empty data.
pub fn package_charts(refs: &ChartRefs) -> Vec<Chart> {
    ChartKind::ALL
        .into_iter()
        .map(|kind| {
            let reference = refs.get(kind);
            let path = reference.and_then(resolve_reference);
            let filename = path
                .as_deref()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| kind.file_name().to_string());
            let data = match (&path, reference) {
                (Some(path), _) => match fs::read(path) {
                    Ok(bytes) => encode(&bytes),
                    Err(e) => {
                        warn!(chart = %kind, path = %path.display(), error = %e, "chart unreadable");
                        String::new()
                    }
                },
                (None, Some(reference)) => {
                    warn!(chart = %kind, reference, "chart reference not resolvable");
                    String::new()
                }
                (None, None) => String::new(),
            };
            Chart {
                filename,
                title: kind.key().to_string(),
                data,
            }
        })
        .collect()
}

/// PDF bytes, empty if the file cannot be read.
pub fn read_pdf(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|e| {
        error!(path = %path.display(), error = %e, "pdf unreadable");
        Vec::new()
    })
}

pub fn package(draft: &ReportDraft) -> ManagerReport {
    ManagerReport {
        manager_id: draft.manager_id,
        manager_name: draft.manager_name.clone(),
        html: draft.html.clone(),
        pdf: read_pdf(&draft.pdf_path),
        charts: package_charts(&draft.charts),
    }
}
