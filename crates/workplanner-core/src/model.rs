//! Report data model.
//!
//! A [`ManagerReport`] is built fresh for every request and dropped once the
//! response is sent. Nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a project owner.
pub type ManagerId = i64;

// ============================================================================
// Chart kinds
// ============================================================================

/// The fixed set of charts produced for every manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    MonthlyHours,
    DurationVariance,
    EmployeeHours,
}

impl ChartKind {
    /// Report order of the charts.
    pub const ALL: [ChartKind; 3] = [
        ChartKind::MonthlyHours,
        ChartKind::DurationVariance,
        ChartKind::EmployeeHours,
    ];

    /// Logical key used as the chart title on the wire.
    pub fn key(self) -> &'static str {
        match self {
            ChartKind::MonthlyHours => "monthly_hours",
            ChartKind::DurationVariance => "duration_variance",
            ChartKind::EmployeeHours => "employee_hours",
        }
    }

    /// Fixed file name; re-running a chart for the same output directory overwrites it.
    pub fn file_name(self) -> &'static str {
        match self {
            ChartKind::MonthlyHours => "monthly_hours.png",
            ChartKind::DurationVariance => "duration_variance.png",
            ChartKind::EmployeeHours => "employee_hours.png",
        }
    }

    /// Human-facing caption.
    pub fn caption(self) -> &'static str {
        match self {
            ChartKind::MonthlyHours => "Monthly Total Hours",
            ChartKind::DurationVariance => "Project Duration Variance (Days)",
            ChartKind::EmployeeHours => "Employee Hours per Project",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Packaged report
// ============================================================================

/// One packaged chart image.
///
/// `data` is the base64 text of the PNG bytes, and is empty exactly when the
/// chart could not be produced or read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    pub filename: String,
    pub title: String,
    pub data: String,
}

impl Chart {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A fully packaged per-manager report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerReport {
    pub manager_id: ManagerId,
    pub manager_name: Option<String>,
    pub html: String,
    /// Raw PDF bytes; empty when the generated document could not be read back.
    #[serde(serialize_with = "pdf_len::serialize")]
    pub pdf: Vec<u8>,
    pub charts: Vec<Chart>,
}

impl ManagerReport {
    pub fn chart(&self, kind: ChartKind) -> Option<&Chart> {
        self.charts.iter().find(|c| c.title == kind.key())
    }

    /// Name shown to humans, falling back to a synthetic label.
    pub fn display_name(&self) -> String {
        display_name(self.manager_id, self.manager_name.as_deref())
    }
}

/// `"Manager {id}"` when the store has no name for the manager.
pub fn display_name(manager_id: ManagerId, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => format!("Manager {manager_id}"),
    }
}

/// JSON renders the PDF as its byte length; the bytes travel over HTTP/RPC.
mod pdf_len {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(pdf: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(pdf.len() as u64)
    }
}
