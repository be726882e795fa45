//! Typed rows for the relational views the reports are built from.
//!
//! The store exposes four read-only projections. Each one gets a row struct
//! here so that chart and template code never poke at untyped records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ManagerId;

/// Closed set of views a caller may read. Only these names ever reach SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewName {
    ProjectEmployeeTotalHours,
    AvgCompletedProjectDuration,
    ProjectDurationVariance,
    MonthlyProjectHours,
}

impl ViewName {
    pub const ALL: [ViewName; 4] = [
        ViewName::ProjectEmployeeTotalHours,
        ViewName::AvgCompletedProjectDuration,
        ViewName::ProjectDurationVariance,
        ViewName::MonthlyProjectHours,
    ];

    /// Relation name in the store.
    pub fn relation(self) -> &'static str {
        match self {
            ViewName::ProjectEmployeeTotalHours => "project_employee_total_hours",
            ViewName::AvgCompletedProjectDuration => "avg_completed_project_duration",
            ViewName::ProjectDurationVariance => "project_duration_variance",
            ViewName::MonthlyProjectHours => "monthly_project_hours",
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.relation())
    }
}

/// Whether a view is read wholesale or restricted to one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewScope {
    All,
    Manager(ManagerId),
}

/// A row type bound to exactly one view.
pub trait ViewRow: Sized {
    const VIEW: ViewName;
    /// Columns selected from the view, in the order the row is decoded.
    const COLUMNS: &'static [&'static str];
}

// ============================================================================
// Rows
// ============================================================================

/// Hours booked by one employee on one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEmployeeHoursRow {
    pub project_name: String,
    pub user_name: String,
    pub total_hours: f64,
}

impl ViewRow for ProjectEmployeeHoursRow {
    const VIEW: ViewName = ViewName::ProjectEmployeeTotalHours;
    const COLUMNS: &'static [&'static str] = &["projectName", "userName", "totalHours"];
}

/// Single aggregate over a manager's completed projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageDurationRow {
    pub average_duration_days: f64,
    pub completed_projects: i64,
}

impl ViewRow for AverageDurationRow {
    const VIEW: ViewName = ViewName::AvgCompletedProjectDuration;
    const COLUMNS: &'static [&'static str] = &["avgDurationDays", "completedProjects"];
}

/// Planned vs actual duration of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationVarianceRow {
    pub project_name: String,
    pub planned_duration_days: Option<f64>,
    pub actual_duration_days: Option<f64>,
    pub duration_variance_days: f64,
}

impl ViewRow for DurationVarianceRow {
    const VIEW: ViewName = ViewName::ProjectDurationVariance;
    const COLUMNS: &'static [&'static str] = &[
        "projectName",
        "plannedDurationDays",
        "actualDurationDays",
        "durationVarianceDays",
    ];
}

/// Hours booked on one project in one month (`YYYY-MM`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyHoursRow {
    pub project_name: String,
    pub month: String,
    pub total_monthly_hours: f64,
}

impl ViewRow for MonthlyHoursRow {
    const VIEW: ViewName = ViewName::MonthlyProjectHours;
    const COLUMNS: &'static [&'static str] = &["projectName", "month", "totalMonthlyHours"];
}

// ============================================================================
// Tables
// ============================================================================

/// In-memory result of one view read. Zero rows is a valid, common result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularView<R> {
    pub rows: Vec<R>,
}

impl<R> Default for TabularView<R> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<R> TabularView<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn first(&self) -> Option<&R> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rows.iter()
    }
}

impl<R: ViewRow> TabularView<R> {
    pub fn columns(&self) -> &'static [&'static str] {
        R::COLUMNS
    }

    pub fn name(&self) -> ViewName {
        R::VIEW
    }
}

impl<R> FromIterator<R> for TabularView<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// The four views a report is assembled from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagerViews {
    pub project_hours: TabularView<ProjectEmployeeHoursRow>,
    pub average_duration: TabularView<AverageDurationRow>,
    pub duration_variance: TabularView<DurationVarianceRow>,
    pub monthly_hours: TabularView<MonthlyHoursRow>,
}

impl ManagerViews {
    pub fn is_empty(&self) -> bool {
        self.project_hours.is_empty()
            && self.average_duration.is_empty()
            && self.duration_variance.is_empty()
            && self.monthly_hours.is_empty()
    }
}
