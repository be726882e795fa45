//! SQLite data access for workplanner reports.
//!
//! Every read goes through one of two statement shapes:
//!
//! ```text
//! SELECT <columns> FROM <view>                           -- ViewScope::All
//! SELECT <columns> FROM <view> WHERE "managerId" = ?1    -- ViewScope::Manager
//! ```
//!
//! `<view>` and `<columns>` come from [`ViewName`] / [`ViewRow`] constants,
//! never from callers, and the manager id is always a bound parameter.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

use workplanner_core::{
    AverageDurationRow, DataError, DurationVarianceRow, ManagerId, MonthlyHoursRow,
    ProjectEmployeeHoursRow, ReportStore, TabularView, ViewName, ViewRow, ViewScope,
};


// ============================================================================
// Row decoding
// ============================================================================

/// Decodes one result row of a view, columns in [`ViewRow::COLUMNS`] order.
pub trait FromViewRow: ViewRow {
    fn decode(row: &Row<'_>) -> rusqlite::Result<Self>;
}

impl FromViewRow for ProjectEmployeeHoursRow {
    fn decode(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_name: row.get(0)?,
            user_name: row.get(1)?,
            total_hours: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
        })
    }
}

impl FromViewRow for AverageDurationRow {
    fn decode(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            average_duration_days: row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
            completed_projects: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
        })
    }
}

impl FromViewRow for DurationVarianceRow {
    fn decode(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_name: row.get(0)?,
            planned_duration_days: row.get(1)?,
            actual_duration_days: row.get(2)?,
            duration_variance_days: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
        })
    }
}

impl FromViewRow for MonthlyHoursRow {
    fn decode(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_name: row.get(0)?,
            month: row.get(1)?,
            total_monthly_hours: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
        })
    }
}

/// The statement used to read `view` in `scope`.
pub fn view_sql(view: ViewName, columns: &[&str], scope: ViewScope) -> String {
    let cols = columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let rel = view.relation();
    match scope {
        ViewScope::All => format!("SELECT {cols} FROM {rel} ORDER BY 1"),
        ViewScope::Manager(_) => {
            format!("SELECT {cols} FROM {rel} WHERE \"{rel}\".\"managerId\" = ?1 ORDER BY 1")
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// [`ReportStore`] over a single SQLite connection.
pub struct SqliteReportStore {
    conn: Mutex<Connection>,
    enumeration_failures: AtomicU64,
}

impl SqliteReportStore {
    /// Opens an existing database read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DataError::Connection(format!("{}: {e}", path.display())))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            enumeration_failures: AtomicU64::new(0),
        }
    }

    /// How many times manager enumeration hit a storage error and degraded to
    /// an empty list.
    pub fn enumeration_failures(&self) -> u64 {
        self.enumeration_failures.load(Ordering::Relaxed)
    }

    /// Reads a whole view or one manager's slice of it.
    pub fn fetch_view<R: FromViewRow>(&self, scope: ViewScope) -> Result<TabularView<R>, DataError> {
        let sql = view_sql(R::VIEW, R::COLUMNS, scope);
        let unavailable = |e: rusqlite::Error| DataError::Unavailable {
            view: R::VIEW,
            message: e.to_string(),
        };

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(unavailable)?;
        let rows = match scope {
            ViewScope::All => stmt
                .query_map([], |row| R::decode(row))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>()),
            ViewScope::Manager(id) => stmt
                .query_map(params![id], |row| R::decode(row))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>()),
        }
        .map_err(unavailable)?;

        debug!(view = %R::VIEW, ?scope, rows = rows.len(), "view fetched");
        Ok(TabularView::new(rows))
    }

    /// Convenience for [`Self::fetch_view`] with [`ViewScope::Manager`].
    pub fn fetch_view_by_manager<R: FromViewRow>(
        &self,
        manager_id: ManagerId,
    ) -> Result<TabularView<R>, DataError> {
        self.fetch_view(ViewScope::Manager(manager_id))
    }

    fn try_all_manager_ids(&self) -> rusqlite::Result<Vec<ManagerId>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT DISTINCT \"ownerId\" FROM \"Project\" ORDER BY \"ownerId\"")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, ManagerId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

impl ReportStore for SqliteReportStore {
    fn project_employee_hours(
        &self,
        scope: ViewScope,
    ) -> Result<TabularView<ProjectEmployeeHoursRow>, DataError> {
        self.fetch_view(scope)
    }

    fn average_duration(
        &self,
        scope: ViewScope,
    ) -> Result<TabularView<AverageDurationRow>, DataError> {
        self.fetch_view(scope)
    }

    fn duration_variance(
        &self,
        scope: ViewScope,
    ) -> Result<TabularView<DurationVarianceRow>, DataError> {
        self.fetch_view(scope)
    }

    fn monthly_hours(&self, scope: ViewScope) -> Result<TabularView<MonthlyHoursRow>, DataError> {
        self.fetch_view(scope)
    }

    fn manager_name(&self, manager_id: ManagerId) -> Result<Option<String>, DataError> {
        let conn = self.conn.lock();
        let name = conn
            .query_row(
                "SELECT name FROM \"User\" WHERE id = ?1",
                params![manager_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map_err(|e| DataError::Query {
                query: "manager lookup",
                message: e.to_string(),
            })?;
        Ok(name.flatten())
    }

    fn all_manager_ids(&self) -> Vec<ManagerId> {
        match self.try_all_manager_ids() {
            Ok(ids) => ids,
            Err(e) => {
                let failures = self.enumeration_failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    store_outage = true,
                    failures,
                    error = %e,
                    "manager enumeration failed; reporting no managers"
                );
                Vec::new()
            }
        }
    }
}
