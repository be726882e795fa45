//! The store capability consumed by the report pipeline.

use crate::error::DataError;
use crate::model::ManagerId;
use crate::view::{
    AverageDurationRow, DurationVarianceRow, ManagerViews, MonthlyHoursRow,
    ProjectEmployeeHoursRow, TabularView, ViewScope,
};

/// Read-only access to manager data.
///
/// Implementations must bind the manager id as a query parameter; view names
/// come from the closed [`crate::ViewName`] set only.
pub trait ReportStore: Send + Sync {
    fn project_employee_hours(
        &self,
        scope: ViewScope,
    ) -> Result<TabularView<ProjectEmployeeHoursRow>, DataError>;

    fn average_duration(&self, scope: ViewScope)
        -> Result<TabularView<AverageDurationRow>, DataError>;

    fn duration_variance(
        &self,
        scope: ViewScope,
    ) -> Result<TabularView<DurationVarianceRow>, DataError>;

    fn monthly_hours(&self, scope: ViewScope) -> Result<TabularView<MonthlyHoursRow>, DataError>;

    /// Display name of a manager, `None` if there is no such user.
    fn manager_name(&self, manager_id: ManagerId) -> Result<Option<String>, DataError>;

    /// Distinct owners of at least one project.
    ///
    /// Never fails: storage errors are logged by the implementation and an
    /// empty list is returned.
    fn all_manager_ids(&self) -> Vec<ManagerId>;

    /// Reads the four report views for one manager, in a fixed order.
    /// The first failure aborts the whole read.
    fn manager_views(&self, manager_id: ManagerId) -> Result<ManagerViews, DataError> {
        let scope = ViewScope::Manager(manager_id);
        Ok(ManagerViews {
            project_hours: self.project_employee_hours(scope)?,
            average_duration: self.average_duration(scope)?,
            duration_variance: self.duration_variance(scope)?,
            monthly_hours: self.monthly_hours(scope)?,
        })
    }
}
