//! Workplanner report core types.
//!
//! Everything the report pipeline and its two serving front ends agree on:
//!
//! - the report data model ([`ManagerReport`], [`Chart`], [`ChartKind`]),
//! - typed rows for the four relational views ([`view`]),
//! - the [`ReportStore`] capability the pipeline reads from,
//! - the error taxonomy shared across crates, and
//! - [`Settings`], the opaque configuration object supplied by the binary.

pub mod error;
pub mod model;
pub mod settings;
pub mod store;
pub mod view;

pub use error::DataError;
pub use model::{Chart, ChartKind, ManagerId, ManagerReport};
pub use settings::{Settings, SettingsError};
pub use store::ReportStore;
pub use view::{
    AverageDurationRow, DurationVarianceRow, ManagerViews, MonthlyHoursRow,
    ProjectEmployeeHoursRow, TabularView, ViewName, ViewRow, ViewScope,
};
