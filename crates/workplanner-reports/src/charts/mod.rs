//! Chart rendering.
//!
//! One renderer per [`ChartKind`]. Each is a pure function of a view and a
//! manager id: an empty view produces no chart, anything else produces a PNG
//! at `{root}/{manager_id}/{kind}.png`, overwriting a previous render.

mod canvas;
mod font;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use url::Url;

use workplanner_core::{
    ChartKind, DurationVarianceRow, ManagerId, ManagerViews, MonthlyHoursRow,
    ProjectEmployeeHoursRow, TabularView,
};

use canvas::{palette, Canvas, AXIS, BLACK, GRID};

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("failed to create chart directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write chart {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

// ============================================================================
// Chart references
// ============================================================================

/// Where each produced chart lives, as `file://` URIs. Kinds without an entry
/// produced no chart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartRefs {
    refs: BTreeMap<ChartKind, String>,
}

impl ChartRefs {
    pub fn insert(&mut self, kind: ChartKind, reference: impl Into<String>) {
        self.refs.insert(kind, reference.into());
    }

    pub fn get(&self, kind: ChartKind) -> Option<&str> {
        self.refs.get(&kind).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Kinds without a chart, in report order.
    pub fn missing(&self) -> Vec<ChartKind> {
        ChartKind::ALL
            .into_iter()
            .filter(|k| !self.refs.contains_key(k))
            .collect()
    }
}

/// `file://` URI for a local path, falling back to the plain path.
pub fn file_reference(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    Url::from_file_path(&absolute)
        .map(String::from)
        .unwrap_or_else(|_| path.display().to_string())
}

/// Inverse of [`file_reference`]: strips a `file://` scheme, passes plain paths through.
pub fn resolve_reference(reference: &str) -> Option<PathBuf> {
    if reference.is_empty() {
        return None;
    }
    match Url::parse(reference) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        Ok(_) if reference.len() > 2 && reference.as_bytes()[1] == b':' => {
            // Windows drive letter parsed as a scheme.
            Some(PathBuf::from(reference))
        }
        Ok(_) => None,
        Err(_) => Some(PathBuf::from(reference)),
    }
}

// ============================================================================
// Data preparation
// ============================================================================

/// Hours per month summed over all projects, ordered by month.
pub fn monthly_totals(view: &TabularView<MonthlyHoursRow>) -> Vec<(String, f64)> {
    let mut by_month: BTreeMap<&str, f64> = BTreeMap::new();
    for row in view.iter() {
        *by_month.entry(row.month.as_str()).or_default() += row.total_monthly_hours;
    }
    by_month
        .into_iter()
        .map(|(month, hours)| (month.to_string(), hours))
        .collect()
}

/// Projects ordered by ascending variance; ties keep view order.
pub fn sorted_variance(view: &TabularView<DurationVarianceRow>) -> Vec<(String, f64)> {
    let mut bars: Vec<(String, f64)> = view
        .iter()
        .map(|r| (r.project_name.clone(), r.duration_variance_days))
        .collect();
    bars.sort_by(|a, b| a.1.total_cmp(&b.1));
    bars
}

/// Project × employee hour matrix, zero-filled, both axes sorted by name.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeePivot {
    pub projects: Vec<String>,
    pub employees: Vec<String>,
    /// `hours[project][employee]`
    pub hours: Vec<Vec<f64>>,
}

impl EmployeePivot {
    pub fn project_total(&self, project: usize) -> f64 {
        self.hours[project].iter().sum()
    }
}

pub fn employee_pivot(view: &TabularView<ProjectEmployeeHoursRow>) -> EmployeePivot {
    let projects: BTreeSet<&str> = view.iter().map(|r| r.project_name.as_str()).collect();
    let employees: BTreeSet<&str> = view.iter().map(|r| r.user_name.as_str()).collect();
    let projects: Vec<String> = projects.into_iter().map(str::to_string).collect();
    let employees: Vec<String> = employees.into_iter().map(str::to_string).collect();

    let mut hours = vec![vec![0.0; employees.len()]; projects.len()];
    for row in view.iter() {
        let p = projects.binary_search(&row.project_name);
        let e = employees.binary_search(&row.user_name);
        if let (Ok(p), Ok(e)) = (p, e) {
            hours[p][e] += row.total_hours;
        }
    }

    EmployeePivot {
        projects,
        employees,
        hours,
    }
}

// ============================================================================
// Plot frame
// ============================================================================

const MARGIN_LEFT: i64 = 80;
const MARGIN_RIGHT: i64 = 30;
const MARGIN_TOP: i64 = 60;
const MARGIN_BOTTOM: i64 = 120;
const Y_TICKS: usize = 5;

/// Plot area and value → pixel mapping.
struct Frame {
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
    y_min: f64,
    y_max: f64,
}

impl Frame {
    fn new(canvas: &Canvas, right_margin: i64, values: impl IntoIterator<Item = f64>) -> Self {
        let (y_min, y_max) = nice_bounds(values);
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            right: canvas.width() - right_margin,
            bottom: canvas.height() - MARGIN_BOTTOM,
            y_min,
            y_max,
        }
    }

    fn y(&self, value: f64) -> i64 {
        let span = self.y_max - self.y_min;
        let frac = (value - self.y_min) / span;
        self.bottom - (frac * (self.bottom - self.top) as f64).round() as i64
    }

    fn slot_width(&self, n: usize) -> i64 {
        ((self.right - self.left) / n.max(1) as i64).max(1)
    }

    fn slot_center(&self, i: usize, n: usize) -> i64 {
        self.left + self.slot_width(n) * i as i64 + self.slot_width(n) / 2
    }

    /// Title, grid, y tick labels, axes, axis labels and slanted x labels.
    fn draw_chrome(
        &self,
        canvas: &mut Canvas,
        title: &str,
        x_label: &str,
        y_label: &str,
        categories: &[String],
    ) {
        let width = canvas.width();
        let height = canvas.height();
        canvas.text_centered(width / 2, 18, title, 2, BLACK);
        canvas.text(8, self.top - 20, y_label, 1, BLACK);
        canvas.text_centered((self.left + self.right) / 2, height - 18, x_label, 1, BLACK);

        for i in 0..=Y_TICKS {
            let value = self.y_min + (self.y_max - self.y_min) * i as f64 / Y_TICKS as f64;
            let y = self.y(value);
            canvas.hline(self.left, self.right, y, GRID);
            canvas.text_right(self.left - 8, y - 3, &format_value(value), 1, BLACK);
        }

        canvas.vline(self.left, self.top, self.bottom, AXIS);
        canvas.hline(self.left, self.right, self.bottom, AXIS);
        if self.y_min < 0.0 {
            canvas.hline(self.left, self.right, self.y(0.0), AXIS);
        }

        let n = categories.len();
        for (i, label) in categories.iter().enumerate() {
            let x = self.slot_center(i, n);
            canvas.vline(x, self.bottom, self.bottom + 4, AXIS);
            canvas.text_slanted(x, self.bottom + 8, &truncate(label, 16), BLACK);
        }
    }
}

/// Axis range covering all values and zero, padded to round numbers.
fn nice_bounds(values: impl IntoIterator<Item = f64>) -> (f64, f64) {
    let (mut lo, mut hi) = (0.0_f64, 0.0_f64);
    for v in values.into_iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if hi - lo < f64::EPSILON {
        hi = lo + 1.0;
    }
    let step = nice_step((hi - lo) / Y_TICKS as f64);
    let lo = (lo / step).floor() * step;
    let hi = (hi / step).ceil() * step;
    if hi - lo < f64::EPSILON {
        (lo, lo + step)
    } else {
        (lo, hi)
    }
}

fn nice_step(raw: f64) -> f64 {
    let magnitude = 10f64.powf(raw.log10().floor());
    let norm = raw / magnitude;
    let nice = if norm <= 1.0 {
        1.0
    } else if norm <= 2.0 {
        2.0
    } else if norm <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn format_value(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{:.0}", v)
    } else {
        format!("{:.1}", v)
    }
}

fn truncate(label: &str, max: usize) -> String {
    if label.chars().count() <= max {
        label.to_string()
    } else {
        let mut s: String = label.chars().take(max - 1).collect();
        s.push('.');
        s
    }
}

// ============================================================================
// Plots
// ============================================================================

fn plot_monthly_hours(points: &[(String, f64)]) -> Canvas {
    let mut canvas = Canvas::new(1080, 480);
    let frame = Frame::new(&canvas, MARGIN_RIGHT, points.iter().map(|p| p.1));
    let labels: Vec<String> = points.iter().map(|p| p.0.clone()).collect();
    frame.draw_chrome(
        &mut canvas,
        ChartKind::MonthlyHours.caption(),
        "Month",
        "Hours Worked",
        &labels,
    );

    let n = points.len();
    let coords: Vec<(i64, i64)> = points
        .iter()
        .enumerate()
        .map(|(i, (_, v))| (frame.slot_center(i, n), frame.y(*v)))
        .collect();
    for pair in coords.windows(2) {
        canvas.line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, 3, palette(0));
    }
    for (x, y) in coords {
        canvas.fill_rect(x - 3, y - 3, x + 3, y + 3, palette(0));
    }
    canvas
}

fn plot_duration_variance(bars: &[(String, f64)]) -> Canvas {
    let mut canvas = Canvas::new(1200, 600);
    let frame = Frame::new(&canvas, MARGIN_RIGHT, bars.iter().map(|b| b.1));
    let labels: Vec<String> = bars.iter().map(|b| b.0.clone()).collect();
    frame.draw_chrome(
        &mut canvas,
        ChartKind::DurationVariance.caption(),
        "Project",
        "Variance (Actual - Planned)",
        &labels,
    );

    let n = bars.len();
    let half = (frame.slot_width(n) * 4 / 10).max(1);
    let zero = frame.y(0.0);
    for (i, (_, v)) in bars.iter().enumerate() {
        let x = frame.slot_center(i, n);
        canvas.fill_rect(x - half, zero, x + half, frame.y(*v), palette(0));
    }
    canvas
}

fn plot_employee_hours(pivot: &EmployeePivot) -> Canvas {
    const LEGEND_WIDTH: i64 = 220;
    let mut canvas = Canvas::new(1440, 720);
    let totals: Vec<f64> = (0..pivot.projects.len())
        .map(|p| pivot.project_total(p))
        .collect();
    let frame = Frame::new(&canvas, LEGEND_WIDTH, totals.iter().copied());
    frame.draw_chrome(
        &mut canvas,
        ChartKind::EmployeeHours.caption(),
        "Project",
        "Hours",
        &pivot.projects,
    );

    let n = pivot.projects.len();
    let half = (frame.slot_width(n) * 4 / 10).max(1);
    for (p, row) in pivot.hours.iter().enumerate() {
        let x = frame.slot_center(p, n);
        let mut base = 0.0;
        for (e, hours) in row.iter().enumerate() {
            if *hours <= 0.0 {
                continue;
            }
            let top = base + hours;
            canvas.fill_rect(x - half, frame.y(base), x + half, frame.y(top), palette(e));
            base = top;
        }
    }

    let legend_x = canvas.width() - LEGEND_WIDTH + 20;
    for (e, name) in pivot.employees.iter().enumerate() {
        let y = frame.top + e as i64 * 18;
        canvas.fill_rect(legend_x, y, legend_x + 10, y + 10, palette(e));
        canvas.text(legend_x + 16, y + 2, &truncate(name, 28), 1, BLACK);
    }
    canvas
}

// ============================================================================
// Renderer
// ============================================================================

/// Writes chart PNGs under a root directory, one subdirectory per manager.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    root: PathBuf,
}

impl ChartRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chart_path(&self, kind: ChartKind, manager_id: ManagerId) -> PathBuf {
        self.root
            .join(manager_id.to_string())
            .join(kind.file_name())
    }

    fn save(&self, kind: ChartKind, manager_id: ManagerId, canvas: Canvas) -> Result<PathBuf, ChartError> {
        let path = self.chart_path(kind, manager_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ChartError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        canvas
            .into_image()
            .save(&path)
            .map_err(|source| ChartError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(%kind, manager_id, path = %path.display(), "chart written");
        Ok(path)
    }

    pub fn monthly_hours(
        &self,
        view: &TabularView<MonthlyHoursRow>,
        manager_id: ManagerId,
    ) -> Result<Option<PathBuf>, ChartError> {
        if view.is_empty() {
            return Ok(None);
        }
        let canvas = plot_monthly_hours(&monthly_totals(view));
        self.save(ChartKind::MonthlyHours, manager_id, canvas).map(Some)
    }

    pub fn duration_variance(
        &self,
        view: &TabularView<DurationVarianceRow>,
        manager_id: ManagerId,
    ) -> Result<Option<PathBuf>, ChartError> {
        if view.is_empty() {
            return Ok(None);
        }
        let canvas = plot_duration_variance(&sorted_variance(view));
        self.save(ChartKind::DurationVariance, manager_id, canvas).map(Some)
    }

    pub fn employee_hours(
        &self,
        view: &TabularView<ProjectEmployeeHoursRow>,
        manager_id: ManagerId,
    ) -> Result<Option<PathBuf>, ChartError> {
        if view.is_empty() {
            return Ok(None);
        }
        let canvas = plot_employee_hours(&employee_pivot(view));
        self.save(ChartKind::EmployeeHours, manager_id, canvas).map(Some)
    }

    pub fn render(
        &self,
        kind: ChartKind,
        views: &ManagerViews,
        manager_id: ManagerId,
    ) -> Result<Option<PathBuf>, ChartError> {
        match kind {
            ChartKind::MonthlyHours => self.monthly_hours(&views.monthly_hours, manager_id),
            ChartKind::DurationVariance => {
                self.duration_variance(&views.duration_variance, manager_id)
            }
            ChartKind::EmployeeHours => self.employee_hours(&views.project_hours, manager_id),
        }
    }

    /// Renders every chart kind. A chart that fails to render is logged and
    /// left out, like an empty view.
    pub fn render_all(&self, views: &ManagerViews, manager_id: ManagerId) -> ChartRefs {
        let mut refs = ChartRefs::default();
        for kind in ChartKind::ALL {
            match self.render(kind, views, manager_id) {
                Ok(Some(path)) => refs.insert(kind, file_reference(&path)),
                Ok(None) => debug!(%kind, manager_id, "no data, chart skipped"),
                Err(e) => warn!(%kind, manager_id, error = %e, "chart render failed"),
            }
        }
        refs
    }
}
