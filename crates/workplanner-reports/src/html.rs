//! HTML report rendering.
//!
//! The page layout lives in `report.html` under the templates directory and
//! carries `{{SLOT}}` markers. Each slot is filled with an HTML fragment built
//! from typed view rows; the result depends only on the template and the inputs.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use workplanner_core::{ChartKind, ManagerId, ManagerViews};

use crate::charts::ChartRefs;
use crate::error::RenderError;

pub const TEMPLATE_FILE: &str = "report.html";

/// Slots a template may use. Any other `{{NAME}}` is a template error.
pub const SLOTS: [&str; 6] = [
    "MANAGER_NAME",
    "AVERAGE_DURATION",
    "PROJECT_HOURS",
    "DURATION_VARIANCE",
    "MONTHLY_HOURS",
    "CHARTS",
];

/// Everything a report page is rendered from.
pub struct ReportInput<'a> {
    pub manager_id: ManagerId,
    /// Resolved display name (already falling back to `Manager {id}`).
    pub manager_name: &'a str,
    pub views: &'a ManagerViews,
    pub charts: &'a ChartRefs,
}

/// Turns report inputs into markup.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, input: &ReportInput<'_>) -> Result<String, RenderError>;
}

// ============================================================================
// Template parsing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Slot(&'static str),
}

/// A parsed `report.html`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTemplate {
    pieces: Vec<Piece>,
}

impl ReportTemplate {
    /// Parses template source; `origin` only labels errors.
    pub fn parse(source: &str, origin: &Path) -> Result<Self, RenderError> {
        let malformed = |reason: String| RenderError::MalformedTemplate {
            path: origin.to_path_buf(),
            reason,
        };

        let mut pieces = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                pieces.push(Piece::Text(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after
                .find("}}")
                .ok_or_else(|| malformed(format!("unterminated slot at byte {}", source.len() - rest.len() + open)))?;
            let name = after[..close].trim();
            let slot = SLOTS
                .iter()
                .copied()
                .find(|s| *s == name)
                .ok_or_else(|| malformed(format!("unknown slot `{{{{{name}}}}}`")))?;
            pieces.push(Piece::Slot(slot));
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Text(rest.to_string()));
        }
        Ok(Self { pieces })
    }

    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let source = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RenderError::TemplateNotFound(path.to_path_buf()),
            _ => RenderError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        Self::parse(&source, path)
    }

    pub fn uses(&self, slot: &str) -> bool {
        self.pieces.iter().any(|p| matches!(p, Piece::Slot(s) if *s == slot))
    }

    /// Fills every slot through `fill`.
    pub fn fill(&self, mut fill: impl FnMut(&'static str) -> String) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Slot(slot) => out.push_str(&fill(slot)),
            }
        }
        out
    }
}

// ============================================================================
// Fragments
// ============================================================================

/// Escapes text for element content and double-quoted attributes.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn number(v: f64) -> String {
    format!("{v:.1}")
}

fn table(headers: &[&str], rows: impl Iterator<Item = Vec<String>>) -> String {
    let mut rows = rows.peekable();
    if rows.peek().is_none() {
        return "<p class=\"empty\">No data available.</p>".to_string();
    }
    let mut out = String::from("<table>\n<thead><tr>");
    for h in headers {
        let _ = write!(out, "<th>{}</th>", escape(h));
    }
    out.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape(&cell));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>");
    out
}

fn average_duration(views: &ManagerViews) -> String {
    match views.average_duration.first() {
        Some(avg) => format!(
            "<p>Average completed project duration: <strong>{} days</strong> across {} completed project(s).</p>",
            number(avg.average_duration_days),
            avg.completed_projects
        ),
        None => "<p class=\"empty\">No completed projects.</p>".to_string(),
    }
}

fn project_hours(views: &ManagerViews) -> String {
    table(
        &["Project", "Employee", "Total hours"],
        views.project_hours.iter().map(|r| {
            vec![
                r.project_name.clone(),
                r.user_name.clone(),
                number(r.total_hours),
            ]
        }),
    )
}

fn duration_variance(views: &ManagerViews) -> String {
    let days = |v: Option<f64>| v.map(number).unwrap_or_else(|| "-".to_string());
    table(
        &["Project", "Planned (days)", "Actual (days)", "Variance (days)"],
        views.duration_variance.iter().map(|r| {
            vec![
                r.project_name.clone(),
                days(r.planned_duration_days),
                days(r.actual_duration_days),
                number(r.duration_variance_days),
            ]
        }),
    )
}

fn monthly_hours(views: &ManagerViews) -> String {
    table(
        &["Month", "Project", "Hours"],
        views.monthly_hours.iter().map(|r| {
            vec![
                r.month.clone(),
                r.project_name.clone(),
                number(r.total_monthly_hours),
            ]
        }),
    )
}

fn charts(refs: &ChartRefs) -> String {
    let mut out = String::new();
    for kind in ChartKind::ALL {
        if let Some(src) = refs.get(kind) {
            let _ = write!(
                out,
                "<figure>\n<h3>{caption}</h3>\n<img src=\"{src}\" alt=\"{key}\">\n</figure>\n",
                caption = escape(kind.caption()),
                src = escape(src),
                key = kind.key(),
            );
        }
    }
    if out.is_empty() {
        out.push_str("<p class=\"empty\">No charts available.</p>");
    }
    out
}

// ============================================================================
// Renderer
// ============================================================================

/// Renders from `{templates_dir}/report.html`, re-read on every render so a
/// template edit applies to the next report.
#[derive(Debug, Clone)]
pub struct TemplateReportRenderer {
    templates_dir: PathBuf,
}

impl TemplateReportRenderer {
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
        }
    }

    pub fn template_path(&self) -> PathBuf {
        self.templates_dir.join(TEMPLATE_FILE)
    }
}

impl ReportRenderer for TemplateReportRenderer {
    fn render(&self, input: &ReportInput<'_>) -> Result<String, RenderError> {
        let template = ReportTemplate::load(&self.template_path())?;
        Ok(render_with(&template, input))
    }
}

/// Fills `template` from `input`.
pub fn render_with(template: &ReportTemplate, input: &ReportInput<'_>) -> String {
    template.fill(|slot| match slot {
        "MANAGER_NAME" => escape(input.manager_name),
        "AVERAGE_DURATION" => average_duration(input.views),
        "PROJECT_HOURS" => project_hours(input.views),
        "DURATION_VARIANCE" => duration_variance(input.views),
        "MONTHLY_HOURS" => monthly_hours(input.views),
        "CHARTS" => charts(input.charts),
        _ => String::new(),
    })
}
