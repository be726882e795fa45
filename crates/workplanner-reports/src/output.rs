//! Run-scoped output directories.
//!
//! Every pipeline run writes into its own `run-{id}` directory under the
//! diagrams and PDF roots, and cleanup removes exactly those directories.
//! Concurrent runs therefore never touch each other's artifacts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use workplanner_core::{ManagerId, Settings};

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing run identifier (`{pid}-{seq}`).
pub fn next_run_id() -> String {
    let seq = NEXT_RUN.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", std::process::id(), seq)
}

/// Configured roots that run directories are allocated under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRoots {
    pub diagrams: PathBuf,
    pub pdf: PathBuf,
}

impl OutputRoots {
    pub fn new(diagrams: impl Into<PathBuf>, pdf: impl Into<PathBuf>) -> Self {
        Self {
            diagrams: diagrams.into(),
            pdf: pdf.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.diagrams_path, &settings.pdf_path)
    }

    /// Reserves directories for one run. Nothing is created on disk until a
    /// stage writes into them.
    pub fn allocate(&self, manager_id: ManagerId) -> RunDirs {
        let run_id = next_run_id();
        let dir = format!("run-{run_id}");
        RunDirs {
            manager_id,
            charts_root: self.diagrams.join(&dir),
            pdf_dir: self.pdf.join(&dir),
            run_id,
        }
    }
}

/// The directories owned by one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirs {
    pub run_id: String,
    pub manager_id: ManagerId,
    /// Chart renderer root; charts land in `{charts_root}/{manager_id}/`.
    pub charts_root: PathBuf,
    pub pdf_dir: PathBuf,
}

impl RunDirs {
    pub fn pdf_path(&self, timestamp: &str) -> PathBuf {
        self.pdf_dir
            .join(format!("manager_{}_{}.pdf", self.manager_id, timestamp))
    }

    /// Removes this run's directories. Best effort: failures are logged and
    /// reported back, never raised.
    pub fn cleanup(&self) -> Vec<(PathBuf, io::Error)> {
        let mut failures = Vec::new();
        for dir in [&self.charts_root, &self.pdf_dir] {
            if let Err(e) = remove_dir(dir) {
                warn!(run = %self.run_id, path = %dir.display(), error = %e, "cleanup failed");
                failures.push((dir.clone(), e));
            }
        }
        debug!(run = %self.run_id, manager_id = self.manager_id, "run output removed");
        failures
    }
}

fn remove_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_and_increasing() {
        let a = next_run_id();
        let b = next_run_id();
        assert_ne!(a, b);
        let seq = |id: &str| id.rsplit('-').next().unwrap().parse::<u64>().unwrap();
        assert!(seq(&b) > seq(&a));
    }

    #[test]
    fn runs_for_the_same_manager_get_distinct_directories() {
        let roots = OutputRoots::new("/d", "/p");
        let a = roots.allocate(42);
        let b = roots.allocate(42);
        assert_ne!(a.charts_root, b.charts_root);
        assert_ne!(a.pdf_dir, b.pdf_dir);
        assert!(a.charts_root.starts_with("/d"));
        assert!(a.pdf_path("20240101_120000").ends_with("manager_42_20240101_120000.pdf"));
    }

    #[test]
    fn cleanup_removes_only_its_own_run() {
        let dir = tempfile::tempdir().unwrap();
        let roots = OutputRoots::new(dir.path().join("diagrams"), dir.path().join("pdf"));
        let mine = roots.allocate(1);
        let other = roots.allocate(1);
        for run in [&mine, &other] {
            fs::create_dir_all(run.charts_root.join("1")).unwrap();
            fs::create_dir_all(&run.pdf_dir).unwrap();
            fs::write(run.pdf_path("t"), b"%PDF").unwrap();
        }

        assert!(mine.cleanup().is_empty());
        assert!(!mine.charts_root.exists());
        assert!(!mine.pdf_dir.exists());
        assert!(other.pdf_path("t").exists());
        assert!(other.charts_root.join("1").exists());

        // Second cleanup of an already-removed run is a no-op.
        assert!(mine.cleanup().is_empty());
    }
}
