//! Post-merge cleanup of a unit directory
//!
//! Runs only after a merge produced a combined PDF. Failures are collected in
//! the [`CleanupReport`] and never abort the run.

use std::fs;
use std::path::{Path, PathBuf};

use glob::{glob, Pattern};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::CleanupError;

/// File names left behind by archives and desktop tools
pub const CLUTTER_PATTERNS: [&str; 9] = [
    "README*",
    "*.md",
    "*.txt",
    "Thumbs.db",
    ".DS_Store",
    "desktop.ini",
    "*.tmp",
    "*.temp",
    "*~",
];

/// What a cleanup pass removed and what it could not
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn extend(&mut self, other: CleanupReport) {
        self.removed.extend(other.removed);
        self.failures.extend(other.failures);
    }

    fn record(&mut self, path: &Path, result: std::io::Result<()>) {
        match result {
            Ok(()) => {
                debug!(file = %path.display(), "removed");
                self.removed.push(path.to_path_buf());
            }
            Err(source) => {
                let error = CleanupError {
                    path: path.to_path_buf(),
                    source,
                };
                warn!("{}", error);
                self.failures.push(error);
            }
        }
    }
}

/// Clean a unit directory after its merge
///
/// `outputs` are the combined PDFs and are never touched. When
/// `keep_intermediates` is set only clutter and empty directories go.
pub fn clean_unit(
    unit_dir: &Path,
    intermediates: &[PathBuf],
    outputs: &[PathBuf],
    keep_intermediates: bool,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    if !keep_intermediates {
        report.extend(remove_intermediates(intermediates, outputs));
    }
    report.extend(remove_clutter(unit_dir, outputs));
    report.extend(remove_empty_dirs(unit_dir));
    report
}

/// Delete merged or excluded per-resource files
pub fn remove_intermediates(files: &[PathBuf], protected: &[PathBuf]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for path in files {
        if protected.contains(path) || !path.exists() {
            continue;
        }
        report.record(path, fs::remove_file(path));
    }
    report
}

/// Delete clutter files anywhere below `dir`
pub fn remove_clutter(dir: &Path, protected: &[PathBuf]) -> CleanupReport {
    let mut report = CleanupReport::default();
    let root = Pattern::escape(&dir.to_string_lossy());

    for pattern in CLUTTER_PATTERNS {
        let full = format!("{}/**/{}", root, pattern);
        let entries = match glob(&full) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("bad clutter pattern {}: {}", full, e);
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() && !protected.contains(&path) => {
                    report.record(&path, fs::remove_file(&path));
                }
                Ok(_) => {}
                Err(e) => warn!("glob error for {}: {}", full, e),
            }
        }
    }
    report
}

/// Remove empty directories below `dir`, deepest first
///
/// `dir` itself is kept.
pub fn remove_empty_dirs(dir: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();
    let dirs: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect();

    for path in dirs {
        let empty = fs::read_dir(&path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            report.record(&path, fs::remove_dir(&path));
        }
    }
    report
}
