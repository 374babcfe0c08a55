//! Diagnostics sinks for edit-script verification

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::Result;

/// A mismatch between an expression rebuilt from its edit script and the
/// expression a handler built directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevenshteinReport {
    pub label: String,
    pub old: String,
    pub deltas: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<String>,
    pub expected: String,
    pub timestamp: DateTime<Utc>,
}

impl LevenshteinReport {
    pub fn new(
        label: impl Into<String>,
        old: impl Into<String>,
        deltas: Vec<String>,
        applied: Option<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            old: old.into(),
            deltas,
            applied,
            expected: expected.into(),
            timestamp: Utc::now(),
        }
    }
}

pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, report: LevenshteinReport);
}

/// Logs reports at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, report: LevenshteinReport) {
        warn!(
            label = %report.label,
            old = %report.old,
            deltas = ?report.deltas,
            applied = ?report.applied,
            expected = %report.expected,
            "Levenshtein mismatch"
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn report(&self, _report: LevenshteinReport) {}
}

/// Collects reports in memory; clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    reports: Arc<RwLock<Vec<LevenshteinReport>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<LevenshteinReport> {
        self.reports.read().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.read().is_empty()
    }

    pub fn clear(&self) {
        self.reports.write().clear();
    }
}

impl DiagnosticsSink for MemorySink {
    fn report(&self, report: LevenshteinReport) {
        self.reports.write().push(report);
    }
}

/// Appends reports to a file, one JSON object per line.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiagnosticsSink for FileSink {
    fn report(&self, report: LevenshteinReport) {
        let line = match serde_json::to_string(&report) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize Levenshtein report");
                return;
            }
        };
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{}", line) {
            warn!(path = %self.path.display(), error = %e, "Failed to write Levenshtein report");
        }
    }
}
