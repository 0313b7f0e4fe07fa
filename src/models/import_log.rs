use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportStatus {
    Success,
    Partial,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Success => "SUCCESS",
            ImportStatus::Partial => "PARTIAL",
            ImportStatus::Failed => "FAILED",
        }
    }

    /// Status for a file given how many rows were attempted and written
    pub fn from_counts(attempted: usize, written: usize) -> Self {
        if written == attempted {
            ImportStatus::Success
        } else if written == 0 {
            ImportStatus::Failed
        } else {
            ImportStatus::Partial
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record, one per processed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub filename: String,
    pub records_count: i64,
    pub status: ImportStatus,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl ImportLogEntry {
    pub fn new(filename: impl Into<String>, records_count: usize, status: ImportStatus, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            records_count: records_count as i64,
            status,
            message: message.into(),
            timestamp: Local::now(),
        }
    }
}
