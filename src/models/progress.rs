use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Processed-record count for one file, as stored in the progress JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionProgress {
    pub processed_records: usize,
    pub timestamp: DateTime<Local>,
}

impl IngestionProgress {
    pub fn now(processed_records: usize) -> Self {
        Self {
            processed_records,
            timestamp: Local::now(),
        }
    }
}
