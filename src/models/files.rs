use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Pending,
    Downloaded,
    Processed,
    Failed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileStatus::Pending => "pending",
            FileStatus::Downloaded => "downloaded",
            FileStatus::Processed => "processed",
            FileStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A daily national observation file moving through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyObservationFile {
    pub date: NaiveDate,
    pub path: PathBuf,
    pub status: FileStatus,
    pub retrieved_at: Option<DateTime<Local>>,
}

impl DailyObservationFile {
    pub fn pending(date: NaiveDate, path: PathBuf) -> Self {
        Self {
            date,
            path,
            status: FileStatus::Pending,
            retrieved_at: None,
        }
    }

    pub fn mark_downloaded(&mut self) {
        self.status = FileStatus::Downloaded;
        self.retrieved_at = Some(Local::now());
    }

    pub fn mark_processed(&mut self) {
        self.status = FileStatus::Processed;
    }

    pub fn mark_failed(&mut self) {
        self.status = FileStatus::Failed;
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut file =
            DailyObservationFile::pending(date, PathBuf::from("raw/china_cities_20240501.csv"));

        assert_eq!(file.status, FileStatus::Pending);
        assert!(file.retrieved_at.is_none());

        file.mark_downloaded();
        assert_eq!(file.status, FileStatus::Downloaded);
        assert!(file.retrieved_at.is_some());

        file.mark_processed();
        assert_eq!(file.status.to_string(), "processed");
        assert_eq!(file.file_name(), "china_cities_20240501.csv");
    }
}
