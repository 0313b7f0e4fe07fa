use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not decode {path} with any of the encodings [{tried}]")]
    Encoding { path: PathBuf, tried: String },

    #[error("Missing required columns in {path}: expected one of {expected}")]
    MissingColumns { path: PathBuf, expected: String },

    #[error("No target-region city columns found in {0}")]
    NoRegionColumns(PathBuf),

    #[error("Download of {date} failed after {attempts} attempts: {reason}")]
    DownloadFailed {
        date: NaiveDate,
        attempts: u32,
        reason: String,
    },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing cancelled by user")]
    Cancelled,

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
