//! Runtime configuration.
//!
//! Sources are layered: serde defaults, then an optional TOML file, then
//! `AIRQ_`-prefixed environment variables using `__` as the section
//! separator (`AIRQ_DATABASE__URL`, `AIRQ_DOWNLOAD__RETRY_ATTEMPTS`).

use crate::error::{IngestError, Result};
use crate::utils::constants::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub paths: PathSettings,
    pub download: DownloadSettings,
    pub processing: ProcessingSettings,
    pub region: RegionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// sqlx connection string, e.g. `sqlite://data/air_quality.db`
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub download_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub base_url: String,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    pub max_workers: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub file_workers: usize,
    pub city_workers: usize,
    /// Ceiling on `file_workers * city_workers`
    pub max_total_workers: usize,
    pub batch_size: usize,
    pub encodings: Vec<String>,
    pub lookback_days: i64,
    pub target_table: String,
    pub save_processed_csv: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    pub province: String,
    pub cities: Vec<String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://data/air_quality.db".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 10,
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("data/new_data/raw_data"),
            processed_dir: PathBuf::from("data/new_data/processed_newdata"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_workers: DEFAULT_DOWNLOAD_WORKERS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            file_workers: num_cpus::get().clamp(1, DEFAULT_MAX_TOTAL_WORKERS / MAX_CITY_WORKERS),
            city_workers: MAX_CITY_WORKERS,
            max_total_workers: DEFAULT_MAX_TOTAL_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            encodings: DEFAULT_ENCODINGS.iter().map(|e| e.to_string()).collect(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            target_table: TARGET_TABLE.to_string(),
            save_processed_csv: true,
        }
    }
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            province: DEFAULT_PROVINCE.to_string(),
            cities: DEFAULT_CITIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix("AIRQ")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("processing.encodings")
                    .with_list_parse_key("region.cities"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let processing = &self.processing;

        if self.database.max_connections == 0 {
            return Err(IngestError::Config(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        if self.download.retry_attempts == 0 {
            return Err(IngestError::Config(
                "download.retry_attempts must be at least 1".to_string(),
            ));
        }

        if self.download.max_workers == 0 || processing.file_workers == 0 {
            return Err(IngestError::Config(
                "worker counts must be greater than 0".to_string(),
            ));
        }

        if processing.city_workers == 0 || processing.city_workers > MAX_CITY_WORKERS {
            return Err(IngestError::Config(format!(
                "processing.city_workers must be between 1 and {}, got {}",
                MAX_CITY_WORKERS, processing.city_workers
            )));
        }

        let total = processing.file_workers * processing.city_workers;
        if total > processing.max_total_workers {
            return Err(IngestError::Config(format!(
                "file_workers ({}) x city_workers ({}) = {} exceeds max_total_workers ({})",
                processing.file_workers,
                processing.city_workers,
                total,
                processing.max_total_workers
            )));
        }

        if processing.batch_size == 0 {
            return Err(IngestError::Config(
                "processing.batch_size must be greater than 0".to_string(),
            ));
        }

        if processing.lookback_days < 1 {
            return Err(IngestError::Config(
                "processing.lookback_days must be at least 1".to_string(),
            ));
        }

        if processing.encodings.is_empty() {
            return Err(IngestError::Config(
                "processing.encodings must list at least one encoding".to_string(),
            ));
        }

        let table = &processing.target_table;
        let is_identifier = !table.is_empty()
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !table.starts_with(|c: char| c.is_ascii_digit());
        if !is_identifier || table == IMPORT_LOG_TABLE {
            return Err(IngestError::Config(format!(
                "processing.target_table '{}' is not a usable table name",
                table
            )));
        }

        if self.region.cities.is_empty() {
            return Err(IngestError::Config(
                "region.cities must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn progress_file(&self) -> PathBuf {
        self.paths.log_dir.join(PROGRESS_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.paths.log_dir.join(LOG_FILE)
    }
}
