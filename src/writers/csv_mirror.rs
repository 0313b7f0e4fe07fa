use crate::error::{IngestError, Result};
use crate::models::CityDayRecord;
use crate::utils::filename::processed_file_name;
use crate::utils::write_atomic;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

pub const MIRROR_HEADER: [&str; 12] = [
    "city",
    "record_date",
    "aqi",
    "pm25",
    "pm10",
    "so2",
    "no2",
    "co",
    "o3",
    "quality_level",
    "province",
    "data_year",
];

#[derive(Serialize)]
struct MirrorRow<'a> {
    city: &'a str,
    record_date: String,
    aqi: Option<f64>,
    pm25: Option<f64>,
    pm10: Option<f64>,
    so2: Option<f64>,
    no2: Option<f64>,
    co: Option<f64>,
    o3: Option<f64>,
    quality_level: Option<&'static str>,
    province: &'a str,
    data_year: i32,
}

impl<'a> From<&'a CityDayRecord> for MirrorRow<'a> {
    fn from(record: &'a CityDayRecord) -> Self {
        Self {
            city: &record.city,
            record_date: record.record_date.format("%Y-%m-%d").to_string(),
            aqi: record.aqi,
            pm25: record.pm25,
            pm10: record.pm10,
            so2: record.so2,
            no2: record.no2,
            co: record.co,
            o3: record.o3,
            quality_level: record.quality_label(),
            province: &record.province,
            data_year: record.data_year,
        }
    }
}

/// Per-day CSV copy of what was written to the store. Its presence also
/// marks a raw file as already processed.
#[derive(Debug, Clone)]
pub struct CsvMirror {
    dir: PathBuf,
}

impl CsvMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(processed_file_name(date))
    }

    pub fn exists(&self, date: NaiveDate) -> bool {
        self.path_for(date).is_file()
    }

    /// Write the day's records sorted by city. No records still produces a
    /// header-only file.
    pub fn write(&self, date: NaiveDate, records: &[CityDayRecord]) -> Result<PathBuf> {
        let mut sorted: Vec<&CityDayRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.city.cmp(&b.city));

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(MIRROR_HEADER)?;
        for record in sorted {
            writer.serialize(MirrorRow::from(record))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| IngestError::InvalidFormat(format!("CSV buffer flush failed: {}", e)))?;

        let path = self.path_for(date);
        write_atomic(&path, &bytes)?;

        debug!(path = %path.display(), rows = records.len(), "Processed CSV written");
        Ok(path)
    }
}
