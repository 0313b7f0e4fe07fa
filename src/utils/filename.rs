use crate::utils::constants::{FILE_EXTENSION, FILE_PREFIX};
use chrono::NaiveDate;
use std::path::Path;

/// Name of the daily national file for a date: china_cities_{YYYYMMDD}.csv
pub fn daily_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", FILE_PREFIX, date.format("%Y%m%d"), FILE_EXTENSION)
}

/// Remote URL of the daily file for a date
pub fn daily_file_url(base_url: &str, date: NaiveDate) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), daily_file_name(date))
}

/// Name of the mirrored processed output for a date: {YYYYMMDD}.csv
pub fn processed_file_name(date: NaiveDate) -> String {
    format!("{}{}", date.format("%Y%m%d"), FILE_EXTENSION)
}

/// Extract the observation date from a daily file path
pub fn date_from_daily_file(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let stamp = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_EXTENSION)?;
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}
