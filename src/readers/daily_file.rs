use crate::config::{ProcessingSettings, RegionSettings};
use crate::error::{IngestError, Result};
use crate::models::{CityDayRecord, Indicator, ObservationRow};
use crate::readers::city_matcher::{CityColumn, CityColumnCache};
use crate::readers::decoder::TextDecoder;
use crate::utils::constants::{REQUIRED_COLUMNS, REQUIRED_COLUMNS_LOCALIZED};
use chrono::NaiveDate;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::{btree_map, BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters describing one parsed file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub encoding: String,
    pub city_columns: usize,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub rows_ignored: usize,
    pub groups: usize,
}

/// Parses national daily files into per-city daily records for the
/// configured region
pub struct DailyFileParser {
    decoder: TextDecoder,
    cities: Arc<Vec<String>>,
    province: Arc<str>,
    columns: CityColumnCache,
    city_pool: Arc<ThreadPool>,
}

impl DailyFileParser {
    pub fn new(processing: &ProcessingSettings, region: &RegionSettings) -> Result<Self> {
        let city_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(processing.city_workers)
            .thread_name(|i| format!("airq-city-{}", i))
            .build()
            .map_err(|e| IngestError::Config(e.to_string()))?;

        Ok(Self {
            decoder: TextDecoder::new(&processing.encodings)?,
            cities: Arc::new(region.cities.clone()),
            province: Arc::from(region.province.as_str()),
            columns: CityColumnCache::new(),
            city_pool: Arc::new(city_pool),
        })
    }

    /// Decode and read a daily file. Records are built group by group as
    /// the returned iterator is consumed.
    pub fn parse(&self, path: &Path) -> Result<CityDayRecords> {
        let bytes = std::fs::read(path)?;
        let (text, encoding) = self
            .decoder
            .decode(&bytes)
            .ok_or_else(|| IngestError::Encoding {
                path: path.to_path_buf(),
                tried: self.decoder.labels(),
            })?;

        let mut stats = ParseStats {
            encoding: encoding.to_string(),
            ..ParseStats::default()
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let required = required_columns(&headers).ok_or_else(|| IngestError::MissingColumns {
            path: path.to_path_buf(),
            expected: format!(
                "[{}] or [{}]",
                REQUIRED_COLUMNS.join(", "),
                REQUIRED_COLUMNS_LOCALIZED.join(", ")
            ),
        })?;

        let columns = self.columns.resolve(&headers, &self.cities, &required);
        if columns.is_empty() {
            return Err(IngestError::NoRegionColumns(path.to_path_buf()));
        }
        stats.city_columns = columns.len();

        let [date_col, hour_col, type_col] = required;
        let mut groups: BTreeMap<(NaiveDate, u8), HourGroup> = BTreeMap::new();

        for result in reader.records() {
            let row = result?;
            stats.rows_read += 1;

            let Some((indicator, is_24h)) = row.get(type_col).and_then(Indicator::parse_type) else {
                stats.rows_ignored += 1;
                continue;
            };

            let date = row.get(date_col).and_then(parse_date);
            let hour = row.get(hour_col).and_then(parse_hour);
            let (Some(date), Some(hour)) = (date, hour) else {
                warn!(
                    "Skipping row {} of {}: unparsable date/hour ({:?}, {:?})",
                    stats.rows_read,
                    path.display(),
                    row.get(date_col),
                    row.get(hour_col)
                );
                stats.rows_skipped += 1;
                continue;
            };

            let values = columns
                .iter()
                .map(|c| row.get(c.column).and_then(parse_value))
                .collect();

            groups.entry((date, hour)).or_default().insert(ObservationRow {
                date,
                hour,
                indicator,
                is_24h,
                values,
            });
        }

        stats.groups = groups.len();
        debug!(
            "Read {} ({}): {} rows, {} groups, {} city columns",
            path.display(),
            stats.encoding,
            stats.rows_read,
            stats.groups,
            stats.city_columns
        );

        Ok(CityDayRecords {
            groups: groups.into_iter(),
            pending: Vec::new().into_iter(),
            columns,
            province: Arc::clone(&self.province),
            city_pool: Arc::clone(&self.city_pool),
            stats,
        })
    }
}

/// Same-timestamp rows keyed by indicator, hourly and 24h average kept apart
#[derive(Debug, Default)]
struct HourGroup {
    hourly: HashMap<Indicator, ObservationRow>,
    daily: HashMap<Indicator, ObservationRow>,
}

impl HourGroup {
    fn insert(&mut self, row: ObservationRow) {
        let rows = if row.is_24h { &mut self.daily } else { &mut self.hourly };
        rows.entry(row.indicator).or_insert(row);
    }

    fn has_aqi(&self) -> bool {
        self.hourly.contains_key(&Indicator::Aqi) || self.daily.contains_key(&Indicator::Aqi)
    }

    fn value(&self, indicator: Indicator, column: usize) -> Option<f64> {
        self.hourly
            .get(&indicator)
            .and_then(|row| row.value(column))
            .or_else(|| self.daily.get(&indicator).and_then(|row| row.value(column)))
    }

    fn extract(&self, date: NaiveDate, index: usize, column: &CityColumn, province: &str) -> Option<CityDayRecord> {
        let aqi = self.value(Indicator::Aqi, index)?;
        let mut record = CityDayRecord::new(column.city.clone(), date, Some(aqi), province.to_string());

        for indicator in Indicator::POLLUTANTS {
            record.set_pollutant(indicator, self.value(indicator, index));
        }

        Some(record)
    }
}

/// Lazy sequence of records, in (date, hour) order and column order within
/// a group
pub struct CityDayRecords {
    groups: btree_map::IntoIter<(NaiveDate, u8), HourGroup>,
    pending: std::vec::IntoIter<CityDayRecord>,
    columns: Arc<Vec<CityColumn>>,
    province: Arc<str>,
    city_pool: Arc<ThreadPool>,
    stats: ParseStats,
}

impl CityDayRecords {
    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    fn extract_group(&self, date: NaiveDate, group: &HourGroup) -> Vec<CityDayRecord> {
        let columns = &self.columns;
        let province = &*self.province;

        self.city_pool.install(|| {
            columns
                .par_iter()
                .enumerate()
                .filter_map(|(index, column)| group.extract(date, index, column, province))
                .collect()
        })
    }
}

impl Iterator for CityDayRecords {
    type Item = CityDayRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.next() {
                return Some(record);
            }

            let ((date, _hour), group) = self.groups.next()?;
            if !group.has_aqi() {
                continue;
            }

            self.pending = self.extract_group(date, &group).into_iter();
        }
    }
}

/// Indices of the date, hour and type columns, accepting either naming
fn required_columns(headers: &[String]) -> Option<[usize; 3]> {
    let find = |i: usize| {
        headers.iter().position(|h| {
            h.eq_ignore_ascii_case(REQUIRED_COLUMNS[i]) || h == REQUIRED_COLUMNS_LOCALIZED[i]
        })
    };

    Some([find(0)?, find(1)?, find(2)?])
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

fn parse_hour(value: &str) -> Option<u8> {
    let hour = value.parse::<u8>().ok().or_else(|| {
        let float = value.parse::<f64>().ok()?;
        (float.fract() == 0.0 && (0.0..24.0).contains(&float)).then_some(float as u8)
    })?;

    (hour < 24).then_some(hour)
}

fn parse_value(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}
