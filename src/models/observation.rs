use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use crate::models::QualityLevel;

/// Measured quantity named in the `type` column of a daily file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Indicator {
    Aqi,
    Pm25,
    Pm10,
    So2,
    No2,
    O3,
    Co,
}

impl Indicator {
    pub const POLLUTANTS: [Indicator; 6] = [
        Indicator::Pm25,
        Indicator::Pm10,
        Indicator::So2,
        Indicator::No2,
        Indicator::O3,
        Indicator::Co,
    ];

    /// Parse a `type` cell. Returns the indicator and whether it is the
    /// 24-hour average variant (`PM2.5_24h`).
    pub fn parse_type(value: &str) -> Option<(Self, bool)> {
        let value = value.trim();
        let (base, is_24h) = match value.strip_suffix("_24h") {
            Some(base) => (base, true),
            None => (value, false),
        };

        let indicator = match base {
            "AQI" => Indicator::Aqi,
            "PM2.5" => Indicator::Pm25,
            "PM10" => Indicator::Pm10,
            "SO2" => Indicator::So2,
            "NO2" => Indicator::No2,
            "O3" => Indicator::O3,
            "CO" => Indicator::Co,
            _ => return None,
        };

        Some((indicator, is_24h))
    }
}

/// One (date, hour, indicator) row of a daily file with its per-city cells.
/// Never persisted.
#[derive(Debug, Clone)]
pub struct ObservationRow {
    pub date: NaiveDate,
    pub hour: u8,
    pub indicator: Indicator,
    pub is_24h: bool,
    pub values: Vec<Option<f64>>,
}

impl ObservationRow {
    pub fn value(&self, column: usize) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }
}

/// Persisted unit: one city on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CityDayRecord {
    #[validate(length(min = 1))]
    pub city: String,

    pub record_date: NaiveDate,

    #[validate(required, range(min = 0.0, max = 500.0))]
    pub aqi: Option<f64>,

    #[validate(range(min = 0.0, max = 500.0))]
    pub pm25: Option<f64>,

    #[validate(range(min = 0.0, max = 600.0))]
    pub pm10: Option<f64>,

    #[validate(range(min = 0.0, max = 800.0))]
    pub so2: Option<f64>,

    #[validate(range(min = 0.0, max = 200.0))]
    pub no2: Option<f64>,

    #[validate(range(min = 0.0, max = 20.0))]
    pub co: Option<f64>,

    #[validate(range(min = 0.0, max = 300.0))]
    pub o3: Option<f64>,

    pub quality_level: Option<QualityLevel>,
    pub province: String,
    pub data_year: i32,
}

impl CityDayRecord {
    pub fn new(city: String, record_date: NaiveDate, aqi: Option<f64>, province: String) -> Self {
        Self {
            city,
            record_date,
            aqi,
            pm25: None,
            pm10: None,
            so2: None,
            no2: None,
            co: None,
            o3: None,
            quality_level: aqi.map(QualityLevel::from_aqi),
            province,
            data_year: record_date.year(),
        }
    }

    pub fn set_pollutant(&mut self, indicator: Indicator, value: Option<f64>) {
        match indicator {
            Indicator::Aqi => {
                self.aqi = value;
                self.quality_level = value.map(QualityLevel::from_aqi);
            }
            Indicator::Pm25 => self.pm25 = value,
            Indicator::Pm10 => self.pm10 = value,
            Indicator::So2 => self.so2 = value,
            Indicator::No2 => self.no2 = value,
            Indicator::O3 => self.o3 = value,
            Indicator::Co => self.co = value,
        }
    }

    pub fn pollutants(&self) -> [(Indicator, Option<f64>); 6] {
        [
            (Indicator::Pm25, self.pm25),
            (Indicator::Pm10, self.pm10),
            (Indicator::So2, self.so2),
            (Indicator::No2, self.no2),
            (Indicator::O3, self.o3),
            (Indicator::Co, self.co),
        ]
    }

    pub fn quality_label(&self) -> Option<&'static str> {
        self.quality_level.as_ref().map(QualityLevel::label)
    }

    /// Unique key in the observation tables
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.city, self.record_date)
    }
}

/// Keep the first record seen for every (city, record_date)
pub fn first_per_city_day<I>(records: I) -> Vec<CityDayRecord>
where
    I: IntoIterator<Item = CityDayRecord>,
{
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();
    let mut kept = Vec::new();

    for record in records {
        if seen.insert((record.city.clone(), record.record_date)) {
            kept.push(record);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_parse_type() {
        assert_eq!(Indicator::parse_type("AQI"), Some((Indicator::Aqi, false)));
        assert_eq!(Indicator::parse_type(" PM2.5 "), Some((Indicator::Pm25, false)));
        assert_eq!(Indicator::parse_type("PM2.5_24h"), Some((Indicator::Pm25, true)));
        assert_eq!(Indicator::parse_type("O3_8h"), None);
        assert_eq!(Indicator::parse_type("O3_8h_24h"), None);
        assert_eq!(Indicator::parse_type(""), None);
    }

    #[test]
    fn test_new_record_derives_quality_and_year() {
        let record = CityDayRecord::new("广州市".to_string(), date(1), Some(80.0), "广东省".to_string());

        assert_eq!(record.quality_level, Some(QualityLevel::Good));
        assert_eq!(record.data_year, 2024);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_set_aqi_rederives_quality() {
        let mut record = CityDayRecord::new("广州市".to_string(), date(1), None, "广东省".to_string());
        assert_eq!(record.quality_label(), None);

        record.set_pollutant(Indicator::Aqi, Some(160.0));
        assert_eq!(record.quality_label(), Some("中度污染"));

        record.set_pollutant(Indicator::Co, Some(0.8));
        assert_eq!(record.co, Some(0.8));
    }

    #[test]
    fn test_first_per_city_day() {
        let province = "广东省".to_string();
        let records = vec![
            CityDayRecord::new("广州市".to_string(), date(1), Some(40.0), province.clone()),
            CityDayRecord::new("广州市".to_string(), date(1), Some(90.0), province.clone()),
            CityDayRecord::new("深圳市".to_string(), date(1), Some(30.0), province.clone()),
            CityDayRecord::new("广州市".to_string(), date(2), Some(55.0), province),
        ];

        let kept = first_per_city_day(records);

        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].aqi, Some(40.0));
        assert_eq!(kept[2].key(), ("广州市", date(2)));
    }
}
