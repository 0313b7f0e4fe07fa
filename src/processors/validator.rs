use crate::models::CityDayRecord;
use tracing::debug;
use validator::Validate;

const MAX_SAMPLE_VIOLATIONS: usize = 5;

/// Outcome of validating one file's records
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub total_records: usize,
    pub valid_records: usize,
    pub rejected_records: usize,
    /// First few rejection reasons, for the log
    pub sample_violations: Vec<String>,
}

/// Range and completeness checks for city-day records. Rejected records
/// are dropped, never retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl RecordValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, record: &CityDayRecord) -> bool {
        self.violation(record).is_none()
    }

    /// Why a record is rejected, if it is
    pub fn violation(&self, record: &CityDayRecord) -> Option<String> {
        if record.city.trim().is_empty() {
            return Some("empty city".to_string());
        }

        if record.aqi.is_some_and(|v| !v.is_finite()) {
            return Some("non-finite aqi".to_string());
        }
        if let Some((indicator, _)) = record
            .pollutants()
            .into_iter()
            .find(|(_, value)| value.is_some_and(|v| !v.is_finite()))
        {
            return Some(format!("non-finite {:?}", indicator));
        }

        record.validate().err().map(|errors| errors.to_string())
    }

    /// Keep the valid records, in order
    pub fn filter_valid<I>(&self, records: I) -> (Vec<CityDayRecord>, ValidationReport)
    where
        I: IntoIterator<Item = CityDayRecord>,
    {
        let mut report = ValidationReport::default();
        let mut valid = Vec::new();

        for record in records {
            report.total_records += 1;

            match self.violation(&record) {
                None => valid.push(record),
                Some(reason) => {
                    debug!(city = %record.city, date = %record.record_date, %reason, "Rejected record");
                    report.rejected_records += 1;
                    if report.sample_violations.len() < MAX_SAMPLE_VIOLATIONS {
                        report
                            .sample_violations
                            .push(format!("{} {}: {}", record.city, record.record_date, reason));
                    }
                }
            }
        }

        report.valid_records = valid.len();
        (valid, report)
    }
}
