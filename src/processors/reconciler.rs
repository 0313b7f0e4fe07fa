use crate::error::Result;
use crate::store::latest_record_date;
use crate::utils::constants::LEGACY_TABLE;
use chrono::{Duration, NaiveDate};
use sqlx::SqlitePool;
use tracing::info;

/// Dates from the day after `latest` through yesterday. With no stored data
/// the window runs from `lookback_days` before yesterday through yesterday.
/// Today is never included since its file is still being published.
pub fn missing_dates(latest: Option<NaiveDate>, today: NaiveDate, lookback_days: i64) -> Vec<NaiveDate> {
    let yesterday = today - Duration::days(1);
    let start = match latest {
        Some(latest) => latest + Duration::days(1),
        None => yesterday - Duration::days(lookback_days.max(0)),
    };

    start
        .iter_days()
        .take_while(|date| *date <= yesterday)
        .collect()
}

/// Works out which daily files still have to be ingested by comparing the
/// legacy and target tables against the calendar
pub struct DateRangeReconciler {
    pool: SqlitePool,
    tables: Vec<String>,
    lookback_days: i64,
}

impl DateRangeReconciler {
    pub fn new(pool: SqlitePool, target_table: &str, lookback_days: i64) -> Self {
        Self {
            pool,
            tables: vec![LEGACY_TABLE.to_string(), target_table.to_string()],
            lookback_days,
        }
    }

    /// Latest record date across both tables
    pub async fn latest_date(&self) -> Result<Option<NaiveDate>> {
        let mut latest = None;
        for table in &self.tables {
            latest = latest.max(latest_record_date(&self.pool, table).await?);
        }
        Ok(latest)
    }

    pub async fn reconcile(&self, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        let latest = self.latest_date().await?;
        let dates = missing_dates(latest, today, self.lookback_days);

        match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => info!(
                latest = ?latest,
                count = dates.len(),
                "Missing dates {} to {}",
                first,
                last
            ),
            _ => info!(latest = ?latest, "Store is up to date"),
        }

        Ok(dates)
    }
}
