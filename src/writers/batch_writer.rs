use crate::error::Result;
use crate::models::{CityDayRecord, ImportLogEntry, ImportStatus};
use crate::store::insert_import_log;
use crate::utils::shutdown::ShutdownSignal;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

const COLUMNS: &str = "city, province, record_date, aqi_index, quality_level, \
    pm25_avg, pm10_avg, so2_avg, no2_avg, co_avg, o3_avg, data_year";
const BINDS_PER_ROW: usize = 12;
const MAX_BIND_PARAMS: usize = 32_766;

// AQI and its derived columns are always replaced; a null pollutant
// reading never erases a stored value.
const UPSERT_CLAUSE: &str = " ON CONFLICT(city, record_date) DO UPDATE SET \
    aqi_index = excluded.aqi_index, \
    quality_level = excluded.quality_level, \
    province = excluded.province, \
    data_year = excluded.data_year, \
    pm25_avg = COALESCE(excluded.pm25_avg, pm25_avg), \
    pm10_avg = COALESCE(excluded.pm10_avg, pm10_avg), \
    so2_avg = COALESCE(excluded.so2_avg, so2_avg), \
    no2_avg = COALESCE(excluded.no2_avg, no2_avg), \
    co_avg = COALESCE(excluded.co_avg, co_avg), \
    o3_avg = COALESCE(excluded.o3_avg, o3_avg)";

/// Result of writing one set of records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub attempted: usize,
    pub written: usize,
    pub failed_rows: usize,
    /// Set when shutdown stopped the write before every batch ran
    pub cancelled: bool,
}

impl WriteOutcome {
    pub fn status(&self) -> ImportStatus {
        ImportStatus::from_counts(self.attempted, self.written)
    }
}

/// Upserts city-day records in multi-row batches
#[derive(Debug, Clone)]
pub struct BatchWriter {
    pool: SqlitePool,
    table: String,
    batch_size: usize,
    shutdown: ShutdownSignal,
}

impl BatchWriter {
    pub fn new(pool: SqlitePool, table: impl Into<String>, batch_size: usize) -> Self {
        Self {
            pool,
            table: table.into(),
            batch_size: batch_size.clamp(1, MAX_BIND_PARAMS / BINDS_PER_ROW),
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Upsert `records` batch by batch. A batch that fails as a whole is
    /// retried row by row; rows that still fail are dropped and logged.
    pub async fn write(&self, records: &[CityDayRecord]) -> Result<WriteOutcome> {
        let mut outcome = WriteOutcome {
            attempted: records.len(),
            ..WriteOutcome::default()
        };

        for batch in records.chunks(self.batch_size) {
            if self.shutdown.is_requested() {
                warn!(
                    remaining = outcome.attempted - outcome.written - outcome.failed_rows,
                    "Shutdown requested, not starting further batches"
                );
                outcome.cancelled = true;
                break;
            }

            match self.upsert_batch(batch).await {
                Ok(()) => outcome.written += batch.len(),
                Err(e) => {
                    warn!(rows = batch.len(), error = %e, "Batch upsert failed, falling back to row-by-row");
                    let written = self.upsert_rows(batch).await;
                    outcome.written += written;
                    outcome.failed_rows += batch.len() - written;
                }
            }
        }

        debug!(
            table = %self.table,
            attempted = outcome.attempted,
            written = outcome.written,
            "Write complete"
        );
        Ok(outcome)
    }

    /// Write the records of one file and record the result in the import log
    pub async fn write_file(&self, filename: &str, records: &[CityDayRecord]) -> Result<WriteOutcome> {
        let outcome = self.write(records).await?;
        let status = outcome.status();

        let message = match status {
            ImportStatus::Success => format!("Imported {} records into {}", outcome.written, self.table),
            ImportStatus::Partial => format!(
                "Imported {} of {} records into {} ({} failed{})",
                outcome.written,
                outcome.attempted,
                self.table,
                outcome.failed_rows,
                if outcome.cancelled { ", cancelled" } else { "" }
            ),
            ImportStatus::Failed => format!(
                "No records imported into {} ({} attempted{})",
                self.table,
                outcome.attempted,
                if outcome.cancelled { ", cancelled" } else { "" }
            ),
        };

        insert_import_log(
            &self.pool,
            &ImportLogEntry::new(filename, outcome.written, status, message),
        )
        .await?;

        info!(file = filename, status = %status, written = outcome.written, "Import logged");
        Ok(outcome)
    }

    /// Record a file that failed before reaching the writer
    pub async fn log_failure(&self, filename: &str, message: &str) -> Result<()> {
        insert_import_log(
            &self.pool,
            &ImportLogEntry::new(filename, 0, ImportStatus::Failed, message),
        )
        .await
    }

    async fn upsert_batch(&self, batch: &[CityDayRecord]) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) ", self.table, COLUMNS));
        builder.push_values(batch, |mut row, record| {
            row.push_bind(record.city.as_str())
                .push_bind(record.province.as_str())
                .push_bind(record.record_date)
                .push_bind(record.aqi)
                .push_bind(record.quality_label())
                .push_bind(record.pm25)
                .push_bind(record.pm10)
                .push_bind(record.so2)
                .push_bind(record.no2)
                .push_bind(record.co)
                .push_bind(record.o3)
                .push_bind(record.data_year);
        });
        builder.push(UPSERT_CLAUSE);

        builder.build().execute(&mut *conn).await?;
        Ok(())
    }

    async fn upsert_rows(&self, batch: &[CityDayRecord]) -> usize {
        let mut written = 0;

        for record in batch {
            match self.upsert_batch(std::slice::from_ref(record)).await {
                Ok(()) => written += 1,
                Err(e) => warn!(
                    city = %record.city,
                    date = %record.record_date,
                    error = %e,
                    "Dropping row that failed to upsert"
                ),
            }
        }

        written
    }
}
