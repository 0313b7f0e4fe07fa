use crate::error::Result;
use crate::models::{CityDayRecord, ImportLogEntry, QualityLevel};
use crate::utils::constants::IMPORT_LOG_TABLE;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use tracing::warn;

/// Latest `record_date` in a table. The legacy table may hold date-time
/// strings, so only the leading `YYYY-MM-DD` is parsed.
pub async fn latest_record_date(pool: &SqlitePool, table: &str) -> Result<Option<NaiveDate>> {
    let latest: Option<String> = sqlx::query_scalar(&format!("SELECT MAX(record_date) FROM {table}"))
        .fetch_one(pool)
        .await?;

    Ok(latest.and_then(|value| {
        let parsed = value
            .get(..10)
            .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok());
        if parsed.is_none() {
            warn!(table, value = %value, "Unparsable latest record_date");
        }
        parsed
    }))
}

/// Records stored for one day, ordered by city
pub async fn records_for_date(pool: &SqlitePool, table: &str, date: NaiveDate) -> Result<Vec<CityDayRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT city, province, record_date, aqi_index, quality_level, pm25_avg, pm10_avg, \
         so2_avg, no2_avg, co_avg, o3_avg, data_year FROM {table} WHERE record_date = ? ORDER BY city"
    ))
    .bind(date.format("%Y-%m-%d").to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<CityDayRecord> {
            Ok(CityDayRecord {
                city: row.try_get("city")?,
                record_date: date,
                aqi: row.try_get("aqi_index")?,
                pm25: row.try_get("pm25_avg")?,
                pm10: row.try_get("pm10_avg")?,
                so2: row.try_get("so2_avg")?,
                no2: row.try_get("no2_avg")?,
                co: row.try_get("co_avg")?,
                o3: row.try_get("o3_avg")?,
                quality_level: row
                    .try_get::<Option<String>, _>("quality_level")?
                    .as_deref()
                    .and_then(QualityLevel::from_label),
                province: row.try_get::<Option<String>, _>("province")?.unwrap_or_default(),
                data_year: row.try_get::<Option<i64>, _>("data_year")?.unwrap_or_default() as i32,
            })
        })
        .collect()
}

pub async fn count_records(pool: &SqlitePool, table: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn insert_import_log(pool: &SqlitePool, entry: &ImportLogEntry) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO {IMPORT_LOG_TABLE} (filename, records_count, status, message, timestamp) VALUES (?, ?, ?, ?, ?)"
    ))
    .bind(&entry.filename)
    .bind(entry.records_count)
    .bind(entry.status.as_str())
    .bind(&entry.message)
    .bind(entry.timestamp.naive_local())
    .execute(pool)
    .await?;

    Ok(())
}

/// Import-log rows for a file as (status, records_count), oldest first
pub async fn import_log_for(pool: &SqlitePool, filename: &str) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
        "SELECT status, records_count FROM {IMPORT_LOG_TABLE} WHERE filename = ? ORDER BY id"
    ))
    .bind(filename)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
