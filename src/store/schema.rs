use crate::error::Result;
use crate::utils::constants::{IMPORT_LOG_TABLE, LEGACY_TABLE};
use sqlx::SqlitePool;
use tracing::info;

fn observation_table_ddl(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            city TEXT NOT NULL,
            province TEXT,
            record_date TEXT NOT NULL,
            aqi_index REAL,
            quality_level TEXT,
            aqi_rank INTEGER,
            pm25_avg REAL,
            pm10_avg REAL,
            so2_avg REAL,
            no2_avg REAL,
            co_avg REAL,
            o3_avg REAL,
            data_year INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (city, record_date)
        )
        "#
    )
}

fn import_log_ddl() -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {IMPORT_LOG_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            records_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            message TEXT,
            timestamp TIMESTAMP NOT NULL
        )
        "#
    )
}

/// Create the legacy, target and import-log tables if they do not exist.
/// Safe to run on every start.
pub async fn ensure_schema(pool: &SqlitePool, target_table: &str) -> Result<()> {
    for table in [LEGACY_TABLE, target_table] {
        sqlx::query(&observation_table_ddl(table)).execute(pool).await?;
    }
    sqlx::query(&import_log_ddl()).execute(pool).await?;

    info!(target_table, "Schema verified");
    Ok(())
}
