use crate::config::DatabaseSettings;
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Open the shared connection pool, creating the database file (and its
/// directory) when missing.
pub async fn connect(settings: &DatabaseSettings) -> Result<SqlitePool> {
    let acquire_timeout = Duration::from_secs(settings.acquire_timeout_secs);
    let options = SqliteConnectOptions::from_str(&settings.url)?
        .create_if_missing(true)
        .busy_timeout(acquire_timeout);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(acquire_timeout)
        .connect_with(options)
        .await?;

    info!(
        url = %settings.url,
        max_connections = settings.max_connections,
        "Database pool ready"
    );

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_creates_database_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("aq.db");
        let settings = DatabaseSettings {
            url: format!("sqlite://{}", path.display()),
            max_connections: 2,
            acquire_timeout_secs: 5,
        };

        let pool = connect(&settings).await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.unwrap();

        assert_eq!(one, 1);
        assert!(path.exists());
    }
}
