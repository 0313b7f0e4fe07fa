use airq_ingest::config::Settings;
use airq_ingest::download::{Downloader, FetchError, RemoteSource};
use airq_ingest::models::CityDayRecord;
use airq_ingest::pipeline::{PipelineOrchestrator, PipelineState};
use airq_ingest::store::{self, count_records, import_log_for, records_for_date};
use airq_ingest::utils::constants::{DEFAULT_CITIES, TARGET_TABLE};
use airq_ingest::utils::daily_file_name;
use airq_ingest::utils::shutdown::ShutdownSignal;
use airq_ingest::writers::BatchWriter;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

const INDICATORS: [&str; 8] = ["AQI", "PM2.5", "PM2.5_24h", "PM10", "SO2", "NO2", "O3", "CO"];

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

/// National daily file: 21 target cities (some without the 市 suffix) plus
/// two cities outside the region, three hours of all indicators.
fn national_csv(date: NaiveDate) -> String {
    let mut header = vec!["date".to_string(), "hour".to_string(), "type".to_string(), "北京".to_string()];
    for (i, city) in DEFAULT_CITIES.iter().enumerate() {
        let name = if i % 2 == 0 { city.trim_end_matches('市') } else { city };
        header.push(name.to_string());
    }
    header.push("上海".to_string());

    let mut lines = vec![header.join(",")];
    let stamp = date.format("%Y%m%d").to_string();

    for hour in 0..3u32 {
        for indicator in INDICATORS {
            let mut row = vec![stamp.clone(), hour.to_string(), indicator.to_string(), "99".to_string()];
            for i in 0..DEFAULT_CITIES.len() {
                let value = match indicator {
                    // the first city has no usable AQI in hour 0
                    "AQI" if i == 0 && hour == 0 => String::new(),
                    "AQI" => format!("{}", 20 + i as u32 + hour),
                    "CO" => format!("{:.1}", 0.5 + i as f64 / 10.0),
                    _ => format!("{}", 10 + i as u32),
                };
                row.push(value);
            }
            row.push("88".to_string());
            lines.push(row.join(","));
        }
    }

    lines.join("\n") + "\n"
}

/// Serves generated national files; dates in `failing` always answer 500
struct FakeArchive {
    failing: HashSet<String>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl FakeArchive {
    fn new() -> Self {
        Self {
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, date: NaiveDate) -> Self {
        self.failing.insert(daily_file_name(date));
        self
    }
}

impl RemoteSource for FakeArchive {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(url.to_string());

        let name = url.rsplit('/').next().unwrap_or_default();
        if self.failing.contains(name) {
            return Err(FetchError::Status(500));
        }

        let stamp = name
            .trim_start_matches("china_cities_")
            .trim_end_matches(".csv");
        let date = NaiveDate::parse_from_str(stamp, "%Y%m%d").map_err(|_| FetchError::Status(404))?;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        Ok(national_csv(date).into_bytes())
    }
}

fn test_settings(dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.database.url = format!("sqlite://{}", dir.path().join("db").join("aq.db").display());
    settings.paths.download_dir = dir.path().join("raw");
    settings.paths.processed_dir = dir.path().join("processed");
    settings.paths.log_dir = dir.path().join("logs");
    settings.download.base_url = "http://archive.test/air/data".to_string();
    settings.download.retry_attempts = 2;
    settings.download.retry_delay_secs = 0;
    settings.processing.file_workers = 2;
    settings.processing.city_workers = 2;
    settings
}

/// Seed the target table so the reconciler starts after `latest`
async fn seed_latest(settings: &Settings, latest: NaiveDate) {
    let pool = store::connect(&settings.database).await.unwrap();
    store::ensure_schema(&pool, TARGET_TABLE).await.unwrap();

    let record = CityDayRecord::new("广州市".to_string(), latest, Some(40.0), "广东省".to_string());
    BatchWriter::new(pool.clone(), TARGET_TABLE, 100)
        .write(&[record])
        .await
        .unwrap();
    pool.close().await;
}

#[tokio::test]
async fn test_two_missing_dates_are_ingested() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    seed_latest(&settings, date(1)).await;

    let mut orchestrator = PipelineOrchestrator::new(settings.clone(), FakeArchive::new(), ShutdownSignal::new())
        .with_today(date(4));
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.final_state, PipelineState::Done);
    assert_eq!(summary.files_attempted, 2);
    assert_eq!(summary.files_succeeded, 2);
    assert_eq!(summary.records_written, 42);
    assert_eq!(summary.records_rejected, 0);
    assert!(summary.is_clean());

    let pool = store::connect(&settings.database).await.unwrap();
    let stored = records_for_date(&pool, TARGET_TABLE, date(2)).await.unwrap();
    assert_eq!(stored.len(), 21);

    // hour 0 had no AQI for 广州, so hour 1 represents the day
    let guangzhou = stored.iter().find(|r| r.city == "广州市").unwrap();
    assert_eq!(guangzhou.aqi, Some(21.0));
    assert_eq!(guangzhou.pm25, Some(10.0));
    assert_eq!(guangzhou.co, Some(0.5));
    assert_eq!(guangzhou.province, "广东省");

    assert!(stored.iter().all(|r| r.city != "北京" && r.city != "上海"));
    assert_eq!(
        import_log_for(&pool, "china_cities_20240503.csv").await.unwrap(),
        vec![("SUCCESS".to_string(), 21)]
    );
    assert!(settings.paths.processed_dir.join("20240502.csv").exists());
    assert!(settings.paths.log_dir.join("progress.json").exists());
}

#[tokio::test]
async fn test_second_run_finds_nothing_missing() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    seed_latest(&settings, date(1)).await;

    let mut first = PipelineOrchestrator::new(settings.clone(), FakeArchive::new(), ShutdownSignal::new())
        .with_today(date(4));
    first.run().await.unwrap();

    let archive = FakeArchive::new();
    let mut second = PipelineOrchestrator::new(settings.clone(), archive, ShutdownSignal::new()).with_today(date(4));

    assert!(second.missing_dates().await.unwrap().is_empty());
    let summary = second.run().await.unwrap();

    assert_eq!(summary.files_attempted, 0);
    assert_eq!(second.state(), PipelineState::Done);

    let pool = store::connect(&settings.database).await.unwrap();
    assert_eq!(count_records(&pool, TARGET_TABLE).await.unwrap(), 43);
}

#[tokio::test]
async fn test_failing_date_is_skipped_and_others_complete() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    seed_latest(&settings, date(1)).await;

    let archive = FakeArchive::new().failing_on(date(2));
    let mut orchestrator =
        PipelineOrchestrator::new(settings.clone(), archive, ShutdownSignal::new()).with_today(date(4));
    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.final_state, PipelineState::Done);
    assert_eq!(summary.files_attempted, 2);
    assert_eq!(summary.files_succeeded, 1);
    assert_eq!(summary.download_failures, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(!summary.is_clean());

    assert!(!settings.paths.download_dir.join("china_cities_20240502.csv").exists());

    let pool = store::connect(&settings.database).await.unwrap();
    assert!(records_for_date(&pool, TARGET_TABLE, date(2)).await.unwrap().is_empty());
    assert_eq!(records_for_date(&pool, TARGET_TABLE, date(3)).await.unwrap().len(), 21);
}

#[tokio::test]
async fn test_concurrent_downloads_do_not_mix_contents() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    let downloader = Downloader::new(FakeArchive::new(), &settings.download, &settings.paths.download_dir);
    let dates: Vec<NaiveDate> = (1..=12).map(date).collect();

    let batch = downloader.fetch_all(&dates, None).await;

    assert_eq!(batch.downloaded.len(), 12);
    for (date, path) in &batch.downloaded {
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, national_csv(*date), "content of {}", path.display());
    }
    assert_eq!(downloader.cache().len(), 12);
}

#[tokio::test]
async fn test_process_existing_skips_mirrored_days() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    std::fs::create_dir_all(&settings.paths.download_dir).unwrap();
    std::fs::create_dir_all(&settings.paths.processed_dir).unwrap();

    for day in [5, 6] {
        std::fs::write(
            settings.paths.download_dir.join(daily_file_name(date(day))),
            national_csv(date(day)),
        )
        .unwrap();
    }
    std::fs::write(settings.paths.download_dir.join("notes.txt"), "ignored").unwrap();
    std::fs::write(settings.paths.processed_dir.join("20240505.csv"), "city\n").unwrap();

    let archive = FakeArchive::new();
    let mut orchestrator = PipelineOrchestrator::new(settings.clone(), archive, ShutdownSignal::new());
    let summary = orchestrator.process_existing().await.unwrap();

    assert_eq!(summary.files_attempted, 1);
    assert_eq!(summary.files_succeeded, 1);
    assert_eq!(summary.records_written, 21);

    let pool = store::connect(&settings.database).await.unwrap();
    assert!(records_for_date(&pool, TARGET_TABLE, date(5)).await.unwrap().is_empty());
    assert_eq!(records_for_date(&pool, TARGET_TABLE, date(6)).await.unwrap().len(), 21);
}

#[tokio::test]
async fn test_reprocessing_a_day_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    std::fs::create_dir_all(&settings.paths.download_dir).unwrap();
    std::fs::write(
        settings.paths.download_dir.join(daily_file_name(date(7))),
        national_csv(date(7)),
    )
    .unwrap();

    let mut orchestrator = PipelineOrchestrator::new(settings.clone(), FakeArchive::new(), ShutdownSignal::new());
    orchestrator.process_existing().await.unwrap();
    let pool = store::connect(&settings.database).await.unwrap();
    let before = records_for_date(&pool, TARGET_TABLE, date(7)).await.unwrap();

    std::fs::remove_file(settings.paths.processed_dir.join("20240507.csv")).unwrap();
    orchestrator.process_existing().await.unwrap();
    let after = records_for_date(&pool, TARGET_TABLE, date(7)).await.unwrap();

    assert_eq!(before.len(), 21);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_setup_failure_ends_in_failed_state() {
    let dir = TempDir::new().unwrap();
    let mut settings = test_settings(&dir);
    // a directory cannot be opened as a database file
    std::fs::create_dir_all(dir.path().join("not_a_file.db")).unwrap();
    settings.database.url = format!("sqlite://{}", dir.path().join("not_a_file.db").display());

    let archive = FakeArchive::new();
    let mut orchestrator = PipelineOrchestrator::new(settings, archive, ShutdownSignal::new()).with_today(date(4));

    assert!(orchestrator.run().await.is_err());
    assert_eq!(orchestrator.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_unreadable_legacy_table_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);

    // a legacy table from another schema, without record_date
    let pool = store::connect(&settings.database).await.unwrap();
    sqlx::query("CREATE TABLE air_quality_data (city TEXT, day TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let archive = FakeArchive::new();
    let mut orchestrator =
        PipelineOrchestrator::new(settings.clone(), archive, ShutdownSignal::new()).with_today(date(4));

    assert!(orchestrator.run().await.is_err());
    assert_eq!(orchestrator.state(), PipelineState::Failed);
    assert!(orchestrator.missing_dates().await.is_err());
    assert_eq!(orchestrator.state(), PipelineState::Failed);
}

#[tokio::test]
async fn test_shutdown_before_run_downloads_nothing() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);
    seed_latest(&settings, date(1)).await;

    let shutdown = ShutdownSignal::new();
    shutdown.request();
    let mut orchestrator =
        PipelineOrchestrator::new(settings.clone(), FakeArchive::new(), shutdown).with_today(date(4));
    let summary = orchestrator.run().await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.files_succeeded, 0);
    assert_eq!(summary.final_state, PipelineState::Done);
}
