use crate::config::DownloadSettings;
use crate::download::source::RemoteSource;
use crate::error::{IngestError, Result};
use crate::utils::filename::{daily_file_name, daily_file_url};
use crate::utils::progress::ProgressReporter;
use crate::utils::shutdown::ShutdownSignal;
use crate::utils::write_atomic;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// URL -> local path of files already fetched by a downloader
#[derive(Debug, Default)]
pub struct DownloadCache {
    entries: Mutex<HashMap<String, PathBuf>>,
}

impl DownloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<PathBuf> {
        self.entries.lock().ok()?.get(url).cloned()
    }

    pub fn insert(&self, url: String, path: PathBuf) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(url, path);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of `fetch_all`, both lists sorted by date
#[derive(Debug, Default)]
pub struct DownloadBatch {
    pub downloaded: Vec<(NaiveDate, PathBuf)>,
    pub failed: Vec<(NaiveDate, String)>,
    pub cancelled: usize,
}

impl DownloadBatch {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }
}

pub struct Downloader<S> {
    source: S,
    base_url: String,
    download_dir: PathBuf,
    retry_attempts: u32,
    retry_delay: Duration,
    max_workers: usize,
    cache: DownloadCache,
    shutdown: ShutdownSignal,
}

impl<S: RemoteSource> Downloader<S> {
    pub fn new(source: S, settings: &DownloadSettings, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            base_url: settings.base_url.clone(),
            download_dir: download_dir.into(),
            retry_attempts: settings.retry_attempts.max(1),
            retry_delay: Duration::from_secs(settings.retry_delay_secs),
            max_workers: settings.max_workers.max(1),
            cache: DownloadCache::new(),
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn cache(&self) -> &DownloadCache {
        &self.cache
    }

    pub fn local_path(&self, date: NaiveDate) -> PathBuf {
        self.download_dir.join(daily_file_name(date))
    }

    /// Fetch the daily file for `date`, reusing a cached or already present
    /// file. Transient failures are retried with a fixed delay.
    pub async fn fetch(&self, date: NaiveDate) -> Result<PathBuf> {
        let url = daily_file_url(&self.base_url, date);

        if let Some(path) = self.cache.get(&url) {
            debug!("Cache hit for {}", url);
            return Ok(path);
        }

        let path = self.local_path(date);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("{} already on disk, skipping download", path.display());
            self.cache.insert(url, path.clone());
            return Ok(path);
        }

        let mut last_error = String::new();

        for attempt in 1..=self.retry_attempts {
            if self.shutdown.is_requested() {
                return Err(IngestError::Cancelled);
            }

            match self.source.fetch(&url).await {
                Ok(bytes) => {
                    let target = path.clone();
                    tokio::task::spawn_blocking(move || write_atomic(&target, &bytes)).await??;

                    info!("Downloaded {} ({} attempt(s))", url, attempt);
                    self.cache.insert(url, path.clone());
                    return Ok(path);
                }
                Err(e) => {
                    warn!(
                        "Download attempt {}/{} for {} failed: {}",
                        attempt, self.retry_attempts, url, e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < self.retry_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        warn!("Giving up on {} after {} attempts", url, self.retry_attempts);
        Err(IngestError::DownloadFailed {
            date,
            attempts: self.retry_attempts,
            reason: last_error,
        })
    }

    /// Fetch every date on a pool of min(max_workers, dates) concurrent
    /// downloads. Failures are collected, never propagated.
    pub async fn fetch_all(&self, dates: &[NaiveDate], progress: Option<&ProgressReporter>) -> DownloadBatch {
        let mut batch = DownloadBatch::default();
        if dates.is_empty() {
            return batch;
        }

        let workers = self.max_workers.min(dates.len());
        info!("Downloading {} file(s) with {} worker(s)", dates.len(), workers);

        let results: Vec<(NaiveDate, Result<PathBuf>)> = stream::iter(dates.iter().copied())
            .map(|date| async move {
                let result = self.fetch(date).await;
                if let Some(p) = progress {
                    p.increment(1);
                }
                (date, result)
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        for (date, result) in results {
            match result {
                Ok(path) => batch.downloaded.push((date, path)),
                Err(IngestError::Cancelled) => batch.cancelled += 1,
                Err(e) => batch.failed.push((date, e.to_string())),
            }
        }

        batch.downloaded.sort_by_key(|(date, _)| *date);
        batch.failed.sort_by_key(|(date, _)| *date);
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::source::FetchError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Scripted source: pops one response per call for a URL, then repeats
    /// the fallback.
    struct ScriptedSource {
        scripted: Mutex<HashMap<String, VecDeque<std::result::Result<Vec<u8>, FetchError>>>>,
        fallback: std::result::Result<Vec<u8>, FetchError>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(fallback: std::result::Result<Vec<u8>, FetchError>) -> Self {
            Self {
                scripted: Mutex::new(HashMap::new()),
                fallback,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn script(self, url: &str, responses: Vec<std::result::Result<Vec<u8>, FetchError>>) -> Self {
            self.scripted
                .lock()
                .unwrap()
                .insert(url.to_string(), responses.into());
            self
        }
    }

    impl RemoteSource for ScriptedSource {
        async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let next = self
                .scripted
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(|queue| queue.pop_front());
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn settings(retry_attempts: u32, max_workers: usize) -> DownloadSettings {
        DownloadSettings {
            base_url: "http://example.test/air".to_string(),
            retry_attempts,
            retry_delay_secs: 0,
            max_workers,
            ..DownloadSettings::default()
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_writes_file_and_caches() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource::new(Ok(b"date,hour,type\n".to_vec()));
        let downloader = Downloader::new(source, &settings(3, 5), dir.path());

        let path = downloader.fetch(date(1)).await.unwrap();
        assert_eq!(path, dir.path().join("china_cities_20240501.csv"));
        assert_eq!(std::fs::read(&path).unwrap(), b"date,hour,type\n");

        downloader.fetch(date(1)).await.unwrap();
        assert_eq!(downloader.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(downloader.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_file_is_not_refetched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("china_cities_20240502.csv"), b"cached").unwrap();
        let source = ScriptedSource::new(Ok(b"fresh".to_vec()));
        let downloader = Downloader::new(source, &settings(3, 5), dir.path());

        let path = downloader.fetch(date(2)).await.unwrap();

        assert_eq!(std::fs::read(path).unwrap(), b"cached");
        assert_eq!(downloader.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let url = "http://example.test/air/china_cities_20240503.csv";
        let source = ScriptedSource::new(Ok(b"ok".to_vec())).script(
            url,
            vec![Err(FetchError::Status(500)), Err(FetchError::Transport("reset".into()))],
        );
        let downloader = Downloader::new(source, &settings(3, 5), dir.path());

        assert!(downloader.fetch(date(3)).await.is_ok());
        assert_eq!(downloader.source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_attempts() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource::new(Err(FetchError::Status(500)));
        let downloader = Downloader::new(source, &settings(2, 5), dir.path());

        let err = downloader.fetch(date(4)).await.unwrap_err();

        assert!(matches!(err, IngestError::DownloadFailed { attempts: 2, .. }));
        assert_eq!(downloader.source.calls.load(Ordering::SeqCst), 2);
        assert!(!dir.path().join("china_cities_20240504.csv").exists());
    }

    #[tokio::test]
    async fn test_fetch_all_bounds_concurrency() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource::new(Ok(b"x".to_vec()));
        let downloader = Downloader::new(source, &settings(1, 3), dir.path());
        let dates: Vec<_> = (1..=9).map(date).collect();

        let batch = downloader.fetch_all(&dates, None).await;

        assert_eq!(batch.downloaded.len(), 9);
        assert!(batch.is_complete());
        assert_eq!(batch.downloaded[0].0, date(1));
        assert!(downloader.source.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_fetch_all_collects_failures() {
        let dir = TempDir::new().unwrap();
        let ok_url = "http://example.test/air/china_cities_20240501.csv";
        let source = ScriptedSource::new(Err(FetchError::Status(404))).script(ok_url, vec![Ok(b"x".to_vec())]);
        let downloader = Downloader::new(source, &settings(1, 5), dir.path());

        let batch = downloader.fetch_all(&[date(2), date(1)], None).await;

        assert_eq!(batch.downloaded.len(), 1);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].0, date(2));
        assert!(!batch.is_complete());
    }

    #[tokio::test]
    async fn test_shutdown_stops_new_fetches() {
        let dir = TempDir::new().unwrap();
        let shutdown = ShutdownSignal::new();
        shutdown.request();
        let source = ScriptedSource::new(Ok(b"x".to_vec()));
        let downloader = Downloader::new(source, &settings(3, 5), dir.path()).with_shutdown(shutdown);

        let batch = downloader.fetch_all(&[date(1), date(2)], None).await;

        assert_eq!(batch.cancelled, 2);
        assert_eq!(downloader.source.calls.load(Ordering::SeqCst), 0);
    }
}
