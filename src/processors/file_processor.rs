use crate::config::Settings;
use crate::error::{IngestError, Result};
use crate::models::{first_per_city_day, CityDayRecord, DailyObservationFile, FileStatus};
use crate::processors::progress_tracker::ProgressTracker;
use crate::processors::validator::{RecordValidator, ValidationReport};
use crate::readers::{DailyFileParser, ParseStats};
use crate::utils::progress::ProgressReporter;
use crate::utils::shutdown::ShutdownSignal;
use crate::writers::{BatchWriter, CsvMirror};
use futures::FutureExt;
use rayon::ThreadPool;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// CPU-bound result of reading one file
#[derive(Debug)]
pub struct Extraction {
    pub records: Vec<CityDayRecord>,
    pub stats: ParseStats,
    pub validation: ValidationReport,
}

/// What happened to one file
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: DailyObservationFile,
    pub records_extracted: usize,
    pub records_rejected: usize,
    pub records_written: usize,
    pub cancelled: bool,
    pub error: Option<String>,
}

impl FileOutcome {
    fn new(file: DailyObservationFile) -> Self {
        Self {
            file,
            records_extracted: 0,
            records_rejected: 0,
            records_written: 0,
            cancelled: false,
            error: None,
        }
    }

    fn failed(mut self, message: String) -> Self {
        self.file.mark_failed();
        self.error = Some(message);
        self
    }

    fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn succeeded(&self) -> bool {
        self.file.status == FileStatus::Processed
    }
}

/// Per-file outcomes of a processing stage, sorted by date
#[derive(Debug, Clone, Default)]
pub struct ProcessingReport {
    pub outcomes: Vec<FileOutcome>,
}

impl ProcessingReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }

    pub fn cancelled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.cancelled).count()
    }

    pub fn records_written(&self) -> usize {
        self.outcomes.iter().map(|o| o.records_written).sum()
    }

    pub fn records_rejected(&self) -> usize {
        self.outcomes.iter().map(|o| o.records_rejected).sum()
    }

    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {}", o.file.file_name(), e)))
            .collect()
    }
}

/// Turns downloaded daily files into stored records.
///
/// Each file is parsed, validated and deduplicated on a CPU pool sized
/// min(file_workers, files), then written through the batch writer. One
/// file failing never stops the others.
pub struct FileProcessor {
    parser: DailyFileParser,
    validator: RecordValidator,
    writer: BatchWriter,
    mirror: Option<CsvMirror>,
    tracker: ProgressTracker,
    file_workers: usize,
    shutdown: ShutdownSignal,
}

impl FileProcessor {
    pub fn new(settings: &Settings, writer: BatchWriter, shutdown: ShutdownSignal) -> Result<Self> {
        let mirror = settings
            .processing
            .save_processed_csv
            .then(|| CsvMirror::new(&settings.paths.processed_dir));

        Ok(Self {
            parser: DailyFileParser::new(&settings.processing, &settings.region)?,
            validator: RecordValidator::new(),
            writer: writer.with_shutdown(shutdown.clone()),
            mirror,
            tracker: ProgressTracker::new(settings.progress_file()),
            file_workers: settings.processing.file_workers.max(1),
            shutdown,
        })
    }

    pub fn mirror(&self) -> Option<&CsvMirror> {
        self.mirror.as_ref()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Parse, validate and keep the first valid record per city and day.
    /// Runs synchronously; callers put it on a CPU pool.
    pub fn extract(&self, path: &Path) -> Result<Extraction> {
        let records = self.parser.parse(path)?;
        let stats = records.stats().clone();

        let (valid, validation) = self.validator.filter_valid(records);
        let records = first_per_city_day(valid);

        if validation.rejected_records > 0 {
            warn!(
                file = %path.display(),
                rejected = validation.rejected_records,
                samples = ?validation.sample_violations,
                "Dropped invalid records"
            );
        }

        Ok(Extraction {
            records,
            stats,
            validation,
        })
    }

    pub async fn process_all(
        self: &Arc<Self>,
        files: Vec<DailyObservationFile>,
        progress: Option<&ProgressReporter>,
    ) -> Result<ProcessingReport> {
        let mut report = ProcessingReport::default();
        if files.is_empty() {
            return Ok(report);
        }

        let workers = self.file_workers.min(files.len());
        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("airq-file-{}", i))
                .build()
                .map_err(|e| IngestError::Config(e.to_string()))?,
        );
        let permits = Arc::new(Semaphore::new(workers));

        info!("Processing {} file(s) with {} worker(s)", files.len(), workers);

        let mut join_set = JoinSet::new();
        for file in files {
            let processor = Arc::clone(self);
            let pool = Arc::clone(&pool);
            let permits = Arc::clone(&permits);

            join_set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return FileOutcome::new(file).cancelled();
                };
                let work = processor.process_file(file.clone(), pool);
                contain_panic(file, work).await
            });
        }

        while let Some(result) = join_set.join_next().await {
            if let Some(p) = progress {
                p.increment(1);
            }
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => error!(error = %e, "File task ended without an outcome"),
            }
        }

        report.outcomes.sort_by_key(|o| o.file.date);
        Ok(report)
    }

    async fn process_file(self: Arc<Self>, mut file: DailyObservationFile, pool: Arc<ThreadPool>) -> FileOutcome {
        if self.shutdown.is_requested() {
            return FileOutcome::new(file).cancelled();
        }

        let name = file.file_name();
        let path = file.path.clone();
        let worker = Arc::clone(&self);

        let extracted = tokio::task::spawn_blocking(move || pool.install(|| worker.extract(&path)))
            .await
            .map_err(IngestError::from)
            .and_then(|r| r);

        let extraction = match extracted {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(file = %name, error = %e, "Skipping file");
                if let Err(log_err) = self.writer.log_failure(&name, &e.to_string()).await {
                    error!(file = %name, error = %log_err, "Could not record import failure");
                }
                return FileOutcome::new(file).failed(e.to_string());
            }
        };

        debug!(
            file = %name,
            encoding = %extraction.stats.encoding,
            rows = extraction.stats.rows_read,
            records = extraction.records.len(),
            "Extracted"
        );

        if self.shutdown.is_requested() {
            return FileOutcome::new(file).cancelled();
        }

        let mut outcome = FileOutcome::new(file.clone());
        outcome.records_extracted = extraction.records.len();
        outcome.records_rejected = extraction.validation.rejected_records;

        let written = match self.writer.write_file(&name, &extraction.records).await {
            Ok(written) => written,
            Err(e) => {
                error!(file = %name, error = %e, "Write failed");
                return outcome.failed(e.to_string());
            }
        };
        outcome.records_written = written.written;

        if written.cancelled {
            return outcome.cancelled();
        }
        if written.written == 0 && written.attempted > 0 {
            return outcome.failed(format!("none of {} records could be written", written.attempted));
        }

        if written.failed_rows == 0 {
            if let Some(mirror) = &self.mirror {
                if let Err(e) = mirror.write(file.date, &extraction.records) {
                    warn!(file = %name, error = %e, "Could not write processed CSV");
                }
            }
        }

        let tracker = Arc::clone(&self);
        let key = file.path.display().to_string();
        let count = written.written;
        match tokio::task::spawn_blocking(move || tracker.tracker.mark_processed(&key, count)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Could not update progress file"),
            Err(e) => warn!(error = %e, "Progress update task failed"),
        }

        file.mark_processed();
        outcome.file = file;
        info!(
            file = %name,
            written = outcome.records_written,
            rejected = outcome.records_rejected,
            "File processed"
        );
        outcome
    }
}

/// Run one file's work, turning a panic into a failed outcome for that file
async fn contain_panic<F>(file: DailyObservationFile, work: F) -> FileOutcome
where
    F: Future<Output = FileOutcome>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => {
            error!(file = %file.file_name(), "File processing panicked");
            FileOutcome::new(file).failed("processing panicked".to_string())
        }
    }
}
