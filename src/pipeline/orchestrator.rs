use crate::config::Settings;
use crate::download::{Downloader, RemoteSource};
use crate::error::Result;
use crate::models::DailyObservationFile;
use crate::pipeline::state::{PipelineState, RunSummary};
use crate::processors::{DateRangeReconciler, FileProcessor, ProcessingReport};
use crate::store;
use crate::utils::filename::date_from_daily_file;
use crate::utils::progress::ProgressReporter;
use crate::utils::shutdown::ShutdownSignal;
use crate::writers::{BatchWriter, CsvMirror};
use chrono::{Local, NaiveDate};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Drives one ingestion run through its stages:
/// INIT -> DB_READY -> DATES_RESOLVED -> DOWNLOADING -> PROCESSING -> DONE,
/// with FAILED reachable from the setup stages.
pub struct PipelineOrchestrator<S> {
    settings: Arc<Settings>,
    downloader: Downloader<S>,
    shutdown: ShutdownSignal,
    today: Option<NaiveDate>,
    show_progress: bool,
    state: PipelineState,
}

impl<S: RemoteSource> PipelineOrchestrator<S> {
    pub fn new(settings: Settings, source: S, shutdown: ShutdownSignal) -> Self {
        let downloader = Downloader::new(source, &settings.download, &settings.paths.download_dir)
            .with_shutdown(shutdown.clone());

        Self {
            settings: Arc::new(settings),
            downloader,
            shutdown,
            today: None,
            show_progress: false,
            state: PipelineState::Init,
        }
    }

    /// Use a fixed "today" instead of the local clock
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn transition(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Unexpected pipeline transition");
        }
        info!(from = %self.state, to = %next, "Pipeline state");
        self.state = next;
    }

    fn reset(&mut self) {
        self.state = PipelineState::Init;
    }

    /// INIT and DB_READY: directories, connection pool and schema. Any
    /// failure here ends the run in FAILED.
    async fn prepare(&mut self) -> Result<SqlitePool> {
        self.reset();

        let pool = self.open_store().await;
        let pool = self.setup_step(pool)?;
        self.transition(PipelineState::DbReady);
        Ok(pool)
    }

    /// Setup errors are unrecoverable: record them and move to FAILED
    fn setup_step<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!(state = %self.state, error = %e, "Pipeline setup failed");
            self.transition(PipelineState::Failed);
        }
        result
    }

    /// Built while still in DB_READY so a bad worker or encoding setup
    /// fails the run before anything is downloaded
    fn build_processor(&mut self, pool: SqlitePool) -> Result<Arc<FileProcessor>> {
        let writer = BatchWriter::new(
            pool,
            &self.settings.processing.target_table,
            self.settings.processing.batch_size,
        );
        let processor = FileProcessor::new(&self.settings, writer, self.shutdown.clone()).map(Arc::new);
        self.setup_step(processor)
    }

    async fn open_store(&self) -> Result<SqlitePool> {
        let paths = &self.settings.paths;
        for dir in [&paths.download_dir, &paths.processed_dir, &paths.log_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }

        let pool = store::connect(&self.settings.database).await?;
        store::ensure_schema(&pool, &self.settings.processing.target_table).await?;
        Ok(pool)
    }

    fn reporter(&self, total: usize, message: &str) -> ProgressReporter {
        ProgressReporter::new(total as u64, message, !self.show_progress)
    }

    /// Resolve the dates still missing from the store
    pub async fn missing_dates(&mut self) -> Result<Vec<NaiveDate>> {
        let pool = self.prepare().await?;
        self.resolve_dates(pool).await
    }

    async fn resolve_dates(&mut self, pool: SqlitePool) -> Result<Vec<NaiveDate>> {
        let reconciler = DateRangeReconciler::new(
            pool,
            &self.settings.processing.target_table,
            self.settings.processing.lookback_days,
        );
        let dates = reconciler.reconcile(self.today()).await;
        let dates = self.setup_step(dates)?;
        self.transition(PipelineState::DatesResolved);
        Ok(dates)
    }

    /// Incremental run: reconcile, download what is missing, process it
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let pool = self.prepare().await?;
        let processor = self.build_processor(pool.clone())?;
        let dates = self.resolve_dates(pool).await?;

        if dates.is_empty() {
            info!("No missing dates, nothing to do");
            self.transition(PipelineState::Done);
            return Ok(RunSummary::empty(self.state, started.elapsed()));
        }

        let mut summary = RunSummary::empty(self.state, started.elapsed());
        summary.files_attempted = dates.len();

        self.transition(PipelineState::Downloading);
        let progress = self.reporter(dates.len(), "Downloading daily files...");
        let batch = self.downloader.fetch_all(&dates, Some(&progress)).await;
        progress.finish_with_message(&format!("Downloaded {} of {} files", batch.downloaded.len(), dates.len()));

        summary.download_failures = batch.failed.len();
        for (date, reason) in &batch.failed {
            warn!(date = %date, reason = %reason, "Date skipped, download failed");
            summary.errors.push(format!("download {}: {}", date, reason));
        }
        summary.cancelled = batch.cancelled > 0;

        let files = batch
            .downloaded
            .into_iter()
            .map(|(date, path)| {
                let mut file = DailyObservationFile::pending(date, path);
                file.mark_downloaded();
                file
            })
            .collect();

        let report = self.process(processor, files).await?;
        Ok(self.finish(summary, report, started))
    }

    /// Process raw files already on disk that have no processed output yet.
    /// No network access.
    pub async fn process_existing(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let pool = self.prepare().await?;
        let processor = self.build_processor(pool)?;

        let mirror = CsvMirror::new(&self.settings.paths.processed_dir);
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.settings.paths.download_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(date) = date_from_daily_file(&path) else {
                continue;
            };
            if mirror.exists(date) {
                continue;
            }

            let mut file = DailyObservationFile::pending(date, path);
            file.mark_downloaded();
            files.push(file);
        }
        files.sort_by_key(|f| f.date);

        info!(count = files.len(), "Unprocessed files found in download directory");

        let mut summary = RunSummary::empty(self.state, started.elapsed());
        summary.files_attempted = files.len();

        let report = self.process(processor, files).await?;
        Ok(self.finish(summary, report, started))
    }

    async fn process(
        &mut self,
        processor: Arc<FileProcessor>,
        files: Vec<DailyObservationFile>,
    ) -> Result<ProcessingReport> {
        self.transition(PipelineState::Processing);

        if self.shutdown.is_requested() {
            warn!(skipped = files.len(), "Shutdown requested, not processing");
            return Ok(ProcessingReport::default());
        }

        let progress = self.reporter(files.len(), "Processing daily files...");
        let report = processor.process_all(files, Some(&progress)).await?;
        progress.finish_with_message(&format!("Processed {} files", report.outcomes.len()));

        let tracker = Arc::clone(&processor);
        match tokio::task::spawn_blocking(move || tracker.tracker().flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Could not flush progress file"),
            Err(e) => warn!(error = %e, "Progress flush task failed"),
        }

        Ok(report)
    }

    fn finish(&mut self, mut summary: RunSummary, report: ProcessingReport, started: Instant) -> RunSummary {
        self.transition(PipelineState::Done);

        summary.files_succeeded = report.succeeded();
        summary.records_written = report.records_written();
        summary.records_rejected = report.records_rejected();
        summary.errors.extend(report.errors());
        summary.cancelled |= report.cancelled() > 0 || self.shutdown.is_requested();
        summary.elapsed = started.elapsed();
        summary.final_state = self.state;

        info!("Run summary: {}", summary);
        summary
    }
}
