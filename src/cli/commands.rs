use crate::cli::args::{Cli, Commands};
use crate::config::Settings;
use crate::download::HttpSource;
use crate::error::{IngestError, Result};
use crate::models::first_per_city_day;
use crate::pipeline::{PipelineOrchestrator, RunSummary};
use crate::processors::RecordValidator;
use crate::readers::DailyFileParser;
use crate::utils::progress::ProgressReporter;
use crate::utils::shutdown::ShutdownSignal;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Non-blocking appender onto `log_file`, creating its directory. Lines are
/// flushed while the guard is alive and on drop.
pub fn log_writer(log_file: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = log_file
        .file_name()
        .ok_or_else(|| IngestError::Config(format!("log file has no name: {}", log_file.display())))?;

    std::fs::create_dir_all(dir)?;
    Ok(tracing_appender::non_blocking(rolling::never(dir, name)))
}

/// Install the global subscriber writing to `log_file` only. `RUST_LOG`
/// wins over the verbosity flag. Keep the guard until the process exits.
pub fn init_logging(verbose: bool, log_file: &Path) -> Result<WorkerGuard> {
    let default_filter = if verbose { "airq_ingest=debug" } else { "airq_ingest=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let (writer, guard) = log_writer(log_file)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| IngestError::Config(format!("logging already initialised: {}", e)))?;

    Ok(guard)
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;

    let log_file = cli.log_file.unwrap_or_else(|| settings.log_file());
    let _log_guard = init_logging(cli.verbose, &log_file)?;

    match cli.command {
        Commands::Run { today, no_progress } => {
            let mut orchestrator = orchestrator(settings, !no_progress)?;
            if let Some(today) = today {
                orchestrator = orchestrator.with_today(today);
            }

            let summary = orchestrator.run().await?;
            print_summary(&summary);
        }

        Commands::ProcessExisting { no_progress } => {
            let mut orchestrator = orchestrator(settings, !no_progress)?;

            let summary = orchestrator.process_existing().await?;
            print_summary(&summary);
        }

        Commands::MissingDates { today } => {
            let mut orchestrator = orchestrator(settings, false)?;
            if let Some(today) = today {
                orchestrator = orchestrator.with_today(today);
            }

            let dates = orchestrator.missing_dates().await?;
            if dates.is_empty() {
                println!("Store is up to date");
            } else {
                println!("{} missing date(s):", dates.len());
                for date in dates {
                    println!("  {}", date);
                }
            }
        }

        Commands::Inspect { file, sample } => inspect(&settings, &file, sample)?,
    }

    Ok(())
}

fn orchestrator(settings: Settings, show_progress: bool) -> Result<PipelineOrchestrator<HttpSource>> {
    let source = HttpSource::new(&settings.download)?;
    let shutdown = ShutdownSignal::new();
    shutdown.listen_for_ctrl_c();

    Ok(PipelineOrchestrator::new(settings, source, shutdown).with_progress(show_progress))
}

/// The one line a run prints; per-file errors are only in the log
fn summary_line(summary: &RunSummary) -> String {
    summary.to_string()
}

fn print_summary(summary: &RunSummary) {
    println!("{}", summary_line(summary));
}

fn inspect(settings: &Settings, file: &Path, sample: usize) -> Result<()> {
    println!("Inspecting daily file: {}", file.display());

    let spinner = ProgressReporter::new_spinner("Parsing...", false);
    let parser = DailyFileParser::new(&settings.processing, &settings.region)?;
    let records = parser.parse(file)?;
    let stats = records.stats().clone();

    spinner.set_message("Validating...");
    let (valid, report) = RecordValidator::new().filter_valid(records);
    let records = first_per_city_day(valid);
    spinner.finish_with_message(&format!("{} records extracted", records.len()));

    println!("\nFile Details:");
    println!("  Encoding:        {}", stats.encoding);
    println!("  City columns:    {}", stats.city_columns);
    println!("  Rows read:       {}", stats.rows_read);
    println!("  Rows skipped:    {}", stats.rows_skipped);
    println!("  Rows ignored:    {}", stats.rows_ignored);
    println!("  Hour groups:     {}", stats.groups);
    println!("  Valid records:   {}", report.valid_records);
    println!("  Rejected:        {}", report.rejected_records);
    for violation in &report.sample_violations {
        println!("    - {}", violation);
    }

    if sample > 0 {
        println!("\nSample Records (showing up to {}):", sample);
        for (i, record) in records.iter().take(sample).enumerate() {
            println!(
                "{}. {} on {}: AQI={} ({}), PM2.5={}, PM10={}, O3={}",
                i + 1,
                record.city,
                record.record_date,
                format_value(record.aqi),
                record.quality_label().unwrap_or("-"),
                format_value(record.pm25),
                format_value(record.pm10),
                format_value(record.o3)
            );
        }
    }

    Ok(())
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string())
}
