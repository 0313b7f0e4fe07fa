use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "airq-ingest")]
#[command(about = "Incremental ingestion of daily air-quality observation files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, env = "AIRQ_CONFIG", help = "Configuration file (TOML) [default: airq.toml if present]")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file [default: <log_dir>/airq-ingest.log]")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download and ingest every daily file missing from the store
    Run {
        #[arg(long, help = "Treat this date as today (YYYY-MM-DD)")]
        today: Option<NaiveDate>,

        #[arg(long, help = "Hide progress bars")]
        no_progress: bool,
    },

    /// Ingest raw files already in the download directory that have no processed output
    ProcessExisting {
        #[arg(long, help = "Hide progress bars")]
        no_progress: bool,
    },

    /// List the dates that a run would download
    MissingDates {
        #[arg(long, help = "Treat this date as today (YYYY-MM-DD)")]
        today: Option<NaiveDate>,
    },

    /// Parse and validate one daily file without touching the database
    Inspect {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "10")]
        sample: usize,
    },
}
