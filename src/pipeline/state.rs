use std::fmt;
use std::time::Duration;

/// Stages of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    DbReady,
    DatesResolved,
    Downloading,
    Processing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, next),
            (Init, DbReady)
                | (Init, Failed)
                | (DbReady, DatesResolved)
                | (DbReady, Processing)
                | (DbReady, Failed)
                | (DatesResolved, Downloading)
                | (DatesResolved, Done)
                | (Downloading, Processing)
                | (Processing, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "INIT",
            PipelineState::DbReady => "DB_READY",
            PipelineState::DatesResolved => "DATES_RESOLVED",
            PipelineState::Downloading => "DOWNLOADING",
            PipelineState::Processing => "PROCESSING",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Aggregate result of one run, printed as a single line
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub files_attempted: usize,
    pub files_succeeded: usize,
    pub download_failures: usize,
    pub records_written: usize,
    pub records_rejected: usize,
    pub errors: Vec<String>,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub final_state: PipelineState,
}

impl RunSummary {
    pub fn empty(final_state: PipelineState, elapsed: Duration) -> Self {
        Self {
            files_attempted: 0,
            files_succeeded: 0,
            download_failures: 0,
            records_written: 0,
            records_rejected: 0,
            errors: Vec::new(),
            cancelled: false,
            elapsed,
            final_state,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled && self.files_attempted == self.files_succeeded
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files attempted: {}, succeeded: {}, records written: {}, rejected: {}, errors: {}, elapsed: {:.2}s",
            self.files_attempted,
            self.files_succeeded,
            self.records_written,
            self.records_rejected,
            self.errors.len(),
            self.elapsed.as_secs_f64()
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}
