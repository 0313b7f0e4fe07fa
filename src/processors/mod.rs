pub mod file_processor;
pub mod progress_tracker;
pub mod reconciler;
pub mod validator;

pub use file_processor::{Extraction, FileOutcome, FileProcessor, ProcessingReport};
pub use progress_tracker::ProgressTracker;
pub use reconciler::{missing_dates, DateRangeReconciler};
pub use validator::{RecordValidator, ValidationReport};
