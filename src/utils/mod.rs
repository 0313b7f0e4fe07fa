pub mod atomic_file;
pub mod constants;
pub mod filename;
pub mod progress;
pub mod shutdown;

pub use atomic_file::write_atomic;
pub use constants::*;
pub use filename::{daily_file_name, daily_file_url, date_from_daily_file, processed_file_name};
pub use progress::ProgressReporter;
pub use shutdown::ShutdownSignal;
