pub mod files;
pub mod import_log;
pub mod observation;
pub mod progress;
pub mod quality;

pub use files::{DailyObservationFile, FileStatus};
pub use import_log::{ImportLogEntry, ImportStatus};
pub use observation::{first_per_city_day, CityDayRecord, Indicator, ObservationRow};
pub use progress::IngestionProgress;
pub use quality::QualityLevel;
