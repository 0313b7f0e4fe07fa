//! SQLite persistence: pool setup, schema and read queries. Writes go
//! through `writers::BatchWriter`.

pub mod pool;
pub mod queries;
pub mod schema;

pub use pool::connect;
pub use queries::{count_records, import_log_for, insert_import_log, latest_record_date, records_for_date};
pub use schema::ensure_schema;
