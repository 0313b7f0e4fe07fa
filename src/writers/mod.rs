pub mod batch_writer;
pub mod csv_mirror;

pub use batch_writer::{BatchWriter, WriteOutcome};
pub use csv_mirror::CsvMirror;
