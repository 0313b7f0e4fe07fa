pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod processors;
pub mod readers;
pub mod store;
pub mod utils;
pub mod writers;

pub use config::Settings;
pub use error::{IngestError, Result};
