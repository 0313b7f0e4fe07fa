//! Retrieval of daily national files from the remote archive.

pub mod downloader;
pub mod source;

pub use downloader::{DownloadBatch, DownloadCache, Downloader};
pub use source::{FetchError, HttpSource, RemoteSource};
