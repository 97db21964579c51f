//! Downloads a single resource over HTTP by fetching byte ranges concurrently
//! and writing every received chunk straight to its offset in the output file.

pub mod downloader;
pub mod error;
pub mod utils;

pub use downloader::{download_file, DownloadOptions, DownloadReport};
pub use error::{Error, Result};
