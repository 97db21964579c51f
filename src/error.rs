//! Error types for ranger

use reqwest::StatusCode;
use thiserror::Error;

use crate::downloader::ranges::ByteRange;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Partition inputs out of range (zero length or zero segments)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The resource did not report a usable Content-Length
    #[error("{url} does not specify its body length")]
    MissingLength { url: String },

    /// The range response carried no bytes at all
    #[error("no body in response for range {range}")]
    MissingBody { range: ByteRange },

    /// The range response ended before the range was covered
    #[error("body for range {range} ended after {received} bytes")]
    ShortBody { range: ByteRange, received: u64 },

    #[error("invalid status code {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Positional write, flush or sync of the output file failed
    #[error("write error: {0}")]
    Write(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fail-fast abort carrying the first failed range
    #[error("range {range} failed: {source}")]
    TaskFailed {
        range: ByteRange,
        #[source]
        source: Box<Error>,
    },

    #[error("writer task panicked")]
    Panicked,

    #[error("cancelled")]
    Cancelled,
}
