use std::fmt;

use crate::error::{Error, Result};

/// Half-open `[start, end)` span of byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidArgument(format!(
                "empty byte range [{}, {})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Value for the `Range` request header. HTTP ranges are inclusive, so the
    /// last requested byte is `end - 1`.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end - 1)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Splits `length` bytes into at most `segments` contiguous ranges.
///
/// Every range but the last is `length / segments` bytes long; the last one
/// absorbs the remainder. When `length < segments` each range is a single byte.
pub fn create_ranges(length: u64, segments: usize) -> Result<Vec<ByteRange>> {
    if length < 1 || segments < 1 {
        return Err(Error::InvalidArgument(format!(
            "cannot split {} bytes into {} segments",
            length, segments
        )));
    }

    let segments = segments as u64;
    let per_segment = (length / segments).max(1);
    let mut ranges = Vec::with_capacity(segments.min(length) as usize);

    let mut start = 0;
    let mut remaining = length;

    while remaining > 0 {
        let size = if ranges.len() as u64 + 1 == segments {
            remaining
        } else {
            per_segment.min(remaining)
        };
        ranges.push(ByteRange {
            start,
            end: start + size,
        });

        start += size;
        remaining -= size;
    }

    Ok(ranges)
}
