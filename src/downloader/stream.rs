use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};

use super::ranges::ByteRange;
use crate::error::{Error, Result};

/// Bytes that belong at `offset .. offset + data.len()` of the output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChunk {
    pub offset: u64,
    pub data: Bytes,
}

/// Fetches `range` of `url` and hands every received buffer to `sink`, tagged
/// with its absolute file offset.
///
/// Offsets start at `range.start()` and strictly increase. A `200` response
/// carries the whole resource, so its first `range.start()` bytes are skipped.
/// Bytes past `range.end()` are dropped either way.
pub async fn stream_range<F>(
    client: &Client,
    url: &str,
    range: ByteRange,
    mut sink: F,
) -> Result<()>
where
    F: FnMut(DataChunk),
{
    let mut response = client
        .get(url)
        .header(RANGE, range.header_value())
        .send()
        .await?;

    let status = response.status();
    if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
        return Err(Error::Status {
            status,
            url: url.to_string(),
        });
    }

    let mut skip = 0;
    if status == StatusCode::OK {
        log::warn!("Server ignored range {} of {}", range, url);
        skip = range.start();
    }

    let mut offset = range.start();

    while let Some(mut data) = response.chunk().await? {
        if skip > 0 {
            let len = data.len() as u64;
            if len <= skip {
                skip -= len;
                continue;
            }
            // skip < len, so it fits in usize
            data = data.slice(skip as usize..);
            skip = 0;
        }
        if offset >= range.end() {
            break;
        }
        let room = range.end() - offset;
        if data.len() as u64 > room {
            // room < data.len(), so it fits in usize
            data.truncate(room as usize);
        }
        if data.is_empty() {
            continue;
        }

        let len = data.len() as u64;
        sink(DataChunk { offset, data });
        offset += len;
    }

    let received = offset - range.start();
    if received == 0 {
        return Err(Error::MissingBody { range });
    }
    if offset < range.end() {
        return Err(Error::ShortBody { range, received });
    }

    log::debug!("Range {} of {} complete", range, url);
    Ok(())
}
