use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::utils::*;

pub mod chunker;
pub mod ranges;
pub mod stream;

use chunker::{Chunker, ChunkerOptions, SaveReport};
use ranges::{create_ranges, ByteRange};
use stream::stream_range;

pub const DEFAULT_SEGMENTS: usize = 16;
pub const DEFAULT_USER_AGENT: &str = "ranger";

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Number of concurrent range requests.
    pub segments: usize,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub chunker: ChunkerOptions,
    pub show_progress: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            segments: DEFAULT_SEGMENTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(10),
            chunker: ChunkerOptions::default(),
            show_progress: true,
        }
    }
}

#[derive(Debug)]
pub struct DownloadReport {
    pub total_size: u64,
    pub ranges: Vec<ByteRange>,
    pub save: SaveReport,
}

pub async fn download_file(
    url: &str,
    output: &Path,
    options: &DownloadOptions,
) -> Result<DownloadReport> {
    let client = build_client(&options.user_agent, options.connect_timeout)?;
    let meta = get_file_meta(&client, url).await?;
    let ranges = create_ranges(meta.size, options.segments)?;

    log::debug!(
        "Downloading {} bytes from {} in {} ranges",
        meta.size,
        url,
        ranges.len()
    );

    let output_file = create_output_file(output, meta.size).await?;
    let chunker = Chunker::new(output_file, options.chunker.clone());
    let progress = progress_bar(meta.size, options.show_progress);

    let url: Arc<str> = Arc::from(url);

    for &range in &ranges {
        let client = client.clone();
        let url = Arc::clone(&url);
        let progress = progress.clone();

        chunker.add_writer(range, move |push| async move {
            stream_range(&client, &url, range, |chunk| {
                progress.inc(chunk.data.len() as u64);
                push.push(chunk);
            })
            .await
        });
    }

    let save = chunker.save().await?;
    progress.finish();

    Ok(DownloadReport {
        total_size: meta.size,
        ranges,
        save,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resource(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 253) as u8).collect()
    }

    async fn serve(server: &MockServer, data: &[u8], segments: usize) {
        Mock::given(method("HEAD"))
            .and(path("/resource"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(data.to_vec()))
            .mount(server)
            .await;

        for range in create_ranges(data.len() as u64, segments).unwrap() {
            let body = data[range.start() as usize..range.end() as usize].to_vec();
            Mock::given(method("GET"))
                .and(path("/resource"))
                .and(header("range", range.header_value().as_str()))
                .respond_with(ResponseTemplate::new(206).set_body_bytes(body))
                .mount(server)
                .await;
        }
    }

    fn options(segments: usize) -> DownloadOptions {
        DownloadOptions {
            segments,
            show_progress: false,
            ..DownloadOptions::default()
        }
    }

    #[tokio::test]
    async fn downloads_resource_byte_for_byte() {
        let data = resource(100_003);
        let server = MockServer::start().await;
        serve(&server, &data, 8).await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");

        let url = format!("{}/resource", server.uri());
        let report = download_file(&url, &output, &options(8)).await.unwrap();

        assert_eq!(report.total_size, 100_003);
        assert_eq!(report.ranges.len(), 8);
        assert_eq!(report.save.bytes_written, 100_003);
        assert!(report.save.failures.is_empty());
        assert_eq!(std::fs::read(&output).unwrap(), data);
    }

    #[tokio::test]
    async fn failed_range_leaves_a_hole() {
        let data = resource(1000);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resource"))
            .and(header("range", "bytes=250-499"))
            .respond_with(ResponseTemplate::new(503))
            .with_priority(1)
            .mount(&server)
            .await;
        serve(&server, &data, 4).await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");

        let url = format!("{}/resource", server.uri());
        let report = download_file(&url, &output, &options(4)).await.unwrap();

        assert_eq!(report.save.failures.len(), 1);
        assert_eq!(report.save.failures[0].range, ByteRange::new(250, 500).unwrap());
        assert!(matches!(report.save.failures[0].error, Error::Status { .. }));

        let written = std::fs::read(&output).unwrap();
        assert_eq!(written.len(), 1000);
        assert_eq!(&written[..250], &data[..250]);
        assert!(written[250..500].iter().all(|&b| b == 0));
        assert_eq!(&written[500..], &data[500..]);
    }

    #[tokio::test]
    async fn server_ignoring_ranges_still_produces_exact_copy() {
        let data = resource(1000);
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");

        let report = download_file(&server.uri(), &output, &options(4))
            .await
            .unwrap();

        assert!(report.save.failures.is_empty());
        assert_eq!(report.save.bytes_written, 1000);
        assert_eq!(std::fs::read(&output).unwrap(), data);
    }

    #[tokio::test]
    async fn fail_fast_aborts_download() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(resource(64)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");

        let mut options = options(4);
        options.chunker.fail_fast = true;
        let result = download_file(&server.uri(), &output, &options).await;

        assert!(matches!(result, Err(Error::TaskFailed { .. })));
    }

    #[tokio::test]
    async fn metadata_failure_creates_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");

        let result = download_file(&server.uri(), &output, &options(4)).await;

        assert!(result.is_err());
        assert!(!output.exists());
    }
}
