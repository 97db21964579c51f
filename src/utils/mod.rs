use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{self, HeaderMap};
use reqwest::Client;
use tokio::fs::{self, File};

use crate::error::{Error, Result};

pub fn build_client(user_agent: &str, connect_timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .connect_timeout(connect_timeout)
        .build()?;
    Ok(client)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
}

pub async fn get_file_meta(client: &Client, url: &str) -> Result<FileMeta> {
    let response = client.head(url).send().await?;

    if !response.status().is_success() {
        log::error!("Invalid status code: {}", response.status());
        return Err(Error::Status {
            status: response.status(),
            url: url.to_string(),
        });
    }

    let size = content_length(response.headers()).ok_or_else(|| Error::MissingLength {
        url: url.to_string(),
    })?;

    log::debug!("File metadata - URL: {}, Size: {}", url, size);

    Ok(FileMeta { size })
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Creates (or truncates) the output file and pre-allocates `size` bytes.
pub async fn create_output_file(output: &Path, size: u64) -> Result<File> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let file = File::create(output).await?;
    file.set_len(size).await?;
    Ok(file)
}

pub fn progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "Downloading {elapsed_precise} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%)",
    )
    .map(|style| style.progress_chars("##-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn content_length_parses_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("4096"));

        assert_eq!(content_length(&headers), Some(4096));
    }

    #[test]
    fn content_length_missing_or_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&headers), None);
    }

    #[tokio::test]
    async fn file_meta_reads_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1234]))
            .mount(&server)
            .await;

        let client = build_client("ranger", Duration::from_secs(5)).unwrap();
        let meta = get_file_meta(&client, &server.uri()).await.unwrap();

        assert_eq!(meta.size, 1234);
    }

    #[tokio::test]
    async fn file_meta_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_client("ranger", Duration::from_secs(5)).unwrap();
        let result = get_file_meta(&client, &server.uri()).await;

        assert!(matches!(result, Err(Error::Status { .. })));
    }

    #[tokio::test]
    async fn output_file_is_truncated_and_presized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.bin");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, vec![7u8; 64]).unwrap();

        let file = create_output_file(&path, 16).await.unwrap();
        drop(file);

        assert_eq!(std::fs::read(&path).unwrap(), vec![0u8; 16]);
    }

    #[tokio::test]
    async fn output_file_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("out.bin");

        create_output_file(&path, 0).await.unwrap();

        assert!(path.exists());
    }
}
