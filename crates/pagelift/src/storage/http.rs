use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{info_span, Instrument};

use crate::config::{Config, UploadConfig};
use crate::error::UploadError;
use crate::sanitize;

use super::{UploadItem, Uploader};

/// Posts each item as `multipart/form-data` with the parts `file`,
/// `filename` and `folderPath`. Any 2xx counts as stored.
pub struct HttpUploader {
    client: Client,
    endpoint: String,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, upload: &UploadConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(upload.timeout())
            .build()
            .map_err(UploadError::Transport)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            max_attempts: upload.max_attempts.max(1),
            retry_backoff: upload.retry_backoff(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, UploadError> {
        Self::new(config.endpoint.clone(), &config.upload)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, item: &UploadItem) -> Result<(), UploadError> {
        let mut file = Part::bytes(item.data.clone()).file_name(item.filename.clone());
        if let Some(mime) = &item.mime_type {
            file = file.mime_str(mime).map_err(UploadError::Transport)?;
        }

        let form = Form::new()
            .part("file", file)
            .text("filename", item.filename.clone())
            .text("folderPath", item.folder_path.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(UploadError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            debug!("Upload endpoint answered {}", status);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, item: UploadItem) -> Result<(), UploadError> {
        let span = info_span!("upload",
            endpoint = %sanitize::redact_endpoint_url(&self.endpoint),
            filename = %item.filename,
            bytes = item.data.len(),
        );

        async {
            let mut attempt = 1;
            loop {
                match self.send_once(&item).await {
                    Ok(()) => {
                        debug!("Uploaded {} to {}", item.filename, item.folder_path);
                        return Ok(());
                    }
                    Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                        let delay = self.retry_backoff * attempt;
                        warn!(
                            "Upload of {} failed (attempt {}/{}), retrying in {:?}: {:?}",
                            item.filename, attempt, self.max_attempts, delay, e
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP endpoint answering each request with the next status in
    /// `statuses` and recording the raw request bodies.
    async fn serve(statuses: Vec<u16>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&bodies);

        tokio::spawn(async move {
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                recorded.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {} Test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}/api/upload", addr), bodies)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn config(max_attempts: u32) -> UploadConfig {
        UploadConfig {
            max_attempts,
            retry_backoff_ms: 1,
            timeout_secs: 5,
        }
    }

    fn item() -> UploadItem {
        UploadItem::new("page_001_de.png", "MAD/Vol1", b"PNGDATA".to_vec())
            .with_mime_type("image/png")
    }

    #[tokio::test]
    async fn test_sends_three_named_parts() {
        let (endpoint, bodies) = serve(vec![200]).await;
        let uploader = HttpUploader::new(endpoint, &config(1)).unwrap();

        uploader.upload(item()).await.unwrap();

        let bodies = bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        let body = &bodies[0];
        assert!(body.starts_with("POST /api/upload"));
        assert!(body.contains("name=\"file\"; filename=\"page_001_de.png\""));
        assert!(body.contains("Content-Type: image/png"));
        assert!(body.contains("PNGDATA"));
        assert!(body.contains("name=\"filename\"\r\n\r\npage_001_de.png"));
        assert!(body.contains("name=\"folderPath\"\r\n\r\nMAD/Vol1"));
    }

    #[tokio::test]
    async fn test_non_success_is_upload_failed() {
        let (endpoint, _) = serve(vec![403]).await;
        let uploader = HttpUploader::new(endpoint, &config(3)).unwrap();

        let err = uploader.upload(item()).await.unwrap_err();
        assert!(matches!(err, UploadError::Rejected { status: 403 }));
        assert_eq!(err.to_string(), "Upload failed");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (endpoint, bodies) = serve(vec![503, 502, 201]).await;
        let uploader = HttpUploader::new(endpoint, &config(3)).unwrap();

        uploader.upload(item()).await.unwrap();
        assert_eq!(bodies.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_retries_stop_at_max_attempts() {
        let (endpoint, bodies) = serve(vec![500, 500]).await;
        let uploader = HttpUploader::new(endpoint, &config(2)).unwrap();

        let err = uploader.upload(item()).await.unwrap_err();
        assert!(matches!(err, UploadError::Rejected { status: 500 }));
        assert_eq!(bodies.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let uploader = HttpUploader::new("http://127.0.0.1:9/upload", &config(1)).unwrap();
        let err = uploader.upload(item()).await.unwrap_err();
        assert!(matches!(err, UploadError::Transport(_)));
        assert_eq!(err.to_string(), "Upload failed");
    }
}
