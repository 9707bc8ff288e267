//! Test harness: an [`UploadEngine`] whose uploads land in memory.
//!
//! The recording uploader can be told to reject chosen file names and to
//! hold every upload until the test releases it.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use pagelift::{Config, JobRecord, UploadEngine, UploadError, UploadItem, Uploader};

/// One upload seen by the [`RecordingUploader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub filename: String,
    pub folder_path: String,
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

#[derive(Default)]
pub struct RecordingUploader {
    calls: Mutex<Vec<Call>>,
    rejected: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    gate: Option<Arc<Semaphore>>,
    started: Option<mpsc::UnboundedSender<String>>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload announces itself on the returned receiver and then waits
    /// for a permit on the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>, mpsc::UnboundedReceiver<String>) {
        let gate = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let uploader = Self {
            gate: Some(Arc::clone(&gate)),
            started: Some(tx),
            ..Self::default()
        };
        (uploader, gate, rx)
    }

    pub fn reject(&self, filename: &str) {
        self.rejected.lock().unwrap().insert(filename.to_string());
    }

    /// Uploads of `filename` panic instead of returning.
    pub fn panic_on(&self, filename: &str) {
        self.panicking.lock().unwrap().insert(filename.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn targets(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .map(|c| (c.filename, c.folder_path))
            .collect()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.filename).collect()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, item: UploadItem) -> Result<(), UploadError> {
        if let Some(started) = &self.started {
            let _ = started.send(item.filename.clone());
        }
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let panics = self.panicking.lock().unwrap().contains(&item.filename);
        if panics {
            panic!("uploader blew up on {}", item.filename);
        }
        if self.rejected.lock().unwrap().contains(&item.filename) {
            return Err(UploadError::Rejected { status: 500 });
        }

        self.calls.lock().unwrap().push(Call {
            filename: item.filename,
            folder_path: item.folder_path,
            data: item.data,
            mime_type: item.mime_type,
        });
        Ok(())
    }
}

pub struct TestHarness {
    pub engine: UploadEngine,
    pub uploader: Arc<RecordingUploader>,
}

impl TestHarness {
    /// Default config: paged prefix `MAD/`, locale suffix `de`.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_uploader(config, RecordingUploader::new())
    }

    pub fn with_uploader(config: Config, uploader: RecordingUploader) -> Self {
        let uploader = Arc::new(uploader);
        let engine = UploadEngine::new(config, Arc::clone(&uploader) as Arc<dyn Uploader>);
        Self { engine, uploader }
    }

    /// Harness whose destination root `prefix` is a paged root.
    pub fn with_paged_prefix(prefix: &str) -> Self {
        let mut config = test_config();
        config.naming.paged_prefix = prefix.to_string();
        Self::with_config(config)
    }

    pub fn job(&self, id: &str) -> JobRecord {
        self.engine
            .job(id)
            .unwrap_or_else(|| panic!("job {} is not in the registry", id))
    }
}

pub fn test_config() -> Config {
    Config::default_with_endpoint("http://localhost:5173/api/upload-r2")
}
