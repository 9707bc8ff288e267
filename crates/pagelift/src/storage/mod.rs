//! The upload step: one named blob to one destination folder.

pub mod http;

use async_trait::async_trait;

use crate::error::UploadError;

pub use http::HttpUploader;

/// A file ready to be stored remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    /// Stored file name.
    pub filename: String,
    /// Destination folder, already joined with the destination root.
    pub folder_path: String,
    pub data: Vec<u8>,
    /// Content type of the file part; `None` sends `application/octet-stream`.
    pub mime_type: Option<String>,
}

impl UploadItem {
    pub fn new(filename: impl Into<String>, folder_path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            folder_path: folder_path.into(),
            data,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Destination for uploaded files.
///
/// Implementations report every failure as an [`UploadError`]; callers do
/// not distinguish between causes.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, item: UploadItem) -> Result<(), UploadError>;
}
