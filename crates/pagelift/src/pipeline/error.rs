use thiserror::Error;

use crate::error::{DecodeError, UploadError};

/// Why a job ended in `error`. The `Display` text becomes the job message.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("CBR engine not ready")]
    EngineNotReady,

    #[error("Failed: {0}")]
    Decode(DecodeError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Paged destination: single files must be .cbz or .cbr")]
    UnsupportedArchive { name: String },

    #[error("Failed to scan directory: {0}")]
    WalkFailed(#[source] std::io::Error),

    #[error("Failed: queue closed")]
    QueueClosed,

    /// The job body panicked. The payload text only goes to the log.
    #[error("Failed: panicked")]
    Panicked(String),
}

impl From<DecodeError> for PipelineError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::EngineNotReady => PipelineError::EngineNotReady,
            other => PipelineError::Decode(other),
        }
    }
}
