use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageliftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("No valid images found in {format}")]
    NoValidImages {
        format: crate::processor::ArchiveFormat,
    },

    #[error("CBR engine not ready")]
    EngineNotReady,

    #[error("Failed to extract '{entry}': {reason}")]
    Extraction { entry: String, reason: String },

    #[error("Decoder task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum UploadError {
    /// The endpoint answered with a non-2xx status.
    #[error("Upload failed")]
    Rejected { status: u16 },

    #[error("Upload failed")]
    Transport(#[source] reqwest::Error),

    /// The source file could not be read. Shown as a failed upload.
    #[error("Upload failed")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Transport errors and server-side failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Rejected { status } => *status >= 500,
            UploadError::Transport(_) => true,
            UploadError::Read { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PageliftError>;
