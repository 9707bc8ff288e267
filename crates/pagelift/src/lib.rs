pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod naming;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod storage;
pub mod worker;

pub use broadcast::{JobEvent, JobPatch, JobProgressBroadcaster, JobRecord, JobRegistry, JobStatus, JobType};
pub use config::{load_config, load_config_from_str, Config, NamingConfig, UploadConfig};
pub use engine::UploadEngine;
pub use error::{ConfigError, DecodeError, PageliftError, Result, UploadError};
pub use naming::{Destination, NamingPolicy, Target};
pub use pipeline::{JobRunner, PipelineError};
pub use processor::{ArchiveFormat, DecodedPage, PageReader, RarEngine, RarEngineSlot};
pub use storage::{HttpUploader, UploadItem, Uploader};
pub use worker::{DroppedEntry, ExecutionQueue, SourceFile};
