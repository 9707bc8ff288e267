use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug_span, Instrument};

use crate::naming::Destination;
use crate::processor::ArchiveFormat;
use crate::sanitize::redact_path;
use crate::worker::entry::DirectoryEntry;

/// Where the bytes of a source file live.
#[derive(Debug, Clone)]
pub enum FileData {
    /// Read lazily from the local filesystem when the job runs.
    Disk(PathBuf),
    Memory(Arc<[u8]>),
}

/// A file submitted for upload, alone or as part of a folder.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    /// Path relative to the selected folder including the file name, e.g.
    /// `Chapter 1/001.jpg`. Equal to `name` for loose files.
    pub relative_path: String,
    pub data: FileData,
}

impl SourceFile {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            relative_path: name.clone(),
            name,
            data: FileData::Disk(path.to_path_buf()),
        }
    }

    pub fn in_memory(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        Self {
            relative_path: name.clone(),
            name,
            data: FileData::Memory(data.into()),
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = relative_path.into();
        self
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.data {
            FileData::Disk(path) => {
                let span = debug_span!("read_source", file = %redact_path(path));
                tokio::fs::read(path).instrument(span).await
            }
            FileData::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// What a job does, decided once when it is submitted.
pub enum JobKind {
    /// One file stored under its own name (generic destination).
    Upload(SourceFile),
    /// A comic archive unpacked into pages (paged destination).
    Archive {
        file: SourceFile,
        format: ArchiveFormat,
    },
    /// A file a paged destination cannot accept.
    Unsupported(SourceFile),
    /// Every file of a selected folder.
    Batch(Vec<SourceFile>),
    /// A dropped directory, expanded when the job runs.
    Directory(Arc<dyn DirectoryEntry>),
}

impl JobKind {
    /// Resolves a loose file against the destination it was submitted to.
    pub fn for_file(file: SourceFile, destination: &Destination) -> Self {
        if !destination.is_paged() {
            return JobKind::Upload(file);
        }
        match ArchiveFormat::from_file_name(&file.name) {
            Some(format) => JobKind::Archive { file, format },
            None => JobKind::Unsupported(file),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Upload(_) => "upload",
            JobKind::Archive { .. } => "archive",
            JobKind::Unsupported(_) => "unsupported",
            JobKind::Batch(_) => "batch",
            JobKind::Directory(_) => "directory",
        }
    }
}

impl std::fmt::Debug for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Upload(file) | JobKind::Unsupported(file) => {
                write!(f, "{}({})", self.label(), file.name)
            }
            JobKind::Archive { file, format } => write!(f, "archive({}, {})", file.name, format),
            JobKind::Batch(files) => write!(f, "batch({} files)", files.len()),
            JobKind::Directory(dir) => write!(f, "directory({})", dir.full_path()),
        }
    }
}

/// A queued unit of work bound to one job record.
#[derive(Debug)]
pub struct Job {
    /// Id of the matching [`JobRecord`](crate::broadcast::JobRecord).
    pub id: String,
    pub name: String,
    pub kind: JobKind,
    /// Destination root captured at submission.
    pub destination: Destination,
    pub token: CancellationToken,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: JobKind,
        destination: Destination,
        token: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            destination,
            token,
        }
    }
}
