//! Dropped filesystem entries.
//!
//! A drop hands over files and directory handles rather than paths. A
//! directory only exposes a reader that yields its children a page at a
//! time; an empty page means the listing is exhausted.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::fs::ReadDir;

use crate::worker::job::{FileData, SourceFile};

/// Children returned per [`DirectoryReader::read_batch`] by [`LocalDirectory`].
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Paginated listing of one directory.
#[async_trait]
pub trait DirectoryReader: Send {
    /// Next page of children. Returns an empty vec once exhausted.
    async fn read_batch(&mut self) -> io::Result<Vec<DroppedEntry>>;
}

/// A directory handle from a drop.
pub trait DirectoryEntry: Send + Sync {
    fn name(&self) -> &str;

    /// Path from the drop root, starting with `/` (e.g. `/Vol1/ch1`).
    fn full_path(&self) -> &str;

    /// Starts a fresh listing.
    fn reader(&self) -> Box<dyn DirectoryReader>;
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    /// Path from the drop root, starting with `/`.
    pub full_path: String,
    pub data: FileData,
}

impl FileEntry {
    /// Converts into a batch source whose relative path is the full path
    /// without its leading `/`.
    pub fn into_source(self) -> SourceFile {
        let relative_path = self
            .full_path
            .strip_prefix('/')
            .unwrap_or(&self.full_path)
            .to_string();
        SourceFile {
            name: self.name,
            relative_path,
            data: self.data,
        }
    }
}

#[derive(Clone)]
pub enum DroppedEntry {
    File(FileEntry),
    Directory(Arc<dyn DirectoryEntry>),
}

impl DroppedEntry {
    /// Wraps a local path. Directories are listed lazily in pages of
    /// [`DEFAULT_BATCH_SIZE`].
    pub async fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("'{}' has no file name", path.display()),
                )
            })?;
        let full_path = format!("/{}", name);

        let metadata = tokio::fs::metadata(path).await?;
        if metadata.is_dir() {
            Ok(DroppedEntry::Directory(Arc::new(LocalDirectory::new(
                name,
                full_path,
                path.to_path_buf(),
            ))))
        } else {
            Ok(DroppedEntry::File(FileEntry {
                name,
                full_path,
                data: FileData::Disk(path.to_path_buf()),
            }))
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DroppedEntry::File(file) => &file.name,
            DroppedEntry::Directory(dir) => dir.name(),
        }
    }

    pub fn full_path(&self) -> &str {
        match self {
            DroppedEntry::File(file) => &file.full_path,
            DroppedEntry::Directory(dir) => dir.full_path(),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, DroppedEntry::Directory(_))
    }
}

impl std::fmt::Debug for DroppedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DroppedEntry::File(file) => f.debug_tuple("File").field(&file.full_path).finish(),
            DroppedEntry::Directory(dir) => {
                f.debug_tuple("Directory").field(&dir.full_path()).finish()
            }
        }
    }
}

/// A directory on the local filesystem.
///
/// Symlinks are followed, matching [`scan_folder`](crate::worker::scan_folder).
/// A link back into one of its own ancestors is reported as an error.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    name: String,
    full_path: String,
    path: PathBuf,
    batch_size: usize,
    /// Canonical paths of the directories above this one.
    ancestors: Arc<[PathBuf]>,
}

impl LocalDirectory {
    pub fn new(name: String, full_path: String, path: PathBuf) -> Self {
        Self {
            name,
            full_path,
            path,
            batch_size: DEFAULT_BATCH_SIZE,
            ancestors: Arc::from(Vec::new()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl DirectoryEntry for LocalDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_path(&self) -> &str {
        &self.full_path
    }

    fn reader(&self) -> Box<dyn DirectoryReader> {
        Box::new(LocalDirectoryReader {
            path: self.path.clone(),
            full_path: self.full_path.clone(),
            batch_size: self.batch_size,
            ancestors: Arc::clone(&self.ancestors),
            lineage: None,
            read_dir: None,
            exhausted: false,
        })
    }
}

struct LocalDirectoryReader {
    path: PathBuf,
    full_path: String,
    batch_size: usize,
    ancestors: Arc<[PathBuf]>,
    /// `ancestors` plus this directory, resolved on the first read.
    lineage: Option<Arc<[PathBuf]>>,
    read_dir: Option<ReadDir>,
    exhausted: bool,
}

impl LocalDirectoryReader {
    async fn lineage(&mut self) -> io::Result<Arc<[PathBuf]>> {
        if let Some(lineage) = &self.lineage {
            return Ok(Arc::clone(lineage));
        }
        let own = tokio::fs::canonicalize(&self.path).await?;
        let lineage: Arc<[PathBuf]> = self.ancestors.iter().cloned().chain([own]).collect();
        self.lineage = Some(Arc::clone(&lineage));
        Ok(lineage)
    }
}

#[async_trait]
impl DirectoryReader for LocalDirectoryReader {
    async fn read_batch(&mut self) -> io::Result<Vec<DroppedEntry>> {
        if self.exhausted {
            return Ok(Vec::new());
        }
        if self.read_dir.is_none() {
            self.read_dir = Some(tokio::fs::read_dir(&self.path).await?);
        }
        let lineage = self.lineage().await?;
        let Some(read_dir) = self.read_dir.as_mut() else {
            return Ok(Vec::new());
        };

        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            let Some(entry) = read_dir.next_entry().await? else {
                self.exhausted = true;
                break;
            };

            let name = entry.file_name().to_string_lossy().to_string();
            let full_path = format!("{}/{}", self.full_path, name);
            let mut file_type = entry.file_type().await?;
            if file_type.is_symlink() {
                file_type = tokio::fs::metadata(entry.path()).await?.file_type();
                if file_type.is_dir() {
                    let target = tokio::fs::canonicalize(entry.path()).await?;
                    if lineage.contains(&target) {
                        return Err(io::Error::other(format!(
                            "filesystem loop at {}",
                            full_path
                        )));
                    }
                }
            }

            if file_type.is_dir() {
                let mut child = LocalDirectory::new(name, full_path, entry.path())
                    .with_batch_size(self.batch_size);
                child.ancestors = Arc::clone(&lineage);
                batch.push(DroppedEntry::Directory(Arc::new(child)));
            } else if file_type.is_file() {
                batch.push(DroppedEntry::File(FileEntry {
                    name,
                    full_path,
                    data: FileData::Disk(entry.path()),
                }));
            } else {
                debug!("Skipping special entry {}", full_path);
            }
        }

        Ok(batch)
    }
}
