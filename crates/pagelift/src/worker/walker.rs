use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use log::debug;

use crate::worker::entry::{DirectoryEntry, DroppedEntry, FileEntry};

/// Reads every page of a directory listing.
pub async fn read_all_children(dir: &dyn DirectoryEntry) -> io::Result<Vec<DroppedEntry>> {
    let mut reader = dir.reader();
    let mut children = Vec::new();
    loop {
        let batch = reader.read_batch().await?;
        if batch.is_empty() {
            break;
        }
        children.extend(batch);
    }
    Ok(children)
}

/// Expands a directory into every file below it, level by level.
///
/// Each directory is listed completely before any of its subdirectories
/// are visited. Returned entries keep the full path they were reported with.
pub async fn walk(root: Arc<dyn DirectoryEntry>) -> io::Result<Vec<FileEntry>> {
    let mut pending: VecDeque<Arc<dyn DirectoryEntry>> = VecDeque::from([root]);
    let mut files = Vec::new();
    let mut directories = 0usize;

    while let Some(dir) = pending.pop_front() {
        directories += 1;
        for child in read_all_children(dir.as_ref()).await? {
            match child {
                DroppedEntry::File(file) => files.push(file),
                DroppedEntry::Directory(sub) => pending.push_back(sub),
            }
        }
    }

    debug!(
        "Walked {} directories, found {} files",
        directories,
        files.len()
    );
    Ok(files)
}
