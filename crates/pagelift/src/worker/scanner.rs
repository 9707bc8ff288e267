use std::io;
use std::path::Path;

use log::{debug, info};
use walkdir::WalkDir;

use crate::naming::natural_sort_by_key;
use crate::worker::job::{FileData, SourceFile};

/// Collects every file below `path` the way a folder picker reports them.
///
/// Relative paths are rooted at the folder's own name, so picking
/// `~/scans/Vol1` yields `Vol1/001.jpg`, `Vol1/ch2/001.jpg` and so on.
/// Returns the folder name and its files in natural order.
pub fn scan_folder<P: AsRef<Path>>(path: P) -> io::Result<(String, Vec<SourceFile>)> {
    let path = path.as_ref();
    let folder_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' has no folder name", path.display()),
            )
        })?;

    let mut files = Vec::new();
    for entry in WalkDir::new(path).min_depth(1).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(path)
            .map_err(io::Error::other)?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        debug!("Found {}/{}", folder_name, relative);
        files.push(SourceFile {
            name: entry.file_name().to_string_lossy().to_string(),
            relative_path: format!("{}/{}", folder_name, relative),
            data: FileData::Disk(entry.path().to_path_buf()),
        });
    }

    natural_sort_by_key(&mut files, |f| f.relative_path.as_str());

    info!("Scanned {} files in {}", files.len(), folder_name);
    Ok((folder_name, files))
}
