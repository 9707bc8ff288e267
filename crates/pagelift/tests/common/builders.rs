//! Builders for test fixtures: zip archives, a table-driven rar engine and
//! in-memory dropped directory trees.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::sync::Arc;

use async_trait::async_trait;
use zip::write::SimpleFileOptions;

use pagelift::processor::{RarEngine, RarEntryHeader, RarExtractor};
use pagelift::worker::{DirectoryEntry, DirectoryReader, DroppedEntry, FileData, FileEntry};
use pagelift::DecodeError;

/// Builds a zip archive in memory. Names ending in `/` become directories.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if let Some(dir) = name.strip_suffix('/') {
            writer
                .add_directory(dir, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Rar engine serving a fixed table of entries regardless of the input
/// bytes. Names ending in `/` are reported as directories.
pub struct TableRarEngine {
    entries: Vec<(String, Vec<u8>)>,
}

impl TableRarEngine {
    pub fn new(entries: &[(&str, &[u8])]) -> Arc<dyn RarEngine> {
        Arc::new(Self {
            entries: entries
                .iter()
                .map(|(n, d)| (n.to_string(), d.to_vec()))
                .collect(),
        })
    }
}

struct TableExtractor {
    entries: HashMap<String, Vec<u8>>,
    order: Vec<String>,
}

impl RarEngine for TableRarEngine {
    fn open(&self, _data: Vec<u8>) -> Result<Box<dyn RarExtractor>, DecodeError> {
        Ok(Box::new(TableExtractor {
            entries: self.entries.iter().cloned().collect(),
            order: self.entries.iter().map(|(n, _)| n.clone()).collect(),
        }))
    }
}

impl RarExtractor for TableExtractor {
    fn list_entries(&mut self) -> Result<Vec<RarEntryHeader>, DecodeError> {
        Ok(self
            .order
            .iter()
            .map(|name| RarEntryHeader {
                name: name.clone(),
                is_directory: name.ends_with('/'),
            })
            .collect())
    }

    fn extract(&mut self, name: &str) -> Result<Option<Vec<u8>>, DecodeError> {
        Ok(self.entries.get(name).cloned())
    }
}

/// Dropped directory held in memory, listed `batch_size` children at a time.
pub struct MemoryDirectory {
    name: String,
    full_path: String,
    children: Vec<DroppedEntry>,
    batch_size: usize,
}

impl MemoryDirectory {
    /// `full_path` as reported by a drop, e.g. `/Vol1` or `/Vol1/ch1`.
    pub fn new(full_path: &str) -> Self {
        let name = full_path.rsplit('/').next().unwrap_or(full_path).to_string();
        Self {
            name,
            full_path: full_path.to_string(),
            children: Vec::new(),
            batch_size: 2,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.children.push(DroppedEntry::File(FileEntry {
            name: name.to_string(),
            full_path: format!("{}/{}", self.full_path, name),
            data: FileData::Memory(Arc::from(data)),
        }));
        self
    }

    pub fn dir(mut self, child: MemoryDirectory) -> Self {
        self.children.push(DroppedEntry::Directory(Arc::new(child)));
        self
    }

    pub fn into_entry(self) -> DroppedEntry {
        DroppedEntry::Directory(Arc::new(self))
    }
}

impl DirectoryEntry for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_path(&self) -> &str {
        &self.full_path
    }

    fn reader(&self) -> Box<dyn DirectoryReader> {
        Box::new(MemoryReader {
            remaining: self.children.iter().cloned().collect(),
            batch_size: self.batch_size,
        })
    }
}

struct MemoryReader {
    remaining: VecDeque<DroppedEntry>,
    batch_size: usize,
}

#[async_trait]
impl DirectoryReader for MemoryReader {
    async fn read_batch(&mut self) -> std::io::Result<Vec<DroppedEntry>> {
        let take = self.batch_size.min(self.remaining.len());
        Ok(self.remaining.drain(..take).collect())
    }
}

/// A dropped loose file.
pub fn dropped_file(name: &str, data: &[u8]) -> DroppedEntry {
    DroppedEntry::File(FileEntry {
        name: name.to_string(),
        full_path: format!("/{}", name),
        data: FileData::Memory(Arc::from(data)),
    })
}
