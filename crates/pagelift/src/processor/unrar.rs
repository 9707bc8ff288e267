//! [`RarEngine`] backed by the native `unrar` library.
//!
//! unrar only reads archives from disk, so the bytes are spooled into a
//! temporary `.rar` file that lives as long as the extractor.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::DecodeError;
use crate::processor::cbr::{RarEngine, RarEntryHeader, RarExtractor};

#[derive(Debug, Default, Clone, Copy)]
pub struct UnrarEngine;

impl UnrarEngine {
    pub fn new() -> Self {
        Self
    }
}

impl RarEngine for UnrarEngine {
    fn open(&self, data: Vec<u8>) -> Result<Box<dyn RarExtractor>, DecodeError> {
        let mut file = tempfile::Builder::new().suffix(".rar").tempfile()?;
        file.write_all(&data)?;
        file.flush()?;
        Ok(Box::new(UnrarExtractor { file }))
    }
}

struct UnrarExtractor {
    file: NamedTempFile,
}

fn entry_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

impl RarExtractor for UnrarExtractor {
    fn list_entries(&mut self) -> Result<Vec<RarEntryHeader>, DecodeError> {
        let archive = unrar::Archive::new(self.file.path())
            .open_for_listing()
            .map_err(|e| DecodeError::InvalidArchive(format!("Failed to open CBR: {}", e)))?;

        let mut headers = Vec::new();
        for entry in archive {
            let entry =
                entry.map_err(|e| DecodeError::InvalidArchive(format!("Bad CBR header: {}", e)))?;
            headers.push(RarEntryHeader {
                name: entry_name(&entry.filename),
                is_directory: entry.is_directory(),
            });
        }
        Ok(headers)
    }

    fn extract(&mut self, name: &str) -> Result<Option<Vec<u8>>, DecodeError> {
        let failed = |e: unrar::error::UnrarError| DecodeError::Extraction {
            entry: name.to_string(),
            reason: e.to_string(),
        };

        let mut archive = unrar::Archive::new(self.file.path())
            .open_for_processing()
            .map_err(failed)?;

        while let Some(header) = archive.read_header().map_err(failed)? {
            if entry_name(&header.entry().filename) == name {
                let (data, _rest) = header.read().map_err(failed)?;
                return Ok(Some(data));
            }
            archive = header.skip().map_err(failed)?;
        }
        Ok(None)
    }
}
