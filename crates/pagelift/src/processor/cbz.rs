use std::io::{Cursor, Read};

use crate::error::DecodeError;
use crate::processor::{select_image_entries, DecodedPage, PageReader};

/// Zip-backed comic archive held entirely in memory.
pub struct ZipPages {
    archive: zip::ZipArchive<Cursor<Vec<u8>>>,
    names: Vec<String>,
}

pub fn open(data: Vec<u8>) -> Result<ZipPages, DecodeError> {
    let archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| DecodeError::InvalidArchive(format!("Failed to open CBZ: {}", e)))?;

    let names = select_image_entries(
        archive
            .file_names()
            .map(|name| (name.to_string(), name.ends_with('/'))),
    );

    log::debug!(
        "CBZ holds {} image entries out of {}",
        names.len(),
        archive.len()
    );

    Ok(ZipPages { archive, names })
}

/// Upper bound on the buffer reserved up front for one entry.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// The declared size comes from the archive header and is not trusted.
fn prealloc_len(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

impl PageReader for ZipPages {
    fn page_names(&self) -> &[String] {
        &self.names
    }

    fn read_page(&mut self, index: usize) -> Result<Option<DecodedPage>, DecodeError> {
        let Some(name) = self.names.get(index) else {
            return Ok(None);
        };

        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|e| DecodeError::Extraction {
                entry: name.clone(),
                reason: e.to_string(),
            })?;

        let mut data = Vec::with_capacity(prealloc_len(entry.size()));
        entry
            .read_to_end(&mut data)
            .map_err(|e| DecodeError::Extraction {
                entry: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Some(DecodedPage::new(name, data)))
    }
}
