//! Archive decoders that turn comic archives into ordered image pages.
//!
//! Both decoders share one contract: list the archive, keep only image
//! entries (see [`crate::naming::is_image_name`]), order them naturally and
//! hand pages out one at a time so callers can stop between pages.

pub mod cbr;
pub mod cbz;
#[cfg(feature = "unrar")]
pub mod unrar;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::naming::{extension_of, is_image_name, natural_sort_by_key};

pub use cbr::{RarEngine, RarEngineSlot, RarEntryHeader, RarExtractor, RarPages};
pub use cbz::ZipPages;

const FALLBACK_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// `.cbz`, a zip container.
    Zip,
    /// `.cbr`, a rar container.
    Rar,
}

impl ArchiveFormat {
    pub fn from_file_name(name: &str) -> Option<Self> {
        match extension_of(name)?.as_str() {
            "cbz" => Some(ArchiveFormat::Zip),
            "cbr" => Some(ArchiveFormat::Rar),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveFormat::Zip => write!(f, "CBZ"),
            ArchiveFormat::Rar => write!(f, "CBR"),
        }
    }
}

/// MIME type for an image extension, `image/jpeg` when unknown.
pub fn mime_for_extension(extension: Option<&str>) -> String {
    extension
        .and_then(|ext| mime_guess::from_ext(ext).first())
        .filter(|mime| mime.type_() == "image")
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// One extracted image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPage {
    /// Entry name inside the archive.
    pub name: String,
    pub data: Vec<u8>,
    /// Lower-cased extension of the entry name.
    pub extension: Option<String>,
    pub mime_type: String,
}

impl DecodedPage {
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        let extension = extension_of(name);
        let mime_type = mime_for_extension(extension.as_deref());
        Self {
            name: name.to_string(),
            data,
            extension,
            mime_type,
        }
    }
}

/// Sequential access to the image pages of an opened archive.
pub trait PageReader: Send {
    /// Image entry names, filtered and naturally sorted.
    fn page_names(&self) -> &[String];

    /// Extracts the page at `index` (0-based into [`page_names`]).
    /// `None` means the entry produced no data and should be skipped.
    ///
    /// [`page_names`]: PageReader::page_names
    fn read_page(&mut self, index: usize) -> Result<Option<DecodedPage>, DecodeError>;

    fn page_count(&self) -> usize {
        self.page_names().len()
    }
}

/// Keeps image entries that are not directories, in natural order.
pub(crate) fn select_image_entries<I>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, bool)>,
{
    let mut names: Vec<String> = entries
        .into_iter()
        .filter(|(name, is_dir)| !*is_dir && is_image_name(name))
        .map(|(name, _)| name)
        .collect();
    natural_sort_by_key(&mut names, |n| n.as_str());
    names
}

/// Opens `data` with the decoder for `format`.
pub fn open_archive(
    format: ArchiveFormat,
    data: Vec<u8>,
    rar: &RarEngineSlot,
) -> Result<Box<dyn PageReader>, DecodeError> {
    let reader: Box<dyn PageReader> = match format {
        ArchiveFormat::Zip => Box::new(cbz::open(data)?),
        ArchiveFormat::Rar => {
            let engine = rar.get().ok_or(DecodeError::EngineNotReady)?;
            Box::new(cbr::open(engine.as_ref(), data)?)
        }
    };

    if reader.page_count() == 0 {
        return Err(DecodeError::NoValidImages { format });
    }
    Ok(reader)
}

/// Extracts every page in order.
#[cfg(test)]
pub(crate) fn decode_all(reader: &mut dyn PageReader) -> Result<Vec<DecodedPage>, DecodeError> {
    let mut pages = Vec::with_capacity(reader.page_count());
    for index in 0..reader.page_count() {
        if let Some(page) = reader.read_page(index)? {
            pages.push(page);
        }
    }
    Ok(pages)
}
