//! Rar-backed comic archives.
//!
//! Rar decoding is delegated to a [`RarEngine`] that has to be installed
//! (and therefore "ready") before any `.cbr` job runs. The engine is a
//! black box: it lists headers and extracts single entries by name.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::DecodeError;
use crate::processor::{select_image_entries, DecodedPage, PageReader};

/// Header of one entry inside a rar archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarEntryHeader {
    pub name: String,
    pub is_directory: bool,
}

/// An opened rar archive.
pub trait RarExtractor: Send {
    fn list_entries(&mut self) -> Result<Vec<RarEntryHeader>, DecodeError>;

    /// Extracts one entry. `None` if the engine produced nothing for it.
    fn extract(&mut self, name: &str) -> Result<Option<Vec<u8>>, DecodeError>;
}

/// Factory for [`RarExtractor`]s over raw archive bytes.
pub trait RarEngine: Send + Sync {
    fn open(&self, data: Vec<u8>) -> Result<Box<dyn RarExtractor>, DecodeError>;
}

/// Shared slot holding the engine once it has been initialized.
#[derive(Clone, Default)]
pub struct RarEngineSlot {
    engine: Arc<OnceCell<Arc<dyn RarEngine>>>,
}

impl RarEngineSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.engine.initialized()
    }

    pub fn get(&self) -> Option<Arc<dyn RarEngine>> {
        self.engine.get().cloned()
    }

    /// Installs an already built engine. Returns false if one was present.
    pub fn install(&self, engine: Arc<dyn RarEngine>) -> bool {
        self.engine.set(engine).is_ok()
    }

    /// Runs `loader` unless an engine is already installed. A failing loader
    /// is logged and leaves the slot empty so a later call can try again.
    pub async fn initialize<F, Fut>(&self, loader: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn RarEngine>, DecodeError>>,
    {
        if self.is_ready() {
            return true;
        }
        match self.engine.get_or_try_init(loader).await {
            Ok(_) => {
                log::info!("Unrar engine ready");
                true
            }
            Err(e) => {
                log::error!("Unrar loading failed: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for RarEngineSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RarEngineSlot")
            .field("ready", &self.is_ready())
            .finish()
    }
}

pub struct RarPages {
    extractor: Box<dyn RarExtractor>,
    names: Vec<String>,
}

pub fn open(engine: &dyn RarEngine, data: Vec<u8>) -> Result<RarPages, DecodeError> {
    let mut extractor = engine.open(data)?;
    let headers = extractor.list_entries()?;
    let total = headers.len();

    let names = select_image_entries(headers.into_iter().map(|h| (h.name, h.is_directory)));

    log::debug!("CBR holds {} image entries out of {}", names.len(), total);

    Ok(RarPages { extractor, names })
}

impl PageReader for RarPages {
    fn page_names(&self) -> &[String] {
        &self.names
    }

    fn read_page(&mut self, index: usize) -> Result<Option<DecodedPage>, DecodeError> {
        let Some(name) = self.names.get(index) else {
            return Ok(None);
        };
        let data = self.extractor.extract(name)?;
        Ok(data.map(|data| DecodedPage::new(name, data)))
    }
}
