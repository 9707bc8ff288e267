use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Upload endpoint receiving `file`, `filename` and `folderPath` parts.
    pub endpoint: String,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

fn default_progress_capacity() -> usize {
    256
}

impl Config {
    /// Builds a config with every optional section at its default.
    pub fn default_with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            endpoint: endpoint.into(),
            naming: NamingConfig::default(),
            upload: UploadConfig::default(),
            progress_capacity: default_progress_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamingConfig {
    /// Destination roots starting with this prefix get page renaming.
    #[serde(default = "default_paged_prefix")]
    pub paged_prefix: String,
    /// Suffix appended to every page name (`page_001_<suffix>.jpg`).
    #[serde(default = "default_locale_suffix")]
    pub locale_suffix: String,
}

fn default_paged_prefix() -> String {
    "MAD/".to_string()
}

fn default_locale_suffix() -> String {
    "de".to_string()
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            paged_prefix: default_paged_prefix(),
            locale_suffix: default_locale_suffix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    120
}

impl UploadConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
