//! passbridge configuration file.
//!
//! ```toml
//! [sync]
//! token_server_url = "https://token.services.mozilla.com/1.0/sync/1.5"
//! timeout_secs = 30
//! concurrency = 4
//! page_size = 1000
//!
//! [prune]
//! max_age_hours = 24
//!
//! [chrome]
//! search_paths = ["~/.config/google-chrome"]
//! key_provider = "linux-default"   # or "plaintext", "secret"
//! key_secret = "..."
//! key_iterations = 1003
//! ```
//!
//! Every key is optional.

use crate::local::keys::{provider_for, KeyProviderKind, LocalKeyProvider};
use crate::platform::default_chrome_search_paths;
use crate::sync::config::SyncSettings;
use crate::{PassbridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassbridgeConfig {
    pub sync: SyncSettings,
    pub prune: PruneSettings,
    pub chrome: ChromeSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneSettings {
    /// Records created within this many hours are pruned
    pub max_age_hours: u64,
}

impl Default for PruneSettings {
    fn default() -> Self {
        Self { max_age_hours: 24 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeSettings {
    /// Directories searched for `Login Data`; empty means the platform defaults
    pub search_paths: Vec<PathBuf>,
    pub key_provider: KeyProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_iterations: Option<u32>,
}

impl ChromeSettings {
    pub fn search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            default_chrome_search_paths()
        } else {
            self.search_paths.clone()
        }
    }

    pub fn key_provider(&self) -> Result<Box<dyn LocalKeyProvider>> {
        provider_for(
            self.key_provider,
            self.key_secret.as_deref(),
            self.key_iterations,
        )
    }
}

impl PassbridgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            PassbridgeError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        if self.chrome.key_provider == KeyProviderKind::Secret
            && self.chrome.key_secret.as_deref().unwrap_or("").is_empty()
        {
            return Err(PassbridgeError::Configuration(
                "chrome.key_provider = \"secret\" requires chrome.key_secret".to_string(),
            ));
        }
        if self.chrome.key_iterations == Some(0) {
            return Err(PassbridgeError::Configuration(
                "chrome.key_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
