//! Sync transport settings (`[sync]` table of the config file).

use crate::{PassbridgeError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TOKEN_SERVER_URL: &str = "https://token.services.mozilla.com/1.0/sync/1.5";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Full token server discovery URL
    pub token_server_url: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Records encrypted and uploaded in flight at once
    pub concurrency: usize,
    /// Records per page when listing a collection
    pub page_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            token_server_url: DEFAULT_TOKEN_SERVER_URL.to_string(),
            timeout_secs: 30,
            concurrency: 4,
            page_size: 1000,
        }
    }
}

impl SyncSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.token_server_url).map_err(|e| {
            PassbridgeError::Configuration(format!(
                "sync.token_server_url {:?}: {}",
                self.token_server_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PassbridgeError::Configuration(format!(
                "sync.token_server_url must be http(s), got {}",
                url.scheme()
            )));
        }
        if self.timeout_secs == 0 {
            return Err(PassbridgeError::Configuration(
                "sync.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(PassbridgeError::Configuration(
                "sync.concurrency must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(PassbridgeError::Configuration(
                "sync.page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
