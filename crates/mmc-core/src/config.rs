use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MediaError, MediaResult};

/// Top-level configuration (loaded from mmc.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MmcConfig {
    pub transport: TransportConfig,
    pub storage: StorageConfig,
    pub logging: LogConfig,
}

impl MmcConfig {
    /// Parse a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> MediaResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| MediaError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Content host used for downloads and direct-path URLs (default: mmg.whatsapp.net)
    pub default_host: String,
    /// Origin header sent with every CDN request
    pub origin: String,
    /// Hosts tried before the ones returned by the upload-info provider
    pub custom_upload_hosts: Vec<String>,
    /// Per-host upload timeout in seconds (default: 30)
    pub upload_timeout_secs: u64,
    /// Download timeout in seconds (default: 60)
    pub download_timeout_secs: u64,
    /// Reject remote sources larger than this many bytes
    pub max_content_length: Option<u64>,
    /// Verify the trailing MAC on full downloads (default: true)
    pub verify_mac: bool,
}

impl TransportConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            default_host: "mmg.whatsapp.net".into(),
            origin: "https://web.whatsapp.com".into(),
            custom_upload_hosts: Vec::new(),
            upload_timeout_secs: 30,
            download_timeout_secs: 60,
            max_content_length: None,
            verify_mac: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Staging directory for encrypted files (default: OS temp dir)
    pub tmp_dir: Option<PathBuf>,
    /// Keep an untouched copy of the plaintext next to the ciphertext
    pub save_original: bool,
}

impl StorageConfig {
    pub fn tmp_dir(&self) -> PathBuf {
        self.tmp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
