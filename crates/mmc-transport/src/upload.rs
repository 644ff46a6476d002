//! Upload an encrypted payload, falling back across content hosts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use mmc_core::config::TransportConfig;
use mmc_core::{MediaError, MediaResult, MediaType};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::http::{Headers, MediaHttp};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadHost {
    pub hostname: String,
}

impl UploadHost {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }
}

/// Hosts and auth token for uploads. The token is never logged.
#[derive(Debug)]
pub struct UploadInfo {
    pub hosts: Vec<UploadHost>,
    pub auth: SecretString,
}

/// Supplies upload hosts and auth. `force_refresh` asks for a new token.
/// Implementations must tolerate concurrent calls.
#[async_trait]
pub trait UploadInfoProvider: Send + Sync {
    async fn upload_info(&self, force_refresh: bool) -> MediaResult<UploadInfo>;
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub media_type: MediaType,
    /// SHA-256 of the stored payload; becomes the upload token
    pub file_enc_sha256: [u8; 32],
    /// Per-host timeout, overriding the configured default
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub media_url: Option<String>,
    pub direct_path: Option<String>,
}

/// URL-safe, unpadded base64 of the payload digest.
pub fn upload_token(file_enc_sha256: &[u8; 32]) -> String {
    URL_SAFE_NO_PAD.encode(file_enc_sha256)
}

/// `https://{host}{path}/{token}?auth={auth}&token={token}`
pub fn upload_url(hostname: &str, path: &str, token: &str, auth: &str) -> MediaResult<String> {
    let mut url = reqwest::Url::parse(&format!("https://{hostname}{path}/{token}"))
        .map_err(|e| MediaError::Transport(format!("invalid upload host {hostname}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("auth", auth)
        .append_pair("token", token);
    Ok(url.into())
}

pub struct MediaUploader {
    http: Arc<dyn MediaHttp>,
    provider: Arc<dyn UploadInfoProvider>,
    custom_hosts: Vec<UploadHost>,
    origin: String,
    timeout: Duration,
}

impl MediaUploader {
    pub fn new(
        http: Arc<dyn MediaHttp>,
        provider: Arc<dyn UploadInfoProvider>,
        cfg: &TransportConfig,
    ) -> Self {
        Self {
            http,
            provider,
            custom_hosts: cfg
                .custom_upload_hosts
                .iter()
                .map(UploadHost::new)
                .collect(),
            origin: cfg.origin.clone(),
            timeout: cfg.upload_timeout(),
        }
    }

    /// Upload the file at `enc_path`, trying custom hosts first and then the
    /// provider's hosts, strictly one at a time.
    ///
    /// A host that answers without a URL or direct path triggers an auth
    /// refresh; later hosts use the refreshed token.
    pub async fn upload(&self, enc_path: &Path, req: &UploadRequest) -> MediaResult<UploadedMedia> {
        let path = req.media_type.upload_path().ok_or_else(|| {
            MediaError::Transport(format!("media type {} cannot be uploaded", req.media_type))
        })?;

        let mut info = self.provider.upload_info(false).await?;
        let hosts: Vec<UploadHost> = self
            .custom_hosts
            .iter()
            .cloned()
            .chain(info.hosts.iter().cloned())
            .collect();

        let token = upload_token(&req.file_enc_sha256);
        let timeout = req.timeout.unwrap_or(self.timeout);
        let headers: Headers = vec![
            ("Content-Type", "application/octet-stream".to_string()),
            ("Origin", self.origin.clone()),
        ];

        for (attempt, host) in hosts.iter().enumerate() {
            debug!(host = %host.hostname, attempt, "uploading media");
            let url = match upload_url(&host.hostname, path, &token, info.auth.expose_secret()) {
                Ok(url) => url,
                Err(e) => {
                    warn!(host = %host.hostname, error = %e, "skipping upload host");
                    continue;
                }
            };

            match self.http.post_file(&url, enc_path, &headers, timeout).await {
                Ok(resp) if resp.is_accepted() => {
                    info!(
                        host = %host.hostname,
                        media_type = %req.media_type,
                        direct_path = ?resp.direct_path,
                        "uploaded media"
                    );
                    return Ok(UploadedMedia {
                        media_url: resp.url,
                        direct_path: resp.direct_path,
                    });
                }
                Ok(resp) => {
                    warn!(
                        host = %host.hostname,
                        response = ?resp,
                        retrying = attempt + 1 < hosts.len(),
                        "upload rejected, refreshing auth"
                    );
                    // a failed refresh keeps the previous auth for later hosts
                    match self.provider.upload_info(true).await {
                        Ok(refreshed) => info = refreshed,
                        Err(e) => warn!(error = %e, "auth refresh failed"),
                    }
                }
                Err(e) => {
                    warn!(
                        host = %host.hostname,
                        error = %e,
                        retrying = attempt + 1 < hosts.len(),
                        "upload failed"
                    );
                }
            }
        }

        Err(MediaError::Transport("media upload failed on all hosts".into()))
    }
}
