//! Decrypt-on-download, including block-aligned byte ranges.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use mmc_core::{MediaError, MediaReference, MediaResult, MediaType, MmcConfig};
use mmc_crypto::{derive_media_keys, DownloadRange, FetchPlan, MediaDecryptor, MediaKey, MediaKeySet};
use tracing::debug;

use crate::http::{ByteStream, Headers, MediaHttp};

/// Content host for direct paths when none is configured.
pub const DEFAULT_HOST: &str = "mmg.whatsapp.net";

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub range: DownloadRange,
    pub default_host: String,
    pub origin: String,
    pub timeout: Option<Duration>,
    pub verify_mac: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::from_config(&MmcConfig::default())
    }
}

impl DownloadOptions {
    pub fn from_config(cfg: &MmcConfig) -> Self {
        Self {
            range: DownloadRange::full(),
            default_host: cfg.transport.default_host.clone(),
            origin: cfg.transport.origin.clone(),
            timeout: Some(cfg.transport.download_timeout()),
            verify_mac: cfg.transport.verify_mac,
        }
    }

    pub fn with_range(mut self, range: DownloadRange) -> Self {
        self.range = range;
        self
    }

    /// Download URL for a direct path on the configured host.
    pub fn url_for(&self, direct_path: &str) -> String {
        format!("https://{}{direct_path}", self.default_host)
    }
}

/// Download URL for a direct path on the default content host.
pub fn url_from_direct_path(direct_path: &str) -> String {
    format!("https://{DEFAULT_HOST}{direct_path}")
}

struct DecryptState {
    source: Option<ByteStream>,
    decryptor: Option<MediaDecryptor>,
}

/// Fetch `url` and return a stream of plaintext for `opts.range`.
///
/// The body is only pulled as the returned stream is polled. Dropping the
/// stream closes the fetch and releases the cipher state.
pub async fn download_encrypted_content(
    http: &dyn MediaHttp,
    url: &str,
    keys: &MediaKeySet,
    opts: &DownloadOptions,
) -> MediaResult<ByteStream> {
    let plan = FetchPlan::new(opts.range);
    let decryptor = MediaDecryptor::new(keys, &plan, opts.verify_mac)?;

    let mut headers: Headers = vec![("Origin", opts.origin.clone())];
    if let Some(range) = plan.range_header() {
        headers.push(("Range", range));
    }
    debug!(
        start_chunk = plan.start_chunk,
        end_chunk = ?plan.end_chunk,
        verify_mac = decryptor.verifies_mac(),
        "fetching encrypted media"
    );
    let source = http.get(url, &headers, opts.timeout).await?;

    let state = DecryptState {
        source: Some(source),
        decryptor: Some(decryptor),
    };
    let stream = stream::try_unfold(state, |mut st| async move {
        loop {
            let Some(source) = st.source.as_mut() else {
                return Ok::<_, MediaError>(None);
            };
            match source.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    let Some(decryptor) = st.decryptor.as_mut() else {
                        return Ok(None);
                    };
                    let out = decryptor.update(&chunk)?;
                    if !out.is_empty() {
                        return Ok(Some((Bytes::from(out), st)));
                    }
                }
                None => {
                    st.source = None;
                    let out = match st.decryptor.take() {
                        Some(decryptor) => decryptor.finish()?,
                        None => Vec::new(),
                    };
                    debug!("media download complete");
                    if out.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some((Bytes::from(out), st)));
                }
            }
        }
    });
    Ok(stream.boxed())
}

/// Download the media referenced by an incoming message.
///
/// Prefers `url` when it points at the default host, otherwise builds the
/// URL from `direct_path`.
pub async fn download_content_from_message(
    http: &dyn MediaHttp,
    media: &MediaReference,
    media_type: MediaType,
    opts: &DownloadOptions,
) -> MediaResult<ByteStream> {
    let host_prefix = format!("https://{}/", opts.default_host);
    let url = media
        .url
        .as_deref()
        .filter(|u| u.starts_with(&host_prefix))
        .map(str::to_owned)
        .or_else(|| media.direct_path.as_deref().map(|p| opts.url_for(p)))
        .ok_or_else(|| MediaError::Transport("no valid media URL or direct path present".into()))?;

    let key = MediaKey::from_bytes(&media.media_key)?;
    let keys = derive_media_keys(&key, media_type)?;
    download_encrypted_content(http, &url, &keys, opts).await
}

/// Buffer a whole stream.
pub async fn collect(mut stream: ByteStream) -> MediaResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}
