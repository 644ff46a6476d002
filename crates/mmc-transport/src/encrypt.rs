//! Encrypt-on-upload: stream a source through the media encryptor into a
//! staged file, awaiting every write before pulling the next chunk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use mmc_core::{MediaError, MediaResult, MediaType, MmcConfig};
use mmc_crypto::{
    derive_media_keys, MediaDigests, MediaEncryptor, MediaKey, MediaKeySet, MAC_SIZE,
};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::http::MediaHttp;
use crate::source::MediaSource;
use crate::temp::TempStore;

#[derive(Debug, Clone)]
pub struct EncryptOptions {
    /// Also write the untouched plaintext to `{type}{id}-original`
    pub save_original: bool,
    /// Ceiling for remote sources
    pub max_content_length: Option<u64>,
    pub origin: String,
    pub timeout: Option<Duration>,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self::from_config(&MmcConfig::default())
    }
}

impl EncryptOptions {
    pub fn from_config(cfg: &MmcConfig) -> Self {
        Self {
            save_original: cfg.storage.save_original,
            max_content_length: cfg.transport.max_content_length,
            origin: cfg.transport.origin.clone(),
            timeout: Some(cfg.transport.download_timeout()),
        }
    }
}

/// Result of a successful encryption. The staged files belong to the caller,
/// who uploads `enc_path` and then calls [`cleanup`](Self::cleanup).
#[derive(Debug)]
pub struct EncryptedMediaArtifact {
    pub media_key: MediaKey,
    pub enc_path: PathBuf,
    pub original_path: Option<PathBuf>,
    pub mac: [u8; MAC_SIZE],
    pub file_sha256: [u8; 32],
    pub file_enc_sha256: [u8; 32],
    pub file_length: u64,
}

impl EncryptedMediaArtifact {
    pub async fn cleanup(&self) -> MediaResult<()> {
        remove_if_present(&self.enc_path).await?;
        if let Some(original) = &self.original_path {
            remove_if_present(original).await?;
        }
        Ok(())
    }
}

/// Plaintext staged for an unencrypted upload.
#[derive(Debug, Clone)]
pub struct RawMediaUpload {
    pub path: PathBuf,
    pub file_sha256: [u8; 32],
    pub file_length: u64,
}

async fn remove_if_present(path: &Path) -> MediaResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Staged files of an in-flight encryption. Failed runs call
/// [`remove_all`](Self::remove_all); anything still tracked is deleted on
/// drop, which covers a future dropped mid-way.
struct PartialFiles {
    paths: Vec<PathBuf>,
}

impl PartialFiles {
    fn new() -> Self {
        Self { paths: Vec::new() }
    }

    fn track(&mut self, path: &Path) {
        self.paths.push(path.to_path_buf());
    }

    fn disarm(mut self) {
        self.paths.clear();
    }

    async fn remove_all(mut self) {
        for path in std::mem::take(&mut self.paths) {
            if let Err(e) = remove_if_present(&path).await {
                warn!(path = %path.display(), error = %e, "failed to remove partial file");
            }
        }
    }
}

impl Drop for PartialFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove partial file");
                }
            }
        }
    }
}

async fn create_sink(path: &Path) -> MediaResult<BufWriter<File>> {
    let file = File::create(path)
        .await
        .map_err(|e| MediaError::stream(&format!("creating {}", path.display()), e))?;
    Ok(BufWriter::new(file))
}

async fn close_sink(mut sink: BufWriter<File>, what: &str) -> MediaResult<()> {
    sink.flush()
        .await
        .map_err(|e| MediaError::stream(&format!("flushing {what}"), e))?;
    sink.get_ref()
        .sync_all()
        .await
        .map_err(|e| MediaError::stream(&format!("syncing {what}"), e))
}

fn check_ceiling(remote: bool, total: u64, max: Option<u64>) -> MediaResult<()> {
    match max {
        Some(max) if remote && total > max => Err(MediaError::Transport(format!(
            "content length exceeded ({total} > {max} bytes)"
        ))),
        _ => Ok(()),
    }
}

/// Encrypt `source` under a fresh media key into `{tmp}/{type}{id}-enc`.
///
/// On any failure both staged files are removed and the error is returned.
pub async fn encrypted_stream(
    http: &dyn MediaHttp,
    source: MediaSource,
    media_type: MediaType,
    temp: &TempStore,
    opts: &EncryptOptions,
) -> MediaResult<EncryptedMediaArtifact> {
    let media_key = MediaKey::generate();
    let keys = derive_media_keys(&media_key, media_type)?;

    let name = temp.allocate(media_type);
    let enc_path = name.encrypted();
    let original_path = opts.save_original.then(|| name.original());

    let mut guard = PartialFiles::new();
    guard.track(&enc_path);
    if let Some(path) = &original_path {
        guard.track(path);
    }
    let staged = encrypt_to_files(
        http,
        source,
        &keys,
        &enc_path,
        original_path.as_deref(),
        opts,
    )
    .await;
    let digests = match staged {
        Ok(digests) => {
            guard.disarm();
            digests
        }
        Err(e) => {
            guard.remove_all().await;
            return Err(e);
        }
    };

    debug!(
        media_type = %media_type,
        bytes = digests.file_length,
        path = %enc_path.display(),
        "encrypted media"
    );

    Ok(EncryptedMediaArtifact {
        media_key,
        enc_path,
        original_path,
        mac: digests.mac,
        file_sha256: digests.file_sha256,
        file_enc_sha256: digests.file_enc_sha256,
        file_length: digests.file_length,
    })
}

async fn encrypt_to_files(
    http: &dyn MediaHttp,
    source: MediaSource,
    keys: &MediaKeySet,
    enc_path: &Path,
    original_path: Option<&Path>,
    opts: &EncryptOptions,
) -> MediaResult<MediaDigests> {
    let mut enc_sink = create_sink(enc_path).await?;
    let mut original_sink = match original_path {
        Some(path) => Some(create_sink(path).await?),
        None => None,
    };

    let mut opened = source.open(http, &opts.origin, opts.timeout).await?;
    let mut encryptor = MediaEncryptor::new(keys)?;
    let mut total: u64 = 0;

    while let Some(chunk) = opened.stream.next().await {
        let chunk = chunk?;
        total += chunk.len() as u64;
        check_ceiling(opened.remote, total, opts.max_content_length)?;

        if let Some(sink) = original_sink.as_mut() {
            sink.write_all(&chunk)
                .await
                .map_err(|e| MediaError::stream("writing original", e))?;
        }
        let ciphertext = encryptor.update(&chunk);
        enc_sink
            .write_all(&ciphertext)
            .await
            .map_err(|e| MediaError::stream("writing ciphertext", e))?;
    }
    drop(opened);

    let (tail, digests) = encryptor.finalize();
    enc_sink
        .write_all(&tail)
        .await
        .map_err(|e| MediaError::stream("writing ciphertext", e))?;
    close_sink(enc_sink, "ciphertext").await?;
    if let Some(sink) = original_sink {
        close_sink(sink, "original").await?;
    }
    Ok(digests)
}

/// Stage `source` unencrypted at `{tmp}/{type}{id}`, hashing as it goes.
pub async fn raw_media_upload_data(
    http: &dyn MediaHttp,
    source: MediaSource,
    media_type: MediaType,
    temp: &TempStore,
    opts: &EncryptOptions,
) -> MediaResult<RawMediaUpload> {
    let path = temp.allocate(media_type).raw();
    let mut guard = PartialFiles::new();
    guard.track(&path);

    let (file_sha256, file_length) = match stage_raw(http, source, &path, opts).await {
        Ok(staged) => {
            guard.disarm();
            staged
        }
        Err(e) => {
            guard.remove_all().await;
            return Err(e);
        }
    };

    debug!(media_type = %media_type, bytes = file_length, "staged raw media");

    Ok(RawMediaUpload {
        path,
        file_sha256,
        file_length,
    })
}

async fn stage_raw(
    http: &dyn MediaHttp,
    source: MediaSource,
    path: &Path,
    opts: &EncryptOptions,
) -> MediaResult<([u8; 32], u64)> {
    let mut sink = create_sink(path).await?;
    let mut opened = source.open(http, &opts.origin, opts.timeout).await?;
    let mut hasher = Sha256::new();
    let mut total: u64 = 0;

    while let Some(chunk) = opened.stream.next().await {
        let chunk = chunk?;
        total += chunk.len() as u64;
        check_ceiling(opened.remote, total, opts.max_content_length)?;
        hasher.update(&chunk);
        sink.write_all(&chunk)
            .await
            .map_err(|e| MediaError::stream("writing raw media", e))?;
    }
    close_sink(sink, "raw media").await?;
    Ok((hasher.finalize().into(), total))
}
