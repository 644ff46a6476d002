//! Key derivation: media key → per-type key set, media key → retry key

use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use mmc_core::{MediaError, MediaResult, MediaType};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{AES_BLOCK_SIZE, EXPANDED_KEY_SIZE, MEDIA_KEY_SIZE};

const DATA_URI_PREFIX: &str = "data:;base64,";
const RETRY_INFO: &[u8] = b"WhatsApp Media Retry Notification";

/// The root secret of one media object. Zeroized on drop.
///
/// Freshly generated keys are 32 bytes; keys received from peers are taken
/// as-is (any non-empty length feeds HKDF).
#[derive(Clone)]
pub struct MediaKey {
    bytes: Vec<u8>,
}

impl MediaKey {
    /// Random 256-bit key from the thread RNG.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MEDIA_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: &[u8]) -> MediaResult<Self> {
        if bytes.is_empty() {
            return Err(MediaError::KeyDerivation("media key is empty".into()));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Parse the textual form: base64, optionally behind a `data:;base64,` prefix.
    pub fn from_base64(text: &str) -> MediaResult<Self> {
        let text = text.trim();
        let encoded = text.strip_prefix(DATA_URI_PREFIX).unwrap_or(text);
        let mut decoded = STANDARD
            .decode(encoded)
            .map_err(|e| MediaError::KeyDerivation(format!("media key is not valid base64: {e}")))?;
        let key = Self::from_bytes(&decoded);
        decoded.zeroize();
        key
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

impl Drop for MediaKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MediaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// IV, cipher key, and MAC key for one media object. Zeroized on drop.
#[derive(Clone)]
pub struct MediaKeySet {
    iv: [u8; AES_BLOCK_SIZE],
    cipher_key: [u8; 32],
    mac_key: [u8; 32],
}

impl MediaKeySet {
    pub fn from_parts(iv: [u8; AES_BLOCK_SIZE], cipher_key: [u8; 32], mac_key: [u8; 32]) -> Self {
        Self {
            iv,
            cipher_key,
            mac_key,
        }
    }

    pub fn iv(&self) -> &[u8; AES_BLOCK_SIZE] {
        &self.iv
    }

    pub fn cipher_key(&self) -> &[u8; 32] {
        &self.cipher_key
    }

    pub fn mac_key(&self) -> &[u8; 32] {
        &self.mac_key
    }
}

impl Drop for MediaKeySet {
    fn drop(&mut self) {
        self.iv.zeroize();
        self.cipher_key.zeroize();
        self.mac_key.zeroize();
    }
}

impl std::fmt::Debug for MediaKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaKeySet")
            .field("iv", &"[REDACTED]")
            .field("cipher_key", &"[REDACTED]")
            .field("mac_key", &"[REDACTED]")
            .finish()
    }
}

/// AES-256-GCM key protecting media-retry payloads. Zeroized on drop.
#[derive(Clone)]
pub struct RetryKey {
    bytes: [u8; 32],
}

impl RetryKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Drop for RetryKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for RetryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// HKDF info string for a media type, e.g. `WhatsApp Image Keys`.
pub fn hkdf_info(media_type: MediaType) -> String {
    format!("WhatsApp {} Keys", media_type.hkdf_label())
}

/// Expand a media key into the key set for `media_type`.
pub fn derive_media_keys(media_key: &MediaKey, media_type: MediaType) -> MediaResult<MediaKeySet> {
    let info = hkdf_info(media_type);
    let mut okm = hkdf_derive::<EXPANDED_KEY_SIZE>(media_key.as_bytes(), info.as_bytes())?;

    let mut iv = [0u8; AES_BLOCK_SIZE];
    let mut cipher_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    iv.copy_from_slice(&okm[..16]);
    cipher_key.copy_from_slice(&okm[16..48]);
    mac_key.copy_from_slice(&okm[48..80]);
    okm.zeroize();

    Ok(MediaKeySet::from_parts(iv, cipher_key, mac_key))
}

/// Derive the AES-256-GCM key for media-retry payloads.
pub fn derive_retry_key(media_key: &MediaKey) -> MediaResult<RetryKey> {
    let bytes = hkdf_derive::<32>(media_key.as_bytes(), RETRY_INFO)?;
    Ok(RetryKey { bytes })
}

/// HKDF-SHA256 (no salt) with a domain-specific info string.
fn hkdf_derive<const N: usize>(ikm: &[u8], info: &[u8]) -> MediaResult<[u8; N]> {
    if ikm.is_empty() {
        return Err(MediaError::KeyDerivation("media key is empty".into()));
    }
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; N];
    hkdf.expand(info, &mut okm)
        .map_err(|e| MediaError::KeyDerivation(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}
