//! Incremental AES-256-CBC + HMAC-SHA256 state machines.
//!
//! Both sides are synchronous and push-driven: callers feed arbitrary-sized
//! chunks and receive whatever whole blocks became available. The async
//! pipelines in `mmc-transport` wrap these around file sinks and HTTP bodies.

use aes::cipher::{generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use hmac::{Hmac, Mac};
use mmc_core::{MediaError, MediaResult};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::keys::MediaKeySet;
use crate::range::{DownloadRange, FetchPlan, RangeWindow};
use crate::{AES_BLOCK_SIZE, MAC_SIZE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Integrity values produced by a completed encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDigests {
    /// First 10 bytes of HMAC-SHA256(mac key, iv ‖ ciphertext)
    pub mac: [u8; MAC_SIZE],
    /// SHA-256 of the plaintext
    pub file_sha256: [u8; 32],
    /// SHA-256 of ciphertext ‖ mac (the stored payload)
    pub file_enc_sha256: [u8; 32],
    /// Plaintext length in bytes
    pub file_length: u64,
}

fn hmac_seeded(keys: &MediaKeySet) -> MediaResult<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(keys.mac_key())
        .map_err(|e| MediaError::KeyDerivation(format!("invalid MAC key: {e}")))?;
    mac.update(keys.iv());
    Ok(mac)
}

/// Streaming encryptor. Emits only whole ciphertext blocks from `update`;
/// the PKCS7 tail and the MAC come out of `finalize`.
pub struct MediaEncryptor {
    cipher: Aes256CbcEnc,
    hmac: HmacSha256,
    plain_sha: Sha256,
    enc_sha: Sha256,
    pending: Vec<u8>,
    length: u64,
}

impl MediaEncryptor {
    pub fn new(keys: &MediaKeySet) -> MediaResult<Self> {
        let cipher = Aes256CbcEnc::new_from_slices(keys.cipher_key(), keys.iv())
            .map_err(|e| MediaError::KeyDerivation(format!("invalid cipher key: {e}")))?;
        Ok(Self {
            cipher,
            hmac: hmac_seeded(keys)?,
            plain_sha: Sha256::new(),
            enc_sha: Sha256::new(),
            pending: Vec::with_capacity(AES_BLOCK_SIZE),
            length: 0,
        })
    }

    /// Feed plaintext; returns the ciphertext for every block completed so far.
    pub fn update(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.plain_sha.update(chunk);
        self.length += chunk.len() as u64;
        self.pending.extend_from_slice(chunk);

        let whole = self.pending.len() / AES_BLOCK_SIZE * AES_BLOCK_SIZE;
        let mut out: Vec<u8> = self.pending.drain(..whole).collect();
        self.encrypt_blocks(&mut out);
        out
    }

    /// Pad, encrypt the tail, and append the MAC. Returns the final bytes of
    /// the payload together with the digests.
    pub fn finalize(mut self) -> (Vec<u8>, MediaDigests) {
        let pad = AES_BLOCK_SIZE - self.pending.len() % AES_BLOCK_SIZE;
        let mut out = std::mem::take(&mut self.pending);
        out.resize(out.len() + pad, pad as u8);
        self.encrypt_blocks(&mut out);

        let full_mac = self.hmac.finalize_reset().into_bytes();
        let mut mac = [0u8; MAC_SIZE];
        mac.copy_from_slice(&full_mac[..MAC_SIZE]);
        self.enc_sha.update(mac);
        out.extend_from_slice(&mac);

        let digests = MediaDigests {
            mac,
            file_sha256: self.plain_sha.finalize_reset().into(),
            file_enc_sha256: self.enc_sha.finalize_reset().into(),
            file_length: self.length,
        };
        (out, digests)
    }

    fn encrypt_blocks(&mut self, buf: &mut [u8]) {
        for block in buf.chunks_exact_mut(AES_BLOCK_SIZE) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.hmac.update(buf);
        self.enc_sha.update(&*buf);
    }
}

impl Drop for MediaEncryptor {
    fn drop(&mut self) {
        self.pending.zeroize();
    }
}

/// Streaming decryptor for a fetched ciphertext window.
///
/// Keeps fewer than 16 bytes of carry-over between calls, consumes the first
/// block as the IV when the plan says so, and holds back the last plaintext
/// block until `finish` so PKCS7 padding can be stripped.
pub struct MediaDecryptor {
    cipher_key: [u8; 32],
    cipher: Option<Aes256CbcDec>,
    carry: Vec<u8>,
    held: Option<Vec<u8>>,
    unpad: bool,
    window: RangeWindow,
    mac: Option<HmacSha256>,
}

impl MediaDecryptor {
    /// `verify_mac` only takes effect when the plan covers the whole object.
    pub fn new(keys: &MediaKeySet, plan: &FetchPlan, verify_mac: bool) -> MediaResult<Self> {
        plan.range.check()?;
        let cipher = if plan.first_block_is_iv {
            None
        } else {
            Some(
                Aes256CbcDec::new_from_slices(keys.cipher_key(), keys.iv())
                    .map_err(|e| MediaError::KeyDerivation(format!("invalid cipher key: {e}")))?,
            )
        };
        let mac = if verify_mac && plan.range.is_full() {
            Some(hmac_seeded(keys)?)
        } else {
            None
        };
        Ok(Self {
            cipher_key: *keys.cipher_key(),
            cipher,
            carry: Vec::with_capacity(AES_BLOCK_SIZE * 2),
            held: None,
            unpad: plan.unpad,
            window: plan.window(),
            mac,
        })
    }

    pub fn verifies_mac(&self) -> bool {
        self.mac.is_some()
    }

    /// Feed fetched bytes; returns plaintext inside the requested window.
    pub fn update(&mut self, chunk: &[u8]) -> MediaResult<Vec<u8>> {
        self.carry.extend_from_slice(chunk);

        if self.cipher.is_none() {
            if self.carry.len() < AES_BLOCK_SIZE {
                return Ok(Vec::new());
            }
            let iv: Vec<u8> = self.carry.drain(..AES_BLOCK_SIZE).collect();
            let cipher = Aes256CbcDec::new_from_slices(&self.cipher_key, &iv)
                .map_err(|e| MediaError::KeyDerivation(format!("invalid cipher key: {e}")))?;
            self.cipher = Some(cipher);
        }

        // the MAC trailer never enters the cipher
        let trailer = if self.mac.is_some() { MAC_SIZE } else { 0 };
        let available = self.carry.len().saturating_sub(trailer);
        let whole = available / AES_BLOCK_SIZE * AES_BLOCK_SIZE;
        if whole == 0 {
            return Ok(Vec::new());
        }

        let mut blocks: Vec<u8> = self.carry.drain(..whole).collect();
        if let Some(mac) = self.mac.as_mut() {
            mac.update(&blocks);
        }
        if let Some(cipher) = self.cipher.as_mut() {
            for block in blocks.chunks_exact_mut(AES_BLOCK_SIZE) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
        }

        let released = self.release(blocks);
        Ok(self.window.trim(&released).to_vec())
    }

    /// Verify the MAC (full downloads), strip padding, and flush the held block.
    pub fn finish(mut self) -> MediaResult<Vec<u8>> {
        if let Some(mac) = self.mac.take() {
            if self.carry.len() != MAC_SIZE {
                return Err(MediaError::Integrity(format!(
                    "ciphertext not block aligned ({} trailing bytes)",
                    self.carry.len()
                )));
            }
            if mac.verify_truncated_left(&self.carry).is_err() {
                tracing::warn!("media MAC mismatch");
                return Err(MediaError::Integrity("media MAC mismatch".into()));
            }
        }

        if !self.unpad {
            return Ok(Vec::new());
        }

        let mut last = self
            .held
            .take()
            .ok_or_else(|| MediaError::Integrity("ciphertext not block aligned".into()))?;
        let pad = last.last().copied().unwrap_or(0) as usize;
        if pad == 0
            || pad > AES_BLOCK_SIZE
            || !last[AES_BLOCK_SIZE - pad..].iter().all(|&b| b as usize == pad)
        {
            last.zeroize();
            return Err(MediaError::Integrity("bad PKCS7 padding".into()));
        }
        last.truncate(AES_BLOCK_SIZE - pad);
        let out = self.window.trim(&last).to_vec();
        last.zeroize();
        Ok(out)
    }

    fn release(&mut self, blocks: Vec<u8>) -> Vec<u8> {
        if !self.unpad {
            return blocks;
        }
        let mut plain = self.held.take().unwrap_or_default();
        plain.extend_from_slice(&blocks);
        let keep = plain.split_off(plain.len() - AES_BLOCK_SIZE);
        self.held = Some(keep);
        plain
    }
}

impl Drop for MediaDecryptor {
    fn drop(&mut self) {
        self.cipher_key.zeroize();
        self.carry.zeroize();
        if let Some(held) = self.held.as_mut() {
            held.zeroize();
        }
    }
}

/// Encrypt a whole buffer. Returns the stored payload (ciphertext ‖ mac).
pub fn encrypt_media(keys: &MediaKeySet, plaintext: &[u8]) -> MediaResult<(Vec<u8>, MediaDigests)> {
    let mut enc = MediaEncryptor::new(keys)?;
    let mut payload = enc.update(plaintext);
    let (tail, digests) = enc.finalize();
    payload.extend_from_slice(&tail);
    Ok((payload, digests))
}

/// Decrypt `range` out of a complete stored payload, fetching from it the
/// way a content host would serve the planned `Range` request.
pub fn decrypt_media(
    keys: &MediaKeySet,
    payload: &[u8],
    range: DownloadRange,
    verify_mac: bool,
) -> MediaResult<Vec<u8>> {
    let plan = FetchPlan::new(range);
    let len = payload.len() as u64;
    let mut dec = MediaDecryptor::new(keys, &plan, verify_mac)?;

    let from = plan.start_chunk.min(len);
    let to = plan.end_chunk.map_or(len, |e| e.min(len)).max(from);
    let (from, to) = (from as usize, to as usize);
    let mut out = dec.update(&payload[from..to])?;
    out.extend_from_slice(&dec.finish()?);
    Ok(out)
}
