//! AES-256-GCM for media-retry payloads.
//!
//! Wire form is split: the ciphertext (with the 16-byte tag appended) and the
//! 12-byte nonce travel in separate protocol-node children.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use mmc_core::{MediaError, MediaResult};
use rand::RngCore;

use crate::keys::RetryKey;
use crate::GCM_NONCE_SIZE;

/// Encrypt `plaintext` under a random nonce. Returns `(ciphertext, nonce)`.
pub fn aead_encrypt(
    key: &RetryKey,
    plaintext: &[u8],
    aad: &[u8],
) -> MediaResult<(Vec<u8>, [u8; GCM_NONCE_SIZE])> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| MediaError::KeyDerivation(format!("invalid retry key: {e}")))?;

    let mut nonce = [0u8; GCM_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| MediaError::Integrity(format!("AES-GCM encryption failed: {e}")))?;

    Ok((ciphertext, nonce))
}

/// Decrypt and authenticate. Any tampering with ciphertext, nonce, or AAD
/// yields `MediaError::Integrity`.
pub fn aead_decrypt(
    key: &RetryKey,
    ciphertext: &[u8],
    nonce: &[u8],
    aad: &[u8],
) -> MediaResult<Vec<u8>> {
    if nonce.len() != GCM_NONCE_SIZE {
        return Err(MediaError::Integrity(format!(
            "nonce is {} bytes (expected {GCM_NONCE_SIZE})",
            nonce.len()
        )));
    }
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| MediaError::KeyDerivation(format!("invalid retry key: {e}")))?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| {
            MediaError::Integrity("AES-GCM decryption failed: wrong key or corrupted data".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{derive_retry_key, MediaKey};

    fn retry_key(seed: u8) -> RetryKey {
        derive_retry_key(&MediaKey::from_bytes(&[seed; 32]).unwrap()).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let key = retry_key(1);
        let (ct, nonce) = aead_encrypt(&key, b"receipt body", b"ABC123").unwrap();
        assert_eq!(ct.len(), b"receipt body".len() + 16);

        let pt = aead_decrypt(&key, &ct, &nonce, b"ABC123").unwrap();
        assert_eq!(pt, b"receipt body");
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = retry_key(1);
        let (_, n1) = aead_encrypt(&key, b"x", b"").unwrap();
        let (_, n2) = aead_encrypt(&key, b"x", b"").unwrap();
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = retry_key(1);
        let (ct, nonce) = aead_encrypt(&key, b"payload", b"ABC123").unwrap();
        let err = aead_decrypt(&key, &ct, &nonce, b"ABC124").unwrap_err();
        assert!(matches!(err, MediaError::Integrity(_)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let (ct, nonce) = aead_encrypt(&retry_key(1), b"payload", b"id").unwrap();
        assert!(aead_decrypt(&retry_key(2), &ct, &nonce, b"id").is_err());
    }

    #[test]
    fn test_bad_nonce_length() {
        let key = retry_key(1);
        let (ct, _) = aead_encrypt(&key, b"payload", b"id").unwrap();
        let err = aead_decrypt(&key, &ct, &[0u8; 8], b"id").unwrap_err();
        assert!(matches!(err, MediaError::Integrity(_)));
    }
}
