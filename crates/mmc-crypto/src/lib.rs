//! mmc-crypto: end-to-end media encryption for mmcrypt
//!
//! Upload pipeline: plaintext → AES-256-CBC (PKCS7) → HMAC-SHA256 over iv‖ciphertext
//! → payload = ciphertext ‖ mac[..10]
//!
//! Key hierarchy:
//! ```text
//! Media Key (256-bit random, shipped to the recipient inside the message)
//!   ├── Media Key Set (HKDF-SHA256, info="WhatsApp {label} Keys", 112 bytes)
//!   │   ├── iv         [0..16]
//!   │   ├── cipher key [16..48]
//!   │   └── mac key    [48..80]
//!   └── Retry Key (HKDF-SHA256, info="WhatsApp Media Retry Notification", AES-256-GCM)
//! ```

pub mod aead;
pub mod keys;
pub mod range;
pub mod stream;

pub use aead::{aead_decrypt, aead_encrypt};
pub use keys::{derive_media_keys, derive_retry_key, hkdf_info, MediaKey, MediaKeySet, RetryKey};
pub use range::{DownloadRange, FetchPlan, RangeWindow};
pub use stream::{decrypt_media, encrypt_media, MediaDecryptor, MediaDigests, MediaEncryptor};

/// Size of a media key in bytes (256-bit)
pub const MEDIA_KEY_SIZE: usize = 32;

/// Length of the HKDF expansion for a media key set
pub const EXPANDED_KEY_SIZE: usize = 112;

/// AES block size; also the CBC IV size
pub const AES_BLOCK_SIZE: usize = 16;

/// Length of the truncated HMAC appended to every encrypted payload
pub const MAC_SIZE: usize = 10;

/// Size of an AES-GCM nonce (96-bit)
pub const GCM_NONCE_SIZE: usize = 12;
