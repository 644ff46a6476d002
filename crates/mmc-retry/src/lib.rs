//! mmc-retry: ask the sender to re-host media whose link has expired
//!
//! Exchange:
//! ```text
//! client → device: receipt{type=server-error}
//!                    ├── encrypt{enc_p = GCM(retry key, ServerErrorReceipt, aad = stanza id), enc_iv}
//!                    └── rmr{jid, from_me, participant?}
//! device → client: same shape, or an `error{code}` child
//!                  enc_p decrypts to a MediaRetryNotification carrying the new direct path
//! ```

pub mod proto;
pub mod retry;
pub mod status;

pub use proto::{media_retry_notification::ResultType, MediaRetryNotification, ServerErrorReceipt};
pub use retry::{
    decode_media_retry_node, decrypt_media_retry_data, encrypt_media_retry_request, EncryptedRetryMedia,
    MediaRetryUpdate, RetryFailure, RetryOutcome,
};
pub use status::{status_for_media_retry, RetryStatus};
