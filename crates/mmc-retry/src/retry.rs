//! Build retry requests, decode device responses, and open their payloads.

use std::collections::BTreeMap;

use mmc_core::jid::normalize_jid;
use mmc_core::{BinaryNode, MediaError, MediaResult, MessageKey};
use mmc_crypto::{aead_decrypt, aead_encrypt, derive_retry_key, MediaKey};
use prost::Message;
use tracing::{debug, warn};

use crate::proto::{MediaRetryNotification, ServerErrorReceipt};
use crate::status::{status_for_media_retry, RetryStatus};

/// Ciphertext and nonce lifted from an `encrypt` child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRetryMedia {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Device refused or failed the re-upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub status: RetryStatus,
    pub reason: String,
    /// Attributes of the `error` child, if any
    pub attrs: BTreeMap<String, String>,
}

impl RetryFailure {
    pub fn into_error(self) -> MediaError {
        match self.status {
            RetryStatus::Unmapped(code) => MediaError::UnmappedRetryCode(code),
            RetryStatus::Success => MediaError::Protocol(format!(
                "error node reported success: {}",
                self.reason
            )),
            status => MediaError::RetryRejected {
                status: status.code().unwrap_or(500),
                reason: self.reason,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Media(EncryptedRetryMedia),
    Failed(RetryFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRetryUpdate {
    pub key: MessageKey,
    pub outcome: RetryOutcome,
}

/// Build the `receipt` node asking the sender to re-upload the media of `key`.
pub fn encrypt_media_retry_request(
    key: &MessageKey,
    media_key: &MediaKey,
    self_id: &str,
) -> MediaResult<BinaryNode> {
    let receipt = ServerErrorReceipt {
        stanza_id: Some(key.id.clone()),
    };
    let retry_key = derive_retry_key(media_key)?;
    let (ciphertext, nonce) = aead_encrypt(&retry_key, &receipt.encode_to_vec(), key.id.as_bytes())?;

    let mut rmr = BinaryNode::new("rmr")
        .attr("jid", key.remote_jid.as_str())
        .attr("from_me", if key.from_me { "true" } else { "false" });
    if let Some(participant) = &key.participant {
        rmr = rmr.attr("participant", participant.as_str());
    }

    debug!(stanza_id = %key.id, "built media retry request");

    Ok(BinaryNode::new("receipt")
        .attr("id", key.id.as_str())
        .attr("to", normalize_jid(self_id))
        .attr("type", "server-error")
        .children(vec![
            BinaryNode::new("encrypt").children(vec![
                BinaryNode::new("enc_p").bytes(ciphertext),
                BinaryNode::new("enc_iv").bytes(nonce.to_vec()),
            ]),
            rmr,
        ]))
}

/// Interpret a retry response node. Device-reported failures come back as
/// [`RetryOutcome::Failed`], not as errors.
pub fn decode_media_retry_node(node: &BinaryNode) -> MediaResult<MediaRetryUpdate> {
    let rmr = node
        .child("rmr")
        .ok_or_else(|| MediaError::Protocol("media retry response has no rmr node".into()))?;

    let key = MessageKey {
        id: node.get_attr("id").unwrap_or_default().to_string(),
        remote_jid: rmr.get_attr("jid").unwrap_or_default().to_string(),
        from_me: rmr.get_attr("from_me") == Some("true"),
        participant: rmr.get_attr("participant").map(str::to_owned),
    };

    if let Some(error) = node.child("error") {
        let code = error.get_attr("code").unwrap_or_default();
        let status = status_for_media_retry(code);
        if let RetryStatus::Unmapped(raw) = &status {
            warn!(code = %raw, stanza_id = %key.id, "unmapped media retry code");
        }
        return Ok(MediaRetryUpdate {
            key,
            outcome: RetryOutcome::Failed(RetryFailure {
                status,
                reason: format!("failed to re-upload media ({code})"),
                attrs: error.attrs.clone(),
            }),
        });
    }

    let encrypt = node.child("encrypt");
    let ciphertext = encrypt.and_then(|e| e.child_bytes("enc_p"));
    let nonce = encrypt.and_then(|e| e.child_bytes("enc_iv"));

    let outcome = match (ciphertext, nonce) {
        (Some(ciphertext), Some(nonce)) => RetryOutcome::Media(EncryptedRetryMedia {
            ciphertext: ciphertext.to_vec(),
            nonce: nonce.to_vec(),
        }),
        _ => RetryOutcome::Failed(RetryFailure {
            status: RetryStatus::NotFound,
            reason: "missing ciphertext".into(),
            attrs: BTreeMap::new(),
        }),
    };
    Ok(MediaRetryUpdate { key, outcome })
}

/// Open the payload of a successful retry response.
pub fn decrypt_media_retry_data(
    media: &EncryptedRetryMedia,
    media_key: &MediaKey,
    stanza_id: &str,
) -> MediaResult<MediaRetryNotification> {
    let retry_key = derive_retry_key(media_key)?;
    let plaintext = aead_decrypt(&retry_key, &media.ciphertext, &media.nonce, stanza_id.as_bytes())?;
    MediaRetryNotification::decode(plaintext.as_slice())
        .map_err(|e| MediaError::Protocol(format!("invalid media retry notification: {e}")))
}
