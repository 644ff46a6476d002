//! Integration test: a retry request built on one side opens on the other.

use mmc_core::{BinaryNode, MediaError, MessageKey, NodeContent};
use mmc_crypto::MediaKey;
use mmc_retry::{
    decode_media_retry_node, decrypt_media_retry_data, encrypt_media_retry_request, RetryOutcome,
    RetryStatus,
};

fn message_key() -> MessageKey {
    MessageKey {
        id: "ABC123".into(),
        remote_jid: "5511999@s.whatsapp.net".into(),
        from_me: false,
        participant: None,
    }
}

fn payload(outcome: RetryOutcome) -> mmc_retry::EncryptedRetryMedia {
    match outcome {
        RetryOutcome::Media(media) => media,
        RetryOutcome::Failed(f) => panic!("expected media, got {f:?}"),
    }
}

#[test]
fn request_decodes_and_decrypts_back_to_stanza_id() {
    let media_key = MediaKey::generate();
    let node = encrypt_media_retry_request(&message_key(), &media_key, "self@id").unwrap();

    let update = decode_media_retry_node(&node).unwrap();
    assert_eq!(update.key, message_key());

    let media = payload(update.outcome);
    let notification = decrypt_media_retry_data(&media, &media_key, "ABC123").unwrap();
    assert_eq!(notification.stanza_id(), "ABC123");
}

#[test]
fn tampered_ciphertext_is_rejected() {
    let media_key = MediaKey::generate();
    let node = encrypt_media_retry_request(&message_key(), &media_key, "self@id").unwrap();
    let mut media = payload(decode_media_retry_node(&node).unwrap().outcome);

    media.ciphertext[0] ^= 0x01;
    let err = decrypt_media_retry_data(&media, &media_key, "ABC123").unwrap_err();
    assert!(matches!(err, MediaError::Integrity(_)));
}

#[test]
fn wrong_stanza_or_key_is_rejected() {
    let media_key = MediaKey::generate();
    let node = encrypt_media_retry_request(&message_key(), &media_key, "self@id").unwrap();
    let media = payload(decode_media_retry_node(&node).unwrap().outcome);

    assert!(matches!(
        decrypt_media_retry_data(&media, &media_key, "OTHER"),
        Err(MediaError::Integrity(_))
    ));
    assert!(matches!(
        decrypt_media_retry_data(&media, &MediaKey::generate(), "ABC123"),
        Err(MediaError::Integrity(_))
    ));
}

#[test]
fn undecodable_plaintext_is_protocol_error() {
    // a valid AEAD envelope around bytes that are not a protobuf message
    let media_key = MediaKey::generate();
    let retry_key = mmc_crypto::derive_retry_key(&media_key).unwrap();
    let (ciphertext, nonce) = mmc_crypto::aead_encrypt(&retry_key, &[0xFF, 0xFF, 0xFF], b"ABC123").unwrap();
    let media = mmc_retry::EncryptedRetryMedia {
        ciphertext,
        nonce: nonce.to_vec(),
    };
    assert!(matches!(
        decrypt_media_retry_data(&media, &media_key, "ABC123"),
        Err(MediaError::Protocol(_))
    ));
}

#[test]
fn device_error_codes() {
    for (code, expected) in [
        ("1", RetryStatus::Success),
        ("2", RetryStatus::NotFound),
        ("3", RetryStatus::DecryptionError),
        ("0", RetryStatus::GeneralError),
        ("12", RetryStatus::Unmapped("12".into())),
    ] {
        let node = BinaryNode::new("receipt").attr("id", "ABC123").children(vec![
            BinaryNode::new("rmr").attr("jid", "5511999@s.whatsapp.net"),
            BinaryNode::new("error").attr("code", code),
        ]);
        let update = decode_media_retry_node(&node).unwrap();
        let RetryOutcome::Failed(failure) = update.outcome else {
            panic!("code {code} should fail");
        };
        assert_eq!(failure.status, expected);
        assert_eq!(failure.reason, format!("failed to re-upload media ({code})"));
    }
}

#[test]
fn failure_conversions() {
    let node = |code: &str| {
        BinaryNode::new("receipt").attr("id", "X").children(vec![
            BinaryNode::new("rmr"),
            BinaryNode::new("error").attr("code", code),
        ])
    };
    let err = |code: &str| match decode_media_retry_node(&node(code)).unwrap().outcome {
        RetryOutcome::Failed(f) => f.into_error(),
        RetryOutcome::Media(_) => panic!("expected failure"),
    };

    assert!(matches!(err("2"), MediaError::RetryRejected { status: 404, .. }));
    assert!(matches!(err("0"), MediaError::RetryRejected { status: 418, .. }));
    assert!(matches!(err("1"), MediaError::Protocol(_)));
    assert!(matches!(err("abc"), MediaError::UnmappedRetryCode(_)));
}

#[test]
fn empty_encrypt_node_reports_not_found() {
    let node = BinaryNode::new("receipt").attr("id", "X").children(vec![
        BinaryNode {
            tag: "encrypt".into(),
            content: NodeContent::Empty,
            ..Default::default()
        },
        BinaryNode::new("rmr").attr("jid", "a@s.whatsapp.net"),
    ]);
    let RetryOutcome::Failed(failure) = decode_media_retry_node(&node).unwrap().outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.status, RetryStatus::NotFound);
    assert_eq!(failure.status.code(), Some(404));
}
