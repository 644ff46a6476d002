//! Protobuf messages of the retry exchange.

/// Encrypted into `enc_p` of a retry request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerErrorReceipt {
    #[prost(string, optional, tag = "1")]
    pub stanza_id: Option<String>,
}

/// Decrypted from `enc_p` of a retry response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MediaRetryNotification {
    #[prost(string, optional, tag = "1")]
    pub stanza_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub direct_path: Option<String>,
    #[prost(enumeration = "media_retry_notification::ResultType", optional, tag = "3")]
    pub result: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub message_secret: Option<Vec<u8>>,
}

pub mod media_retry_notification {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ResultType {
        GeneralError = 0,
        Success = 1,
        NotFound = 2,
        DecryptionError = 3,
    }
}

impl MediaRetryNotification {
    /// Download URL for the re-hosted media on `default_host`, when the
    /// device succeeded.
    pub fn refreshed_url(&self, default_host: &str) -> Option<String> {
        if self.result() != media_retry_notification::ResultType::Success {
            return None;
        }
        self.direct_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|path| format!("https://{default_host}{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::media_retry_notification::ResultType;
    use super::*;
    use prost::Message;

    #[test]
    fn receipt_and_notification_share_stanza_tag() {
        let receipt = ServerErrorReceipt {
            stanza_id: Some("ABC123".into()),
        };
        let as_notification = MediaRetryNotification::decode(receipt.encode_to_vec().as_slice()).unwrap();
        assert_eq!(as_notification.stanza_id(), "ABC123");
        assert_eq!(as_notification.result(), ResultType::GeneralError);
    }

    #[test]
    fn refreshed_url_only_on_success() {
        let mut n = MediaRetryNotification {
            stanza_id: Some("ABC123".into()),
            direct_path: Some("/v/t62.7118-24/new".into()),
            result: Some(ResultType::Success as i32),
            message_secret: None,
        };
        assert_eq!(
            n.refreshed_url("mmg.whatsapp.net").as_deref(),
            Some("https://mmg.whatsapp.net/v/t62.7118-24/new")
        );

        n.result = Some(ResultType::NotFound as i32);
        assert_eq!(n.refreshed_url("mmg.whatsapp.net"), None);
    }

    #[test]
    fn unknown_result_reads_as_default() {
        let n = MediaRetryNotification {
            result: Some(42),
            ..Default::default()
        };
        assert_eq!(n.result(), ResultType::GeneralError);
    }
}
