use crate::proto::media_retry_notification::ResultType;

/// Status a device reported for a retry, mapped from its numeric code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStatus {
    Success,
    DecryptionError,
    NotFound,
    GeneralError,
    /// Code outside the table, kept verbatim
    Unmapped(String),
}

impl RetryStatus {
    /// HTTP-style code, `None` for unmapped codes.
    pub fn code(&self) -> Option<u16> {
        match self {
            RetryStatus::Success => Some(200),
            RetryStatus::DecryptionError => Some(412),
            RetryStatus::NotFound => Some(404),
            RetryStatus::GeneralError => Some(418),
            RetryStatus::Unmapped(_) => None,
        }
    }
}

/// Map a device error code. Total: anything unrecognised, including
/// non-numeric input, becomes [`RetryStatus::Unmapped`].
pub fn status_for_media_retry(code: &str) -> RetryStatus {
    let parsed = code
        .trim()
        .parse::<i32>()
        .ok()
        .and_then(|n| ResultType::try_from(n).ok());
    match parsed {
        Some(ResultType::Success) => RetryStatus::Success,
        Some(ResultType::DecryptionError) => RetryStatus::DecryptionError,
        Some(ResultType::NotFound) => RetryStatus::NotFound,
        Some(ResultType::GeneralError) => RetryStatus::GeneralError,
        None => RetryStatus::Unmapped(code.to_string()),
    }
}
