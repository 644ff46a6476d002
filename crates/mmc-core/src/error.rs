use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    /// Absent or empty media key
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// Content-length ceiling exceeded, every upload host failed, or no usable URL
    #[error("transport error: {0}")]
    Transport(String),

    /// Source or sink closed, or I/O failed mid-operation
    #[error("stream error: {0}")]
    Stream(String),

    /// Bad block alignment, bad padding, MAC mismatch, or AEAD authentication failure
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Download range with start past end
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Retry response (or other protocol node) missing required fields
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Device reported a media-retry code outside the status table
    #[error("unmapped media retry code: {0}")]
    UnmappedRetryCode(String),

    /// Device refused to re-upload the media
    #[error("media re-upload rejected ({status}): {reason}")]
    RetryRejected { status: u16, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MediaError {
    /// Wrap an I/O failure that happened while a stream was being pumped.
    pub fn stream(context: &str, err: impl std::fmt::Display) -> Self {
        MediaError::Stream(format!("{context}: {err}"))
    }

    /// HTTP-style status a caller can surface for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            MediaError::KeyDerivation(_) => 400,
            MediaError::Transport(_) => 500,
            MediaError::Stream(_) => 500,
            MediaError::Integrity(_) => 422,
            MediaError::InvalidRange(_) => 416,
            MediaError::Protocol(_) => 404,
            MediaError::UnmappedRetryCode(_) => 500,
            MediaError::RetryRejected { status, .. } => *status,
            MediaError::Config(_) => 500,
            MediaError::Io(_) => 500,
            MediaError::Other(_) => 500,
        }
    }
}
