//! In-memory content host implementing [`MediaHttp`].
//!
//! Serves stored objects (honouring `Range: bytes=a-` and `bytes=a-b`,
//! inclusive), accepts uploads, and can be scripted per host to reject or
//! fail, so the pipelines can be exercised without a network.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use mmc_core::{MediaError, MediaResult};

use crate::http::{ByteStream, Headers, MediaHttp, UploadResponse};

/// How a host answers an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostBehavior {
    /// Store the body and return its URL and direct path
    Accept,
    /// Answer 200 with neither URL nor direct path
    Reject,
    /// Connection-level failure
    Fail,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Headers,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn host(&self) -> &str {
        let rest = self.url.split_once("://").map_or(self.url.as_str(), |(_, r)| r);
        rest.split(['/', '?']).next().unwrap_or_default()
    }
}

#[derive(Default)]
struct State {
    objects: HashMap<String, Bytes>,
    hosts: HashMap<String, HostBehavior>,
    requests: Vec<RecordedRequest>,
}

pub struct MemoryCdn {
    state: Mutex<State>,
    chunk_size: usize,
}

impl Default for MemoryCdn {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCdn {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            chunk_size: 4096,
        }
    }

    /// Serve bodies in pieces of `size` bytes.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put(&self, url: &str, data: impl Into<Bytes>) {
        self.lock().objects.insert(url.to_string(), data.into());
    }

    pub fn object(&self, url: &str) -> Option<Bytes> {
        self.lock().objects.get(url).cloned()
    }

    pub fn set_host(&self, hostname: &str, behavior: HostBehavior) {
        self.lock().hosts.insert(hostname.to_string(), behavior);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }
}

/// Parse `bytes=a-` or `bytes=a-b` (inclusive) into a slice range of `len`.
fn parse_range(value: &str, len: usize) -> MediaResult<std::ops::Range<usize>> {
    let spec = value
        .strip_prefix("bytes=")
        .ok_or_else(|| MediaError::Transport(format!("unsupported range {value}")))?;
    let (start, end) = spec
        .split_once('-')
        .ok_or_else(|| MediaError::Transport(format!("unsupported range {value}")))?;
    let start: usize = start
        .parse()
        .map_err(|_| MediaError::Transport(format!("unsupported range {value}")))?;
    let end = if end.is_empty() {
        len
    } else {
        let last: usize = end
            .parse()
            .map_err(|_| MediaError::Transport(format!("unsupported range {value}")))?;
        (last + 1).min(len)
    };
    if start >= len {
        return Err(MediaError::Transport("416 range not satisfiable".into()));
    }
    Ok(start..end)
}

#[async_trait]
impl MediaHttp for MemoryCdn {
    async fn post_file(
        &self,
        url: &str,
        path: &Path,
        headers: &Headers,
        _timeout: Duration,
    ) -> MediaResult<UploadResponse> {
        let request = RecordedRequest {
            method: "POST",
            url: url.to_string(),
            headers: headers.clone(),
        };
        let host = request.host().to_string();
        self.lock().requests.push(request);
        let behavior = self
            .lock()
            .hosts
            .get(&host)
            .copied()
            .unwrap_or(HostBehavior::Accept);

        match behavior {
            HostBehavior::Fail => Err(MediaError::Transport(format!("connection to {host} refused"))),
            HostBehavior::Reject => Ok(UploadResponse::default()),
            HostBehavior::Accept => {
                let body = tokio::fs::read(path).await?;
                let direct_path = url
                    .split_once(&host)
                    .map(|(_, rest)| rest)
                    .unwrap_or_default()
                    .split('?')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let stored_at = format!("https://{host}{direct_path}");
                self.put(&stored_at, body);
                Ok(UploadResponse {
                    url: Some(stored_at),
                    direct_path: Some(direct_path),
                })
            }
        }
    }

    async fn get(
        &self,
        url: &str,
        headers: &Headers,
        _timeout: Option<Duration>,
    ) -> MediaResult<ByteStream> {
        self.lock().requests.push(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            headers: headers.clone(),
        });
        let object = self
            .object(url)
            .ok_or_else(|| MediaError::Transport(format!("download failed: 404 {url}")))?;

        let range = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("range"))
            .map(|(_, v)| parse_range(v, object.len()))
            .transpose()?
            .unwrap_or(0..object.len());
        let body = object.slice(range);

        let pieces: Vec<MediaResult<Bytes>> = (0..body.len())
            .step_by(self.chunk_size)
            .map(|at| Ok(body.slice(at..(at + self.chunk_size).min(body.len()))))
            .collect();
        Ok(stream::iter(pieces).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range("bytes=10-", 100).unwrap(), 10..100);
        assert_eq!(parse_range("bytes=0-15", 100).unwrap(), 0..16);
        assert_eq!(parse_range("bytes=90-200", 100).unwrap(), 90..100);
        assert!(parse_range("bytes=100-", 100).is_err());
        assert!(parse_range("items=0-1", 100).is_err());
    }

    #[test]
    fn request_host() {
        let req = RecordedRequest {
            method: "POST",
            url: "https://up.example.net/mms/image/x?auth=a".into(),
            headers: Vec::new(),
        };
        assert_eq!(req.host(), "up.example.net");
    }
}
