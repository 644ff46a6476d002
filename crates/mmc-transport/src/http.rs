//! HTTP seam between the media pipelines and the content host.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use mmc_core::{MediaError, MediaResult};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

/// Pull-driven body of a download or source.
pub type ByteStream = BoxStream<'static, MediaResult<Bytes>>;

/// Request headers as `(name, value)` pairs.
pub type Headers = Vec<(&'static str, String)>;

/// JSON body returned by the content host after an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "directPath")]
    pub direct_path: Option<String>,
}

impl UploadResponse {
    pub fn is_accepted(&self) -> bool {
        self.url.is_some() || self.direct_path.is_some()
    }
}

#[async_trait]
pub trait MediaHttp: Send + Sync {
    /// POST the file at `path` as the request body and decode the JSON reply.
    async fn post_file(
        &self,
        url: &str,
        path: &Path,
        headers: &Headers,
        timeout: Duration,
    ) -> MediaResult<UploadResponse>;

    /// GET `url` and stream the body.
    async fn get(&self, url: &str, headers: &Headers, timeout: Option<Duration>)
        -> MediaResult<ByteStream>;
}

/// `reqwest` backend (rustls). Uploads never follow redirects.
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
    upload_client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new() -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MediaError::Transport(format!("building HTTP client: {e}")))?;
        let upload_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| MediaError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            upload_client,
        })
    }
}

fn apply_headers(mut builder: reqwest::RequestBuilder, headers: &Headers) -> reqwest::RequestBuilder {
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    builder
}

#[async_trait]
impl MediaHttp for ReqwestHttp {
    async fn post_file(
        &self,
        url: &str,
        path: &Path,
        headers: &Headers,
        timeout: Duration,
    ) -> MediaResult<UploadResponse> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| MediaError::stream(&format!("opening {}", path.display()), e))?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let resp = apply_headers(self.upload_client.post(url), headers)
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| MediaError::Transport(format!("upload request failed: {e}")))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| MediaError::Transport(format!("reading upload response: {e}")))?;
        if !status.is_success() {
            return Err(MediaError::Transport(format!(
                "upload failed: {status} {}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| MediaError::Transport(format!("decoding upload response: {e}")))
    }

    async fn get(
        &self,
        url: &str,
        headers: &Headers,
        timeout: Option<Duration>,
    ) -> MediaResult<ByteStream> {
        let mut builder = apply_headers(self.client.get(url), headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| MediaError::Transport(format!("download request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MediaError::Transport(format!("download failed: {status}")));
        }
        Ok(resp
            .bytes_stream()
            .map_err(|e| MediaError::stream("reading response body", e))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_response_accepts_both_spellings() {
        let snake: UploadResponse =
            serde_json::from_str(r#"{"url":"https://h/x","direct_path":"/v/t62/x"}"#).unwrap();
        let camel: UploadResponse = serde_json::from_str(r#"{"directPath":"/v/t62/x"}"#).unwrap();

        assert_eq!(snake.direct_path.as_deref(), Some("/v/t62/x"));
        assert_eq!(camel.direct_path.as_deref(), Some("/v/t62/x"));
        assert!(camel.is_accepted());
    }

    #[test]
    fn upload_response_without_links_is_rejected() {
        let resp: UploadResponse = serde_json::from_str(r#"{"error":"bad auth"}"#).unwrap();
        assert!(!resp.is_accepted());
    }

    #[test]
    fn reqwest_backend_builds() {
        assert!(ReqwestHttp::new().is_ok());
    }
}
