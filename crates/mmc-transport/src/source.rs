//! Where outgoing media comes from.

use std::path::PathBuf;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use mmc_core::{MediaError, MediaResult};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::http::{ByteStream, MediaHttp};

/// Read size for file sources.
pub const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// A media payload to encrypt or stage, in one of its accepted shapes.
pub enum MediaSource {
    Buffer(Bytes),
    Stream(ByteStream),
    /// `data:` URL, `http(s)` URL, or a local path
    Url(String),
    File(PathBuf),
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaSource::Buffer(b) => f.debug_tuple("Buffer").field(&b.len()).finish(),
            MediaSource::Stream(_) => f.write_str("Stream"),
            MediaSource::Url(u) if u.starts_with("data:") => f.write_str("Url(data:…)"),
            MediaSource::Url(u) => f.debug_tuple("Url").field(u).finish(),
            MediaSource::File(p) => f.debug_tuple("File").field(p).finish(),
        }
    }
}

impl From<Vec<u8>> for MediaSource {
    fn from(data: Vec<u8>) -> Self {
        MediaSource::Buffer(Bytes::from(data))
    }
}

impl From<Bytes> for MediaSource {
    fn from(data: Bytes) -> Self {
        MediaSource::Buffer(data)
    }
}

impl From<PathBuf> for MediaSource {
    fn from(path: PathBuf) -> Self {
        MediaSource::File(path)
    }
}

/// An opened source. `remote` is set when bytes arrive over the network,
/// which makes them subject to the content-length ceiling.
pub struct OpenedSource {
    pub stream: ByteStream,
    pub remote: bool,
}

impl MediaSource {
    pub async fn open(
        self,
        http: &dyn MediaHttp,
        origin: &str,
        timeout: Option<Duration>,
    ) -> MediaResult<OpenedSource> {
        match self {
            MediaSource::Buffer(data) => Ok(local(stream::iter([Ok(data)]).boxed())),
            MediaSource::Stream(stream) => Ok(local(stream)),
            MediaSource::File(path) => open_file(path).await.map(local),
            MediaSource::Url(url) => {
                if let Some(rest) = url.strip_prefix("data:") {
                    let encoded = rest.split_once(',').map(|(_, d)| d).unwrap_or_default();
                    let data = STANDARD
                        .decode(encoded)
                        .map_err(|e| MediaError::stream("decoding data URL", e))?;
                    Ok(local(stream::iter([Ok(Bytes::from(data))]).boxed()))
                } else if url.starts_with("http://") || url.starts_with("https://") {
                    debug!(url = %url, "fetching remote media source");
                    let headers = vec![("Origin", origin.to_string())];
                    let stream = http.get(&url, &headers, timeout).await?;
                    Ok(OpenedSource {
                        stream,
                        remote: true,
                    })
                } else {
                    let path = url.strip_prefix("file://").unwrap_or(&url);
                    open_file(PathBuf::from(path)).await.map(local)
                }
            }
        }
    }
}

fn local(stream: ByteStream) -> OpenedSource {
    OpenedSource {
        stream,
        remote: false,
    }
}

async fn open_file(path: PathBuf) -> MediaResult<ByteStream> {
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| MediaError::stream(&format!("opening {}", path.display()), e))?;
    Ok(ReaderStream::with_capacity(file, FILE_CHUNK_SIZE)
        .map_err(|e| MediaError::stream("reading source file", e))
        .boxed())
}
