//! mmc-transport: moving encrypted media between disk and the content host
//!
//! - [`encrypt`]: source → staged `{type}{id}-enc` file + digests
//! - [`upload`]: staged file → first content host that accepts it
//! - [`download`]: URL / direct path → plaintext stream, optionally ranged

pub mod download;
pub mod encrypt;
pub mod http;
pub mod source;
pub mod temp;
pub mod upload;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use download::{
    collect, download_content_from_message, download_encrypted_content, url_from_direct_path,
    DownloadOptions, DEFAULT_HOST,
};
pub use encrypt::{
    encrypted_stream, raw_media_upload_data, EncryptOptions, EncryptedMediaArtifact, RawMediaUpload,
};
pub use http::{ByteStream, MediaHttp, ReqwestHttp, UploadResponse};
pub use source::MediaSource;
pub use temp::{IdGenerator, SequentialIds, TempStore, UuidIds};
pub use upload::{MediaUploader, UploadHost, UploadInfo, UploadInfoProvider, UploadRequest, UploadedMedia};
