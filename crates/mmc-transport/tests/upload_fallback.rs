//! Integration test: host fallback during upload, against the in-memory CDN.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mmc_core::config::TransportConfig;
use mmc_core::{MediaError, MediaResult, MediaType};
use mmc_transport::testing::{HostBehavior, MemoryCdn};
use mmc_transport::{
    encrypted_stream, EncryptOptions, MediaSource, MediaUploader, SequentialIds, TempStore,
    UploadHost, UploadInfo, UploadInfoProvider, UploadRequest,
};
use secrecy::SecretString;
use tempfile::TempDir;

/// Hands out fixed hosts; each forced refresh bumps the auth generation.
struct CountingProvider {
    hosts: Vec<&'static str>,
    refreshes: AtomicUsize,
}

impl CountingProvider {
    fn new(hosts: Vec<&'static str>) -> Self {
        Self {
            hosts,
            refreshes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UploadInfoProvider for CountingProvider {
    async fn upload_info(&self, force_refresh: bool) -> MediaResult<UploadInfo> {
        let generation = if force_refresh {
            self.refreshes.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.refreshes.load(Ordering::SeqCst)
        };
        Ok(UploadInfo {
            hosts: self.hosts.iter().map(|h| UploadHost::new(*h)).collect(),
            auth: SecretString::from(format!("auth-{generation}")),
        })
    }
}

async fn staged(tmp: &TempDir, cdn: &MemoryCdn) -> mmc_transport::EncryptedMediaArtifact {
    let temp = TempStore::with_ids(tmp.path(), Arc::new(SequentialIds::default()));
    encrypted_stream(
        cdn,
        MediaSource::from(vec![0xC3u8; 3000]),
        MediaType::Image,
        &temp,
        &EncryptOptions::default(),
    )
    .await
    .expect("encrypt")
}

fn request(artifact: &mmc_transport::EncryptedMediaArtifact) -> UploadRequest {
    UploadRequest {
        media_type: MediaType::Image,
        file_enc_sha256: artifact.file_enc_sha256,
        timeout: None,
    }
}

#[tokio::test]
async fn falls_back_to_third_host() {
    let tmp = TempDir::new().unwrap();
    let cdn = Arc::new(MemoryCdn::new());
    cdn.set_host("h1.example.net", HostBehavior::Fail);
    cdn.set_host("h2.example.net", HostBehavior::Fail);
    let provider = Arc::new(CountingProvider::new(vec![
        "h1.example.net",
        "h2.example.net",
        "h3.example.net",
    ]));

    let artifact = staged(&tmp, &cdn).await;
    let uploader = MediaUploader::new(cdn.clone(), provider.clone(), &TransportConfig::default());
    let uploaded = uploader
        .upload(&artifact.enc_path, &request(&artifact))
        .await
        .expect("third host accepts");

    let posts: Vec<_> = cdn.requests().into_iter().filter(|r| r.method == "POST").collect();
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[2].host(), "h3.example.net");
    assert_eq!(posts[0].header("Content-Type"), Some("application/octet-stream"));
    assert_eq!(posts[0].header("Origin"), Some("https://web.whatsapp.com"));

    let url = uploaded.media_url.expect("url");
    assert!(url.starts_with("https://h3.example.net/mms/image/"));
    assert_eq!(
        cdn.object(&url).unwrap().as_ref(),
        std::fs::read(&artifact.enc_path).unwrap().as_slice()
    );
    // transport errors do not refresh auth
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);

    artifact.cleanup().await.unwrap();
}

#[tokio::test]
async fn custom_hosts_come_first() {
    let tmp = TempDir::new().unwrap();
    let cdn = Arc::new(MemoryCdn::new());
    let provider = Arc::new(CountingProvider::new(vec!["h1.example.net"]));
    let cfg = TransportConfig {
        custom_upload_hosts: vec!["edge.example.net".into()],
        ..Default::default()
    };

    let artifact = staged(&tmp, &cdn).await;
    let uploader = MediaUploader::new(cdn.clone(), provider, &cfg);
    uploader
        .upload(&artifact.enc_path, &request(&artifact))
        .await
        .unwrap();

    let posts = cdn.requests();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].host(), "edge.example.net");
}

#[tokio::test]
async fn rejection_refreshes_auth_for_later_hosts() {
    let tmp = TempDir::new().unwrap();
    let cdn = Arc::new(MemoryCdn::new());
    cdn.set_host("h1.example.net", HostBehavior::Reject);
    let provider = Arc::new(CountingProvider::new(vec!["h1.example.net", "h2.example.net"]));

    let artifact = staged(&tmp, &cdn).await;
    let uploader = MediaUploader::new(cdn.clone(), provider.clone(), &TransportConfig::default());
    let uploaded = uploader
        .upload(&artifact.enc_path, &request(&artifact))
        .await
        .unwrap();

    assert!(uploaded.direct_path.unwrap().starts_with("/mms/image/"));
    assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);

    let posts = cdn.requests();
    assert!(posts[0].url.contains("auth=auth-0"));
    assert!(posts[1].url.contains("auth=auth-1"));
}

/// Serves hosts normally but cannot refresh auth.
struct BrokenRefresh {
    hosts: Vec<&'static str>,
}

#[async_trait]
impl UploadInfoProvider for BrokenRefresh {
    async fn upload_info(&self, force_refresh: bool) -> MediaResult<UploadInfo> {
        if force_refresh {
            return Err(MediaError::Stream("refresh socket closed".into()));
        }
        Ok(UploadInfo {
            hosts: self.hosts.iter().map(|h| UploadHost::new(*h)).collect(),
            auth: SecretString::from("auth-0"),
        })
    }
}

#[tokio::test]
async fn failed_refresh_keeps_trying_later_hosts() {
    let tmp = TempDir::new().unwrap();
    let cdn = Arc::new(MemoryCdn::new());
    cdn.set_host("h1.example.net", HostBehavior::Reject);
    let provider = Arc::new(BrokenRefresh {
        hosts: vec!["h1.example.net", "h2.example.net"],
    });

    let artifact = staged(&tmp, &cdn).await;
    let uploader = MediaUploader::new(cdn.clone(), provider, &TransportConfig::default());
    let uploaded = uploader
        .upload(&artifact.enc_path, &request(&artifact))
        .await
        .expect("second host accepts");

    assert!(uploaded.media_url.unwrap().starts_with("https://h2.example.net/"));
    let posts = cdn.requests();
    assert_eq!(posts.len(), 2);
    assert!(posts[1].url.contains("auth=auth-0"));
}

#[tokio::test]
async fn all_hosts_failing_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let cdn = Arc::new(MemoryCdn::new());
    for host in ["h1.example.net", "h2.example.net", "h3.example.net"] {
        cdn.set_host(host, HostBehavior::Fail);
    }
    let provider = Arc::new(CountingProvider::new(vec![
        "h1.example.net",
        "h2.example.net",
        "h3.example.net",
    ]));

    let artifact = staged(&tmp, &cdn).await;
    let uploader = MediaUploader::new(cdn.clone(), provider, &TransportConfig::default());
    let err = uploader
        .upload(&artifact.enc_path, &request(&artifact))
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Transport(ref msg) if msg.contains("all hosts")));
    assert_eq!(cdn.requests().len(), 3);
}

#[tokio::test]
async fn media_type_without_upload_path_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let cdn = Arc::new(MemoryCdn::new());
    let provider = Arc::new(CountingProvider::new(vec!["h1.example.net"]));

    let artifact = staged(&tmp, &cdn).await;
    let uploader = MediaUploader::new(cdn.clone(), provider, &TransportConfig::default());
    let req = UploadRequest {
        media_type: MediaType::Ptt,
        ..request(&artifact)
    };
    let err = uploader.upload(&artifact.enc_path, &req).await.unwrap_err();

    assert!(matches!(err, MediaError::Transport(_)));
    assert!(cdn.requests().is_empty());
}
