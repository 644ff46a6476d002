//! mmc: encrypted media transport CLI
//!
//! Commands:
//!   keys <media-key>              - show the key set derived for a media type
//!   encrypt <file>                - encrypt a local file under a fresh media key
//!   decrypt <enc-file>            - decrypt a stored payload, optionally a byte range
//!   upload <file>                 - encrypt and upload to the first accepting host
//!   download <url|direct-path>    - fetch and decrypt, optionally a byte range
//!   config show                   - display current configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;

use mmc_core::{MediaResult, MediaType, MmcConfig};
use mmc_crypto::{decrypt_media, derive_media_keys, DownloadRange, MediaKey};
use mmc_transport::{
    download_encrypted_content, encrypted_stream, DownloadOptions, EncryptOptions, MediaSource,
    MediaUploader, ReqwestHttp, TempStore, UploadHost, UploadInfo, UploadInfoProvider,
    UploadRequest,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "mmc",
    version,
    about = "Encrypted media transport client",
    long_about = "mmc: derive media keys, encrypt, upload, download and decrypt media payloads"
)]
struct Cli {
    /// Path to mmc.toml configuration file
    #[arg(long, short = 'c', env = "MMC_CONFIG", default_value = "/etc/mmc/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [logging].level
    #[arg(long, env = "MMC_LOG")]
    log: Option<String>,

    /// Log format; overrides [logging].format
    #[arg(long, env = "MMC_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the iv, cipher key and MAC key derived from a media key
    Keys {
        /// Media key, base64 (a `data:;base64,` prefix is accepted)
        media_key: String,
        #[arg(long = "type", short = 't')]
        media_type: MediaType,
    },

    /// Encrypt a local file under a fresh media key
    Encrypt {
        file: PathBuf,
        #[arg(long = "type", short = 't')]
        media_type: MediaType,
        /// Where to write the payload (default: staged temp file is kept)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Decrypt a stored payload (ciphertext followed by the 10-byte MAC)
    Decrypt {
        file: PathBuf,
        #[arg(long, short = 'k')]
        media_key: String,
        #[arg(long = "type", short = 't')]
        media_type: MediaType,
        #[command(flatten)]
        range: RangeArgs,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Encrypt a local file and upload it
    ///
    /// Configured custom hosts are tried before the ones given here.
    Upload {
        file: PathBuf,
        #[arg(long = "type", short = 't')]
        media_type: MediaType,
        /// Upload host; repeat for fallbacks, tried in order
        #[arg(long = "host", required = true)]
        hosts: Vec<String>,
        /// Upload auth token
        #[arg(long, env = "MMC_UPLOAD_AUTH")]
        auth: String,
    },

    /// Download and decrypt media by URL or direct path
    Download {
        /// Full URL, or a direct path on the configured default host
        target: String,
        #[arg(long, short = 'k')]
        media_key: String,
        #[arg(long = "type", short = 't')]
        media_type: MediaType,
        #[command(flatten)]
        range: RangeArgs,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct RangeArgs {
    /// First plaintext byte (inclusive)
    #[arg(long)]
    start: Option<u64>,
    /// Last plaintext byte (exclusive)
    #[arg(long)]
    end: Option<u64>,
}

impl RangeArgs {
    fn to_range(&self) -> Result<DownloadRange> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            anyhow::ensure!(start <= end, "--start {start} is past --end {end}");
        }
        Ok(DownloadRange::new(self.start, self.end))
    }
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MmcConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.logging.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });
    init_logging(level, &format);

    match cli.command {
        Commands::Keys { media_key, media_type } => cmd_keys(&media_key, media_type),
        Commands::Encrypt { file, media_type, out } => {
            cmd_encrypt(&config, &file, media_type, out.as_deref()).await
        }
        Commands::Decrypt { file, media_key, media_type, range, out } => {
            cmd_decrypt(&config, &file, &media_key, media_type, range.to_range()?, out.as_deref()).await
        }
        Commands::Upload { file, media_type, hosts, auth } => {
            cmd_upload(&config, &file, media_type, hosts, SecretString::from(auth)).await
        }
        Commands::Download { target, media_key, media_type, range, out } => {
            cmd_download(&config, &target, &media_key, media_type, range.to_range()?, out.as_deref()).await
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // logs go to stderr so decrypted output on stdout stays clean
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")?);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

async fn write_output(out: Option<&Path>, data: &[u8]) -> Result<()> {
    match out {
        Some(path) => tokio::fs::write(path, data)
            .await
            .with_context(|| format!("writing {}", path.display())),
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(data).await.context("writing to stdout")?;
            stdout.flush().await.context("flushing stdout")
        }
    }
}

// ── `mmc keys` ────────────────────────────────────────────────────────────────

fn cmd_keys(media_key: &str, media_type: MediaType) -> Result<()> {
    let key = MediaKey::from_base64(media_key).context("parsing media key")?;
    let keys = derive_media_keys(&key, media_type)?;

    println!("type:       {media_type} (info \"{}\")", mmc_crypto::hkdf_info(media_type));
    println!("iv:         {}", hex::encode(keys.iv()));
    println!("cipher key: {}", hex::encode(keys.cipher_key()));
    println!("mac key:    {}", hex::encode(keys.mac_key()));
    Ok(())
}

// ── `mmc encrypt` ─────────────────────────────────────────────────────────────

async fn cmd_encrypt(
    config: &MmcConfig,
    file: &Path,
    media_type: MediaType,
    out: Option<&Path>,
) -> Result<()> {
    let http = ReqwestHttp::new()?;
    let temp = TempStore::from_config(&config.storage);
    let pb = make_spinner("encrypt")?;
    pb.set_message(format!("{}", file.display()));

    let artifact = encrypted_stream(
        &http,
        MediaSource::File(file.to_path_buf()),
        media_type,
        &temp,
        &EncryptOptions::from_config(config),
    )
    .await
    .with_context(|| format!("encrypting {}", file.display()))?;

    let payload_path = match out {
        Some(dest) => {
            tokio::fs::copy(&artifact.enc_path, dest)
                .await
                .with_context(|| format!("writing {}", dest.display()))?;
            artifact.cleanup().await?;
            dest.to_path_buf()
        }
        None => artifact.enc_path.clone(),
    };
    pb.finish_with_message("done".to_string());

    println!("  media key:       {}", artifact.media_key.to_base64());
    println!("  payload:         {}", payload_path.display());
    println!("  bytes:           {}", fmt_bytes(artifact.file_length));
    println!("  file sha256:     {}", hex::encode(artifact.file_sha256));
    println!("  file enc sha256: {}", hex::encode(artifact.file_enc_sha256));
    println!("  mac:             {}", hex::encode(artifact.mac));
    if let Some(original) = &artifact.original_path {
        if out.is_none() {
            println!("  original:        {}", original.display());
        }
    }
    Ok(())
}

// ── `mmc decrypt` ─────────────────────────────────────────────────────────────

async fn cmd_decrypt(
    config: &MmcConfig,
    file: &Path,
    media_key: &str,
    media_type: MediaType,
    range: DownloadRange,
    out: Option<&Path>,
) -> Result<()> {
    let key = MediaKey::from_base64(media_key).context("parsing media key")?;
    let keys = derive_media_keys(&key, media_type)?;
    let payload = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let plaintext = decrypt_media(&keys, &payload, range, config.transport.verify_mac)
        .with_context(|| format!("decrypting {}", file.display()))?;
    write_output(out, &plaintext).await
}

// ── `mmc upload` ──────────────────────────────────────────────────────────────

/// Upload hosts and auth fixed on the command line. A refresh hands back the
/// same token.
struct StaticUploadInfo {
    hosts: Vec<String>,
    auth: SecretString,
}

#[async_trait]
impl UploadInfoProvider for StaticUploadInfo {
    async fn upload_info(&self, force_refresh: bool) -> MediaResult<UploadInfo> {
        if force_refresh {
            tracing::warn!("auth refresh requested; reusing the token given on the command line");
        }
        Ok(UploadInfo {
            hosts: self.hosts.iter().map(UploadHost::new).collect(),
            auth: SecretString::from(self.auth.expose_secret().to_owned()),
        })
    }
}

async fn cmd_upload(
    config: &MmcConfig,
    file: &Path,
    media_type: MediaType,
    hosts: Vec<String>,
    auth: SecretString,
) -> Result<()> {
    let http = Arc::new(ReqwestHttp::new()?);
    let temp = TempStore::from_config(&config.storage);
    let pb = make_spinner("upload")?;
    pb.set_message(format!("encrypting {}", file.display()));

    let artifact = encrypted_stream(
        http.as_ref(),
        MediaSource::File(file.to_path_buf()),
        media_type,
        &temp,
        &EncryptOptions::from_config(config),
    )
    .await
    .with_context(|| format!("encrypting {}", file.display()))?;

    pb.set_message(format!("uploading {}", fmt_bytes(artifact.file_length)));
    let uploader = MediaUploader::new(
        http,
        Arc::new(StaticUploadInfo { hosts, auth }),
        &config.transport,
    );
    let result = uploader
        .upload(
            &artifact.enc_path,
            &UploadRequest {
                media_type,
                file_enc_sha256: artifact.file_enc_sha256,
                timeout: None,
            },
        )
        .await;

    // staged files go regardless of the upload outcome
    artifact.cleanup().await?;
    let uploaded = result.context("uploading media")?;
    pb.finish_with_message("done".to_string());

    println!("  media key:       {}", artifact.media_key.to_base64());
    println!("  url:             {}", uploaded.media_url.as_deref().unwrap_or("-"));
    println!("  direct path:     {}", uploaded.direct_path.as_deref().unwrap_or("-"));
    println!("  file sha256:     {}", hex::encode(artifact.file_sha256));
    println!("  file enc sha256: {}", hex::encode(artifact.file_enc_sha256));
    println!("  bytes:           {}", fmt_bytes(artifact.file_length));
    Ok(())
}

// ── `mmc download` ────────────────────────────────────────────────────────────

fn resolve_target(opts: &DownloadOptions, target: &str) -> String {
    if target.starts_with("https://") || target.starts_with("http://") {
        target.to_string()
    } else {
        opts.url_for(target)
    }
}

async fn cmd_download(
    config: &MmcConfig,
    target: &str,
    media_key: &str,
    media_type: MediaType,
    range: DownloadRange,
    out: Option<&Path>,
) -> Result<()> {
    let key = MediaKey::from_base64(media_key).context("parsing media key")?;
    let keys = derive_media_keys(&key, media_type)?;
    let http = ReqwestHttp::new()?;
    let opts = DownloadOptions::from_config(config).with_range(range);
    let url = resolve_target(&opts, target);

    let mut stream = download_encrypted_content(&http, &url, &keys, &opts)
        .await
        .with_context(|| format!("requesting {url}"))?;

    // stdout output gets no spinner so the terminal stays readable
    let pb = match out {
        Some(_) => Some(make_spinner("download")?),
        None => None,
    };
    let mut sink: Box<dyn tokio::io::AsyncWrite + Unpin> = match out {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("downloading media")?;
        sink.write_all(&chunk).await.context("writing output")?;
        written += chunk.len() as u64;
        if let Some(pb) = &pb {
            pb.set_message(fmt_bytes(written));
        }
    }
    sink.flush().await.context("flushing output")?;

    if let (Some(pb), Some(path)) = (pb, out) {
        pb.finish_with_message("done".to_string());
        println!("  local:  {}", path.display());
        println!("  bytes:  {}", fmt_bytes(written));
    }
    Ok(())
}

// ── `mmc config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &MmcConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ranged_download() {
        let cli = Cli::try_parse_from([
            "mmc", "download", "/v/t62/abc", "-k", "AAAA", "--type", "video", "--start", "16",
            "--end", "32",
        ])
        .unwrap();
        match cli.command {
            Commands::Download { target, media_type, range, .. } => {
                assert_eq!(target, "/v/t62/abc");
                assert_eq!(media_type, MediaType::Video);
                assert_eq!(range.to_range().unwrap(), DownloadRange::new(Some(16), Some(32)));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let range = RangeArgs { start: Some(40), end: Some(10) };
        assert!(range.to_range().is_err());
    }

    #[test]
    fn upload_requires_a_host() {
        let parsed = Cli::try_parse_from(["mmc", "upload", "a.jpg", "--type", "image", "--auth", "x"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn direct_paths_resolve_against_default_host() {
        let opts = DownloadOptions::default();
        assert_eq!(
            resolve_target(&opts, "/v/t62/abc"),
            "https://mmg.whatsapp.net/v/t62/abc"
        );
        assert_eq!(resolve_target(&opts, "https://cdn.example.net/x"), "https://cdn.example.net/x");
    }

    #[test]
    fn fmt_bytes_units() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
