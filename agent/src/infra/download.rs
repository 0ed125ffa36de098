//! Infrastructure implementation of the `ArtifactDownloader` port.
//!
//! Streams one URL into one file with `reqwest`, retrying transient failures
//! through a `backon` exponential policy and hashing the body with `sha2` as it
//! is written.

use std::path::{Path, PathBuf};
use std::time::Instant;

use backon::{ExponentialBuilder, Retryable};
use futures_util::StreamExt;
use reqwest::{StatusCode, Url};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::application::ports::{ArtifactDownloader, NotificationSink};
use crate::domain::{AgentConfig, DownloadError, DownloadSettings, DownloadTask, format_duration};
use crate::infra::fs::hex_encode;

/// `User-Agent` sent with every artifact request.
pub const USER_AGENT: &str = concat!("update-agent/", env!("CARGO_PKG_VERSION"));

/// Production downloader. Holds no per-download state, so one instance serves
/// any number of concurrent downloads.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    settings: DownloadSettings,
    process_name: String,
}

impl HttpDownloader {
    /// Build a downloader from the agent configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &AgentConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.download.timeout())
            .build()?;
        Ok(Self {
            client,
            settings: config.download,
            process_name: config.process_name.clone(),
        })
    }

    fn retry_policy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.settings.delay())
            .with_factor(self.settings.factor)
            .with_max_times(self.settings.retries)
    }

    /// One GET attempt; returns the hex digest of what was written.
    async fn fetch(&self, url: &Url, path: &Path) -> Result<String, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Network {
                url: url.to_string(),
                retryable: is_retryable_status(status),
                source: format!("server responded with HTTP {status}").into(),
            });
        }

        let io_error = |source| DownloadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(path).await.map_err(io_error)?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| network_error(url, e))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;
        debug!(path = %path.display(), bytes = written, "downloaded");

        Ok(hex_encode(&hasher.finalize()))
    }
}

impl ArtifactDownloader for HttpDownloader {
    async fn download(
        &self,
        task: &DownloadTask,
        notifier: &impl NotificationSink,
    ) -> Result<PathBuf, DownloadError> {
        let url = parse_artifact_url(&task.url)?;

        tokio::fs::create_dir_all(&task.dest_dir)
            .await
            .map_err(|source| DownloadError::Io {
                path: task.dest_dir.clone(),
                source,
            })?;

        let path = task.dest_path();
        notifier.info(&format!("Fetching {}", path.display()));
        info!(url = %url, path = %path.display(), "fetching artifact");

        let started = Instant::now();
        let actual = (|| self.fetch(&url, &path))
            .retry(self.retry_policy())
            .when(DownloadError::is_retryable)
            .notify(|err, delay| {
                warn!(url = %url, error = %err, ?delay, "download attempt failed, retrying");
            })
            .await
            .inspect_err(|err| error!(url = %url, path = %path.display(), error = %err, "download failed"))?;

        let elapsed = format_duration(started.elapsed());
        info!(path = %path.display(), %elapsed, "download complete");
        notifier.info(&format!("Fetched {} in {elapsed}", path.display()));

        let Some(expected) = task.checksum.as_deref() else {
            return Ok(path);
        };
        if actual == expected {
            debug!(path = %path.display(), checksum = %expected, "checksum verified");
            return Ok(path);
        }

        notifier.error(&format!(
            "Signature verification failed for {}! ({actual} != {expected})",
            path.display()
        ));
        notifier.warn(&format!(
            "{} may fail to start properly! Please check your network connection",
            self.process_name
        ));
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "could not remove unverified artifact");
        }
        Err(DownloadError::ChecksumMismatch {
            path,
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Parse `raw` and require that its path ends with a non-empty file name.
///
/// # Errors
///
/// `InvalidUrl` when the URL does not parse or names no file.
pub fn parse_artifact_url(raw: &str) -> Result<Url, DownloadError> {
    let invalid = || DownloadError::InvalidUrl {
        url: raw.to_string(),
    };
    let url = Url::parse(raw).map_err(|_| invalid())?;
    let has_base_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .is_some_and(|name| !name.is_empty());
    if has_base_name { Ok(url) } else { Err(invalid()) }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn network_error(url: &Url, err: reqwest::Error) -> DownloadError {
    let retryable = err.is_connect() || err.is_timeout() || err.is_body() || err.is_request();
    DownloadError::Network {
        url: url.to_string(),
        retryable,
        source: Box::new(err),
    }
}
