//! Writing artifacts to their target path.
//!
//! Bytes always go to a temporary file next to the target first and are only
//! renamed into place once complete and non-empty, so a failed or interrupted
//! write never leaves anything at the target path.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER, USER_AGENT};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::constants::{
    ACCESS_DENIED_PAUSE, BROWSER_USER_AGENTS, DOWNLOAD_ACCEPT_LANGUAGE, DOWNLOAD_REFERER,
    DOWNLOAD_TIMEOUT, IMAGE_ACCEPT,
};
use crate::error::{FetchError, PipelineError};
use crate::source::Artifact;

/// Result of writing one artifact.
#[derive(Debug)]
pub enum PersistOutcome {
    /// The target exists with this many bytes
    Success(u64),
    /// Nothing was left at the target
    DownloadFailed(String),
}

/// Downloads and writes artifacts.
#[derive(Clone, Debug)]
pub struct Persister {
    client: reqwest::Client,
    user_agents: Vec<String>,
    referer: String,
    access_denied_pause: Duration,
}

impl Persister {
    /// A persister with the default browser identities and download timeout.
    pub fn new() -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            user_agents: BROWSER_USER_AGENTS
                .iter()
                .map(|agent| agent.to_string())
                .collect(),
            referer: DOWNLOAD_REFERER.to_string(),
            access_denied_pause: ACCESS_DENIED_PAUSE,
        })
    }

    /// Overrides how long to wait before retrying a 403 with another identity.
    pub fn with_access_denied_pause(mut self, pause: Duration) -> Self {
        self.access_denied_pause = pause;
        self
    }

    /// Writes `artifact` to `target`, downloading it first if it is a URL.
    pub async fn persist(&self, artifact: &Artifact, target: &Path) -> PersistOutcome {
        let result = match artifact {
            Artifact::Url(url) => self.download(url, target).await,
            Artifact::Inline { bytes, .. } => write_atomically(target, bytes).map_err(FetchError::from),
        };
        match result {
            Ok(written) => match verify_target(target) {
                Some(size) => PersistOutcome::Success(size),
                None => {
                    remove_empty(target);
                    PersistOutcome::DownloadFailed(format!(
                        "{} is missing or empty after writing {written} bytes",
                        target.display()
                    ))
                }
            },
            Err(err) => PersistOutcome::DownloadFailed(err.to_string()),
        }
    }

    /// Streams `url` into `target`. A 403 gets one more try with the next identity.
    async fn download(&self, url: &str, target: &Path) -> Result<u64, FetchError> {
        let identities = self.user_agents.len().clamp(1, 2);
        let mut attempt = 0;
        let mut response = loop {
            let user_agent = self
                .user_agents
                .get(attempt)
                .map(String::as_str)
                .unwrap_or_default();
            let response = self
                .client
                .get(url)
                .header(USER_AGENT, user_agent)
                .header(ACCEPT, IMAGE_ACCEPT)
                .header(ACCEPT_LANGUAGE, DOWNLOAD_ACCEPT_LANGUAGE)
                .header(REFERER, &self.referer)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::FORBIDDEN && attempt + 1 < identities {
                warn!("403 Forbidden, retrying with a different client identity");
                tokio::time::sleep(self.access_denied_pause).await;
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                let body = response.bytes().await.unwrap_or_default();
                return Err(FetchError::from_status(status, &body));
            }
            break response;
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            warn!("URL doesn't appear to be an image (content-type: {content_type:?})");
        }

        let mut file = temp_file_for(target)?;
        let mut written: u64 = 0;
        let mut sniffed = false;
        while let Some(chunk) = response.chunk().await? {
            if !sniffed && !chunk.is_empty() {
                sniffed = true;
                if image::guess_format(&chunk).is_err() {
                    warn!("Downloaded bytes don't look like a known image format");
                }
            }
            file.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        if written == 0 {
            return Err(FetchError::Malformed("download was empty".to_string()));
        }
        finish(file, target)?;
        debug!("Wrote {written} bytes to {}", target.display());
        Ok(written)
    }
}

/// Writes `bytes` to `target` through a temporary file. Empty input is an error.
pub fn write_atomically(target: &Path, bytes: &[u8]) -> std::io::Result<u64> {
    if bytes.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "refusing to write an empty artifact",
        ));
    }
    let mut file = temp_file_for(target)?;
    file.write_all(bytes)?;
    finish(file, target)?;
    Ok(bytes.len() as u64)
}

fn temp_file_for(target: &Path) -> std::io::Result<NamedTempFile> {
    let dir = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(dir)
}

fn finish(file: NamedTempFile, target: &Path) -> std::io::Result<()> {
    file.as_file().sync_all()?;
    file.persist(target).map_err(|err| err.error)?;
    Ok(())
}

/// Size of the target, if it exists and isn't empty.
fn verify_target(target: &Path) -> Option<u64> {
    std::fs::metadata(target)
        .ok()
        .map(|metadata| metadata.len())
        .filter(|size| *size > 0)
}

fn remove_empty(target: &Path) {
    if let Ok(metadata) = std::fs::metadata(target)
        && metadata.len() == 0
        && let Err(err) = std::fs::remove_file(target)
    {
        warn!("Failed to remove empty {}: {err}", target.display());
    }
}
