//! Streaming artifact download.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::adapters::http;
use crate::error::KeeperError;

const SOURCE: &str = "release host";

/// Fetches a URL into a local file
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the body of `url` to `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// `timeout` bounds the whole transfer, not just the connect
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: http::client(timeout)?,
        })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KeeperError::unreachable(SOURCE, e))
            .with_context(|| format!("Failed to download {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download {}: HTTP {}", url, response.status());
        }

        let mut file = std::fs::File::create(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?
        {
            file.write_all(&chunk)
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .with_context(|| format!("Failed to flush {}", dest.display()))?;

        debug!(url, bytes = written, "download complete");
        Ok(written)
    }
}
