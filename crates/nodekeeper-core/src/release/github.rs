//! GitHub releases API client.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{ProbeResult, Release, ReleaseAsset, ReleaseSource, parse_digest};
use crate::adapters::http;
use crate::config::ReleaseConfig;
use crate::error::KeeperError;

const SOURCE: &str = "release host";

#[derive(Debug, Clone)]
pub struct GithubReleases {
    api_base: String,
    download_base: String,
    repo: String,
    client: reqwest::Client,
    /// Same timeout, but never follows redirects
    probe_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WireRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<WireAsset>,
}

#[derive(Debug, Deserialize)]
struct WireAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    digest: Option<String>,
}

impl From<WireRelease> for Release {
    fn from(wire: WireRelease) -> Self {
        Release {
            tag: wire.tag_name,
            assets: wire
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    sha256: parse_digest(a.digest.as_deref()),
                    name: a.name,
                    download_url: a.browser_download_url,
                    size: a.size,
                })
                .collect(),
        }
    }
}

pub(crate) fn parse_release(body: &str) -> anyhow::Result<Release> {
    let wire: WireRelease = serde_json::from_str(body).context("Failed to parse release")?;
    Ok(wire.into())
}

pub(crate) fn parse_release_list(body: &str) -> anyhow::Result<Vec<Release>> {
    let wire: Vec<WireRelease> =
        serde_json::from_str(body).context("Failed to parse release listing")?;
    Ok(wire.into_iter().map(Release::from).collect())
}

impl GithubReleases {
    pub fn new(config: &ReleaseConfig, timeout: Duration) -> anyhow::Result<Self> {
        let probe_client = reqwest::Client::builder()
            .user_agent(http::USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            api_base: config.api_base.clone(),
            download_base: config.download_base.clone(),
            repo: config.repo.clone(),
            client: http::client(timeout)?,
            probe_client,
        })
    }

    async fn get_text(&self, url: &str) -> anyhow::Result<(StatusCode, String)> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| KeeperError::unreachable(SOURCE, e))
            .with_context(|| format!("Failed to fetch {}", url))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        Ok((status, body))
    }
}

#[async_trait]
impl ReleaseSource for GithubReleases {
    async fn release_by_tag(&self, tag: &str) -> anyhow::Result<Option<Release>> {
        let url = http::join(
            &self.api_base,
            &format!("repos/{}/releases/tags/{}", self.repo, tag),
        );
        let (status, body) = self.get_text(&url).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(
                KeeperError::unreachable(SOURCE, format!("HTTP {} from {}", status, url)).into(),
            );
        }
        parse_release(&body).map(Some)
    }

    async fn list_releases(&self, limit: usize) -> anyhow::Result<Vec<Release>> {
        let url = http::join(
            &self.api_base,
            &format!("repos/{}/releases?per_page={}", self.repo, limit),
        );
        let (status, body) = self.get_text(&url).await?;
        if !status.is_success() {
            return Err(
                KeeperError::unreachable(SOURCE, format!("HTTP {} from {}", status, url)).into(),
            );
        }
        parse_release_list(&body)
    }

    async fn probe_download(&self, url: &str) -> anyhow::Result<ProbeResult> {
        let response = self
            .probe_client
            .head(url)
            .send()
            .await
            .map_err(|e| KeeperError::unreachable(SOURCE, e))
            .with_context(|| format!("Failed to probe {}", url))?;
        debug!(url, status = %response.status(), "probe");
        // asset downloads answer with a redirect to storage
        if response.status() == StatusCode::NOT_FOUND {
            Ok(ProbeResult::NotFound)
        } else {
            Ok(ProbeResult::Exists)
        }
    }

    fn download_url(&self, tag: &str, asset: &str) -> String {
        http::join(
            &self.download_base,
            &format!("{}/releases/download/{}/{}", self.repo, tag, asset),
        )
    }
}
