//! Locating published releases for an upgrade name.

pub mod digest;
pub mod github;
pub mod resolver;
pub mod types;

use async_trait::async_trait;

pub use digest::parse_digest;
pub use github::GithubReleases;
pub use resolver::{ReleaseResolver, exact_tag, post_tag};
pub use types::{ProbeResult, Release, ReleaseAsset, ResolutionStage, ResolvedRelease};

/// Where releases are published
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Release under exactly `tag`; `None` when no such release exists
    async fn release_by_tag(&self, tag: &str) -> anyhow::Result<Option<Release>>;

    /// Most recent releases, newest first
    async fn list_releases(&self, limit: usize) -> anyhow::Result<Vec<Release>>;

    /// Check a direct download URL without following redirects
    async fn probe_download(&self, url: &str) -> anyhow::Result<ProbeResult>;

    /// Conventional direct download URL of an asset under a tag
    fn download_url(&self, tag: &str, asset: &str) -> String;
}
