//! Version name to release resolution with a four-stage fallback.
//!
//! Releases are not always tagged consistently: some upgrades ship under
//! `release/<name>`, hotfixed ones under `release/<name>-post1`, others only
//! show up in the listing under a decorated tag, and the API may be
//! rate-limited altogether. Each stage is tried only after the previous one
//! came up empty or failed.

use anyhow::Context;
use tracing::{debug, info, warn};

use super::{ProbeResult, Release, ReleaseAsset, ReleaseSource, ResolutionStage, ResolvedRelease};

pub struct ReleaseResolver<'a> {
    source: &'a dyn ReleaseSource,
    /// Assets the caller needs; the direct probe looks for these
    asset_names: Vec<String>,
    listing_limit: usize,
}

pub fn exact_tag(name: &str) -> String {
    format!("release/{}", name)
}

pub fn post_tag(name: &str) -> String {
    format!("release/{}-post1", name)
}

impl<'a> ReleaseResolver<'a> {
    pub fn new(source: &'a dyn ReleaseSource, asset_names: Vec<String>, listing_limit: usize) -> Self {
        Self {
            source,
            asset_names,
            listing_limit,
        }
    }

    pub async fn resolve(&self, name: &str) -> anyhow::Result<ResolvedRelease> {
        for (stage, tag) in [
            (ResolutionStage::ExactTag, exact_tag(name)),
            (ResolutionStage::PostTag, post_tag(name)),
        ] {
            match self.source.release_by_tag(&tag).await {
                Ok(Some(release)) => return Ok(found(release, stage)),
                Ok(None) => debug!(tag, "no release under tag"),
                Err(err) => warn!(tag, error = %format!("{:#}", err), "tag lookup failed"),
            }
        }

        match self.source.list_releases(self.listing_limit).await {
            Ok(releases) => {
                if let Some(release) = releases.into_iter().find(|r| r.tag.contains(name)) {
                    return Ok(found(release, ResolutionStage::ListingSearch));
                }
                debug!(name, "no listed release matches");
            }
            Err(err) => warn!(error = %format!("{:#}", err), "release listing failed"),
        }

        self.probe_direct(name)
            .await
            .with_context(|| format!("Failed to resolve a release for {}", name))
    }

    /// Last resort: guess download URLs and check they exist
    async fn probe_direct(&self, name: &str) -> anyhow::Result<ResolvedRelease> {
        let mut last_error = None;
        for tag in [exact_tag(name), post_tag(name)] {
            let mut assets = Vec::new();
            for asset in &self.asset_names {
                let url = self.source.download_url(&tag, asset);
                match self.source.probe_download(&url).await {
                    Ok(ProbeResult::Exists) => assets.push(ReleaseAsset {
                        name: asset.clone(),
                        download_url: url,
                        sha256: None,
                        size: 0,
                    }),
                    Ok(ProbeResult::NotFound) => debug!(url, "probe: not found"),
                    Err(err) => {
                        debug!(url, error = %format!("{:#}", err), "probe failed");
                        last_error = Some(err);
                    }
                }
            }
            if !assets.is_empty() {
                return Ok(found(Release { tag, assets }, ResolutionStage::DirectProbe));
            }
        }

        match last_error {
            Some(err) => Err(err.context(format!("no release found for {}", name))),
            None => anyhow::bail!("no release found for {}", name),
        }
    }
}

fn found(release: Release, stage: ResolutionStage) -> ResolvedRelease {
    info!(tag = %release.tag, ?stage, "resolved release");
    ResolvedRelease { release, stage }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeReleaseSource;

    fn assets() -> Vec<String> {
        vec![
            "inferenced-amd64.zip".to_string(),
            "decentralized-api-amd64.zip".to_string(),
        ]
    }

    fn release(tag: &str) -> Release {
        Release {
            tag: tag.to_string(),
            assets: vec![ReleaseAsset {
                name: "inferenced-amd64.zip".to_string(),
                download_url: format!("https://example.test/{}/inferenced-amd64.zip", tag),
                sha256: Some("ab".repeat(32)),
                size: 10,
            }],
        }
    }

    #[tokio::test]
    async fn exact_tag_wins() {
        let source = FakeReleaseSource::default()
            .with_tag(release("release/v0.2.10"))
            .with_tag(release("release/v0.2.10-post1"));
        let resolved = ReleaseResolver::new(&source, assets(), 30)
            .resolve("v0.2.10")
            .await
            .expect("should resolve");
        assert_eq!(resolved.stage, ResolutionStage::ExactTag);
        assert_eq!(resolved.release.tag, "release/v0.2.10");
    }

    #[tokio::test]
    async fn falls_back_to_post_tag() {
        let source = FakeReleaseSource::default().with_tag(release("release/v0.2.10-post1"));
        let resolved = ReleaseResolver::new(&source, assets(), 30)
            .resolve("v0.2.10")
            .await
            .expect("should resolve");
        assert_eq!(resolved.stage, ResolutionStage::PostTag);
    }

    #[tokio::test]
    async fn listing_matches_by_substring() {
        let source = FakeReleaseSource::default()
            .with_listed(release("release/v0.2.9"))
            .with_listed(release("release/v0.2.10-hotfix"));
        let resolved = ReleaseResolver::new(&source, assets(), 30)
            .resolve("v0.2.10")
            .await
            .expect("should resolve");
        assert_eq!(resolved.stage, ResolutionStage::ListingSearch);
        assert_eq!(resolved.release.tag, "release/v0.2.10-hotfix");
    }

    #[tokio::test]
    async fn direct_probe_when_api_is_down() {
        let source = FakeReleaseSource::default()
            .failing_api()
            .with_downloadable("release/v0.2.10", "inferenced-amd64.zip")
            .with_downloadable("release/v0.2.10", "decentralized-api-amd64.zip");
        let resolved = ReleaseResolver::new(&source, assets(), 30)
            .resolve("v0.2.10")
            .await
            .expect("probe stage should resolve");

        assert_eq!(resolved.stage, ResolutionStage::DirectProbe);
        assert_eq!(resolved.release.tag, "release/v0.2.10");
        assert_eq!(resolved.release.assets.len(), 2);
        assert!(resolved.release.assets.iter().all(|a| a.sha256.is_none()));
    }

    #[tokio::test]
    async fn nothing_found_is_an_error() {
        let source = FakeReleaseSource::default();
        let err = ReleaseResolver::new(&source, assets(), 30)
            .resolve("v9.9.9")
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("no release found for v9.9.9"));
    }
}
