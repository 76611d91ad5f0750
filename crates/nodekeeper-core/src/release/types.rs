//! Release metadata as seen by the resolver.

use serde::{Deserialize, Serialize};

/// A named downloadable artifact, optionally carrying an integrity digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_url: String,
    /// Lowercase hex SHA-256, without any `sha256:` prefix
    pub sha256: Option<String>,
    pub size: u64,
}

/// A published release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag: String,
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Which fallback stage produced a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    ExactTag,
    PostTag,
    ListingSearch,
    DirectProbe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRelease {
    pub release: Release,
    pub stage: ResolutionStage,
}

/// Outcome of a direct-download probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Exists,
    NotFound,
}
