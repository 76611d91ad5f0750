//! Configuration schema for nodekeeper.toml

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KeeperError;

/// Root configuration structure for nodekeeper.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeeperConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub release: ReleaseConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub rollout: RolloutConfig,

    /// How privileged filesystem operations are performed
    #[serde(default)]
    pub privilege: PrivilegeMode,
}

/// On-disk layout of the deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the compose project
    pub deploy_dir: PathBuf,
    /// Declarative service definition patched during updates
    pub compose_file: PathBuf,
    /// Chain node home (contains `cosmovisor/` and `data/`)
    pub node_home: PathBuf,
    /// API home (contains `cosmovisor/`)
    pub api_home: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let deploy_dir = PathBuf::from("/srv/inference-node");
        Self {
            compose_file: deploy_dir.join("docker-compose.yml"),
            node_home: deploy_dir.join(".inference"),
            api_home: deploy_dir.join(".dapi"),
            deploy_dir,
        }
    }
}

/// Network endpoints consumed by the control loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Admin control API of the node (node listing, enable/disable, health report)
    pub control_api: String,
    /// Tendermint RPC of the local chain node
    pub chain_rpc: String,
    /// Inference engine of the ML node
    pub engine: String,
    /// JSON manifest with the latest published tag per service
    pub versions_manifest: Option<String>,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            control_api: "http://127.0.0.1:9200".to_string(),
            chain_rpc: "http://127.0.0.1:26657".to_string(),
            engine: "http://127.0.0.1:8080".to_string(),
            versions_manifest: None,
        }
    }
}

/// Where release binaries come from and how they are trusted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// `owner/name` of the release repository
    pub repo: String,
    /// REST API base used for tag lookups and listings
    pub api_base: String,
    /// Base for direct download URLs
    pub download_base: String,
    /// Architecture suffix of release assets
    pub arch: String,
    pub digest_policy: DigestPolicy,
    /// How many recent releases the substring search looks at
    pub recent_release_limit: usize,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            repo: "product-science/race-releases".to_string(),
            api_base: "https://api.github.com".to_string(),
            download_base: "https://github.com".to_string(),
            arch: "amd64".to_string(),
            digest_policy: DigestPolicy::default(),
            recent_release_limit: 30,
        }
    }
}

/// What to do when a release asset carries no SHA-256 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DigestPolicy {
    /// Install anyway and emit a warning (trust on first use)
    #[default]
    Warn,
    /// Refuse to install unverified artifacts
    Require,
}

/// Per-call and per-poll time bounds, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub metadata_secs: u64,
    pub download_secs: u64,
    pub pull_secs: u64,
    pub readiness_secs: u64,
    pub readiness_interval_secs: u64,
    pub liveness_secs: u64,
    pub liveness_interval_secs: u64,
    pub status_fetch_secs: u64,
    pub chain_fetch_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            metadata_secs: 30,
            download_secs: 600,
            pull_secs: 600,
            readiness_secs: 900,
            readiness_interval_secs: 10,
            liveness_secs: 180,
            liveness_interval_secs: 5,
            status_fetch_secs: 5,
            chain_fetch_secs: 10,
        }
    }
}

impl TimeoutsConfig {
    pub fn metadata(&self) -> Duration {
        Duration::from_secs(self.metadata_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn pull(&self) -> Duration {
        Duration::from_secs(self.pull_secs)
    }

    pub fn readiness(&self) -> Duration {
        Duration::from_secs(self.readiness_secs)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval_secs)
    }

    pub fn liveness(&self) -> Duration {
        Duration::from_secs(self.liveness_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn status_fetch(&self) -> Duration {
        Duration::from_secs(self.status_fetch_secs)
    }

    pub fn chain_fetch(&self) -> Duration {
        Duration::from_secs(self.chain_fetch_secs)
    }

    fn fields(&self) -> [(&'static str, u64); 9] {
        [
            ("timeouts.metadata_secs", self.metadata_secs),
            ("timeouts.download_secs", self.download_secs),
            ("timeouts.pull_secs", self.pull_secs),
            ("timeouts.readiness_secs", self.readiness_secs),
            ("timeouts.readiness_interval_secs", self.readiness_interval_secs),
            ("timeouts.liveness_secs", self.liveness_secs),
            ("timeouts.liveness_interval_secs", self.liveness_interval_secs),
            ("timeouts.status_fetch_secs", self.status_fetch_secs),
            ("timeouts.chain_fetch_secs", self.chain_fetch_secs),
        ]
    }
}

/// Inference service rollout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Identifier of the ML node in the control API
    pub inference_node_id: String,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            inference_node_id: "node1".to_string(),
        }
    }
}

/// Privilege escalation for filesystem operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeMode {
    /// Try unprivileged first, escalate with sudo on permission errors
    #[default]
    Auto,
    /// Never escalate
    Never,
    /// Always use sudo for moves into the deployment tree
    Sudo,
}

impl KeeperConfig {
    /// Manifest of latest tags; defaults to the `versions.json` asset of the
    /// latest release
    pub fn versions_manifest_url(&self) -> String {
        match &self.endpoints.versions_manifest {
            Some(url) => url.clone(),
            None => format!(
                "{}/{}/releases/latest/download/versions.json",
                self.release.download_base.trim_end_matches('/'),
                self.release.repo
            ),
        }
    }

    /// Validate configuration semantics
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.release.repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(KeeperError::InvalidConfig {
                field: "release.repo",
                reason: format!("expected owner/name, got '{}'", self.release.repo),
            }
            .into());
        }

        let urls = [
            ("endpoints.control_api", Some(&self.endpoints.control_api)),
            ("endpoints.chain_rpc", Some(&self.endpoints.chain_rpc)),
            ("endpoints.engine", Some(&self.endpoints.engine)),
            (
                "endpoints.versions_manifest",
                self.endpoints.versions_manifest.as_ref(),
            ),
            ("release.api_base", Some(&self.release.api_base)),
            ("release.download_base", Some(&self.release.download_base)),
        ];
        for (field, value) in urls {
            let Some(value) = value else { continue };
            let parsed = url::Url::parse(value).map_err(|e| KeeperError::InvalidConfig {
                field,
                reason: format!("'{}': {}", value, e),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(KeeperError::InvalidConfig {
                    field,
                    reason: format!("unsupported scheme '{}'", parsed.scheme()),
                }
                .into());
            }
        }

        for (field, value) in self.timeouts.fields() {
            if value == 0 {
                return Err(KeeperError::InvalidConfig {
                    field,
                    reason: "must be greater than zero".to_string(),
                }
                .into());
            }
        }

        if self.release.arch.is_empty() {
            return Err(KeeperError::InvalidConfig {
                field: "release.arch",
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        KeeperConfig::default()
            .validate()
            .expect("defaults should validate");
    }

    #[test]
    fn manifest_defaults_to_latest_release_asset() {
        let mut config = KeeperConfig::default();
        assert_eq!(
            config.versions_manifest_url(),
            "https://github.com/product-science/race-releases/releases/latest/download/versions.json"
        );
        config.endpoints.versions_manifest = Some("http://mirror/versions.json".to_string());
        assert_eq!(config.versions_manifest_url(), "http://mirror/versions.json");
    }

    #[test]
    fn rejects_malformed_repo() {
        let mut config = KeeperConfig::default();
        config.release.repo = "just-a-name".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("release.repo"));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let mut config = KeeperConfig::default();
        config.endpoints.chain_rpc = "tcp://127.0.0.1:26657".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("endpoints.chain_rpc"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = KeeperConfig::default();
        config.timeouts.pull_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeouts.pull_secs"));
    }

    #[test]
    fn digest_policy_parses_snake_case() {
        let config: KeeperConfig =
            toml::from_str("[release]\ndigest_policy = \"require\"\n").expect("parse");
        assert_eq!(config.release.digest_policy, DigestPolicy::Require);
    }
}
