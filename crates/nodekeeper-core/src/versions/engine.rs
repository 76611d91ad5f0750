//! Builds version diffs for the fixed service set.

use std::collections::BTreeMap;

use tracing::warn;

use super::compose_patch::current_tag;
use super::diff::VersionDiff;
use super::source::VersionSource;
use crate::adapters::{ChainRpc, ControlApi};
use crate::topology::Service;

/// Running versions as observed, plus any warnings about sources that failed
#[derive(Debug, Clone, Default)]
pub struct VersionReport {
    pub diffs: Vec<VersionDiff>,
    pub warnings: Vec<String>,
}

pub struct VersionDiffEngine<'a> {
    source: &'a dyn VersionSource,
    chain: Option<&'a dyn ChainRpc>,
    control: Option<&'a dyn ControlApi>,
}

impl<'a> VersionDiffEngine<'a> {
    pub fn new(source: &'a dyn VersionSource) -> Self {
        Self {
            source,
            chain: None,
            control: None,
        }
    }

    /// Report running versions of auto-update services from their own APIs
    pub fn with_running_sources(
        mut self,
        chain: Option<&'a dyn ChainRpc>,
        control: Option<&'a dyn ControlApi>,
    ) -> Self {
        self.chain = chain;
        self.control = control;
        self
    }

    /// One entry per known service; unknown versions are left empty.
    pub async fn compute(&self, compose: &str) -> VersionReport {
        let mut warnings = Vec::new();

        let latest = match self.source.latest().await {
            Ok(latest) => latest,
            Err(err) => {
                let message = format!("latest versions unavailable: {:#}", err);
                warn!("{}", message);
                warnings.push(message);
                BTreeMap::new()
            }
        };

        let mut diffs = Vec::with_capacity(Service::ALL.len());
        for service in Service::ALL {
            let current = match service.artifact_name() {
                Some(artifact) => current_tag(compose, artifact).unwrap_or_default(),
                None => self.running_version(service, &mut warnings).await,
            };
            let latest = latest
                .get(service.compose_name())
                .cloned()
                .unwrap_or_default();
            diffs.push(VersionDiff::new(service, current, latest));
        }

        VersionReport { diffs, warnings }
    }

    async fn running_version(&self, service: Service, warnings: &mut Vec<String>) -> String {
        let result = match service {
            Service::Node => match self.chain {
                Some(chain) => chain.app_version().await,
                None => return String::new(),
            },
            Service::Api => match self.control {
                Some(control) => control.fetch_config().await.map(|c| c.api_version),
                None => return String::new(),
            },
            _ => return String::new(),
        };
        match result {
            Ok(version) => version.unwrap_or_default(),
            Err(err) => {
                let message = format!("{} version unavailable: {:#}", service, err);
                warn!("{}", message);
                warnings.push(message);
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChainRpc, FakeVersionSource};
    use crate::versions::filter_updatable;

    const COMPOSE: &str = "services:\n  mlnode:\n    image: ghcr.io/ps/mlnode:3.0.11-post1\n  proxy:\n    image: ghcr.io/ps/proxy:0.2.0\n";

    #[tokio::test]
    async fn diffs_cover_every_service() {
        let source = FakeVersionSource::default()
            .with("mlnode", "3.0.12-post2")
            .with("proxy", "0.2.0")
            .with("node", "v0.2.10");
        let chain = FakeChainRpc::default().with_version("v0.2.9");

        let report = VersionDiffEngine::new(&source)
            .with_running_sources(Some(&chain), None)
            .compute(COMPOSE)
            .await;

        assert_eq!(report.diffs.len(), Service::ALL.len());
        let node = &report.diffs[0];
        assert_eq!((node.current.as_str(), node.latest.as_str()), ("v0.2.9", "v0.2.10"));
        assert!(node.auto_update);

        let updatable = filter_updatable(&report.diffs);
        assert_eq!(updatable.len(), 1);
        assert_eq!(updatable[0].service, Service::MlNode);
    }

    #[tokio::test]
    async fn consensus_version_is_never_taken_for_the_node_release() {
        let source = FakeVersionSource::default().with("node", "v0.2.10");
        // /status answers with CometBFT 0.38.17, /abci_info names no release
        let chain = FakeChainRpc::default();

        let report = VersionDiffEngine::new(&source)
            .with_running_sources(Some(&chain), None)
            .compute(COMPOSE)
            .await;

        let node = &report.diffs[0];
        assert_eq!(node.service, Service::Node);
        assert_eq!(node.current, "");
        assert!(!node.has_update);
    }

    #[tokio::test]
    async fn unreachable_source_leaves_latest_unknown() {
        let source = FakeVersionSource::default().unreachable();
        let report = VersionDiffEngine::new(&source).compute(COMPOSE).await;
        assert!(report.diffs.iter().all(|d| d.latest.is_empty() && !d.has_update));
        assert_eq!(report.warnings.len(), 1);
    }
}
