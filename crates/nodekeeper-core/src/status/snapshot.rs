//! The aggregated, partially-available view of a node.
//!
//! Every field is optional and remembers which source supplied it. `None`
//! means unknown: no source has answered for that field yet.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::adapters::{HealthCheck, NodeEntry, Validator};
use crate::topology::Service;

/// Where an observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    HealthReport,
    ControlConfig,
    NodeListing,
    ChainStatus,
    ChainApp,
    ChainPeers,
    ChainValidators,
    Engine,
}

impl Source {
    pub const ALL: [Source; 8] = [
        Source::HealthReport,
        Source::ControlConfig,
        Source::NodeListing,
        Source::ChainStatus,
        Source::ChainApp,
        Source::ChainPeers,
        Source::ChainValidators,
        Source::Engine,
    ];

    /// Authority when two sources report the same field; higher wins.
    ///
    /// The health report is a digest assembled by the control API, so
    /// anything it says is superseded by the primary source.
    pub fn priority(self) -> u8 {
        match self {
            Source::HealthReport => 1,
            Source::ControlConfig | Source::NodeListing => 2,
            Source::ChainStatus
            | Source::ChainApp
            | Source::ChainPeers
            | Source::ChainValidators
            | Source::Engine => 3,
        }
    }

    /// Container whose reachability this source hints at
    pub fn container(self) -> Service {
        match self {
            Source::HealthReport | Source::ControlConfig | Source::NodeListing => Service::Api,
            Source::ChainStatus
            | Source::ChainApp
            | Source::ChainPeers
            | Source::ChainValidators => Service::Node,
            Source::Engine => Service::MlNode,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Source::HealthReport => "health report",
            Source::ControlConfig => "control config",
            Source::NodeListing => "node listing",
            Source::ChainStatus => "chain status",
            Source::ChainApp => "chain app info",
            Source::ChainPeers => "chain peers",
            Source::ChainValidators => "chain validators",
            Source::Engine => "inference engine",
        };
        f.write_str(name)
    }
}

/// A value tagged with the source that supplied it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: Source,
}

/// Outcome of the most recent fetch from a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Reachability {
    Reachable,
    Unreachable { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub overall: Option<Sourced<String>>,
    pub checks: Option<Sourced<Vec<HealthCheck>>>,
    pub participant_address: Option<Sourced<String>>,
    pub public_url: Option<Sourced<String>>,
    pub api_version: Option<Sourced<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Blockchain {
    pub block_height: Option<Sourced<u64>>,
    pub network_height: Option<Sourced<u64>>,
    pub catching_up: Option<Sourced<bool>>,
    pub latest_block_time: Option<Sourced<String>>,
    /// Release of the node binary as reported by the application
    pub node_version: Option<Sourced<String>>,
    pub consensus_version: Option<Sourced<String>>,
    pub peers: Option<Sourced<u32>>,
}

impl Blockchain {
    /// Blocks behind the network; unknown unless both heights are known
    pub fn block_lag(&self) -> Option<u64> {
        let local = self.block_height.as_ref()?.value;
        let network = self.network_height.as_ref()?.value;
        Some(network.saturating_sub(local))
    }

    /// Age of the latest block at `now`; unknown if the time is missing or
    /// unparseable
    pub fn block_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let raw = &self.latest_block_time.as_ref()?.value;
        let at = DateTime::parse_from_rfc3339(raw).ok()?;
        Some(now.signed_duration_since(at.with_timezone(&Utc)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Epoch {
    pub index: Option<Sourced<u64>>,
    pub phase: Option<Sourced<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MlNode {
    pub nodes: Option<Sourced<Vec<NodeEntry>>>,
    pub engine_healthy: Option<Sourced<bool>>,
    pub model_loaded: Option<Sourced<bool>>,
    pub model: Option<Sourced<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Security {
    pub validator_address: Option<Sourced<String>>,
    pub validators: Option<Sourced<Vec<Validator>>>,
}

impl Security {
    /// Whether our validator is in the active set; needs both inputs
    pub fn in_active_set(&self) -> Option<bool> {
        Some(self.own_validator()?.is_some())
    }

    /// Voting power of our validator; unknown unless it is in the set
    pub fn voting_power(&self) -> Option<u64> {
        self.own_validator()?.map(|v| v.voting_power)
    }

    fn own_validator(&self) -> Option<Option<&Validator>> {
        let address = &self.validator_address.as_ref()?.value;
        let validators = &self.validators.as_ref()?.value;
        Some(
            validators
                .iter()
                .find(|v| v.address.eq_ignore_ascii_case(address)),
        )
    }
}

/// Inferred container state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerGuess {
    pub service: Service,
    /// `None` when no source hinting at this container was queried
    pub running: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub overview: Overview,
    pub blockchain: Blockchain,
    pub epoch: Epoch,
    pub mlnode: MlNode,
    pub security: Security,
    /// The last health report as received
    pub health_report: Option<serde_json::Value>,
    pub sources: BTreeMap<Source, Reachability>,
    /// When the most recent round of observations completed
    pub collected_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// Heuristic container state.
    ///
    /// This is NOT process inspection: a container counts as running when any
    /// source it serves answered, and as not running when every such source
    /// that was queried failed. A hung process behind a live port still
    /// counts as running, and a network problem looks like a stopped
    /// container.
    pub fn containers_running(&self) -> Vec<ContainerGuess> {
        [Service::Node, Service::Api, Service::MlNode]
            .into_iter()
            .map(|service| {
                let mut states = self
                    .sources
                    .iter()
                    .filter(|(source, _)| source.container() == service)
                    .map(|(_, state)| state)
                    .peekable();
                let running = states
                    .peek()
                    .is_some()
                    .then(|| states.any(|s| *s == Reachability::Reachable));
                ContainerGuess { service, running }
            })
            .collect()
    }

    pub fn unreachable_sources(&self) -> Vec<(Source, &str)> {
        self.sources
            .iter()
            .filter_map(|(source, state)| match state {
                Reachability::Unreachable { error } => Some((*source, error.as_str())),
                Reachability::Reachable => None,
            })
            .collect()
    }
}
