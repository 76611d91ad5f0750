//! Contracts with the systems nodekeeper drives but does not own.
//!
//! Every component depends on these traits only. Production implementations
//! talk HTTP or shell out to the container runtime; the `testing` module
//! provides in-memory fakes.

pub mod chain;
pub mod compose;
pub mod control;
pub mod engine;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use chain::HttpChainRpc;
pub use compose::ComposeCli;
pub use control::HttpControlApi;
pub use engine::HttpEngineProbe;

/// Container runtime driving the compose project
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn stop(&self, service: &str) -> anyhow::Result<()>;

    /// Start (recreating) the given services; an empty slice means all.
    async fn start(&self, services: &[&str]) -> anyhow::Result<()>;

    async fn pull(&self) -> anyhow::Result<()>;

    /// Last `lines` log lines of a service
    async fn logs(&self, service: &str, lines: usize) -> anyhow::Result<Vec<String>>;
}

/// Admin control API of the node
#[async_trait]
pub trait ControlApi: Send + Sync {
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeEntry>>;

    async fn set_node_enabled(&self, node_id: &str, enabled: bool) -> anyhow::Result<()>;

    async fn fetch_config(&self) -> anyhow::Result<NodeConfig>;

    async fn fetch_health_report(&self) -> anyhow::Result<HealthReport>;
}

/// Tendermint RPC of the local chain node
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn sync_status(&self) -> anyhow::Result<SyncStatus>;

    /// Release of the application binary, from `/abci_info`
    async fn app_version(&self) -> anyhow::Result<Option<String>>;

    async fn peer_count(&self) -> anyhow::Result<u32>;

    async fn validators(&self) -> anyhow::Result<Vec<Validator>>;
}

/// Health endpoint of the inference engine
#[async_trait]
pub trait EngineProbe: Send + Sync {
    async fn health(&self) -> anyhow::Result<EngineHealth>;
}

/// An ML node registered with the control API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub id: String,
    pub host: String,
    #[serde(default)]
    pub models: Vec<String>,
    /// Current scheduling status (e.g. INFERENCE, POC, STOPPED)
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Subset of the node configuration exposed by the control API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub participant_address: Option<String>,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

/// Structured multi-check health report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub overall: Option<String>,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
    #[serde(default)]
    pub chain: Option<ReportedChain>,
    #[serde(default)]
    pub epoch: Option<ReportedEpoch>,
    /// The report as received, for display
    #[serde(skip)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Chain view embedded in the health report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedChain {
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub network_height: Option<u64>,
    #[serde(default)]
    pub catching_up: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedEpoch {
    #[serde(default)]
    pub index: Option<u64>,
    #[serde(default)]
    pub phase: Option<String>,
}

/// Sync state reported by the chain node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub latest_block_height: u64,
    pub latest_block_time: Option<String>,
    pub catching_up: bool,
    /// CometBFT version; not the release of the node binary
    pub consensus_version: Option<String>,
    pub validator_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: String,
    pub voting_power: u64,
}

/// Inference engine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineHealth {
    pub healthy: bool,
    pub model_loaded: bool,
    pub model: Option<String>,
}
