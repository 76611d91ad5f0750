//! Concurrent fan-out to every status source.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use super::merge::{Observation, Payload, merge};
use super::snapshot::{Source, StatusSnapshot};
use crate::adapters::{ChainRpc, ControlApi, EngineProbe};
use crate::config::TimeoutsConfig;
use crate::error::KeeperError;

pub struct StatusAggregator<'a> {
    control: &'a dyn ControlApi,
    chain: &'a dyn ChainRpc,
    engine: &'a dyn EngineProbe,
    fetch_timeout: Duration,
    chain_timeout: Duration,
}

/// Run `fut` under its own deadline
async fn bounded<T>(
    source: Source,
    limit: Duration,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%source, ?limit, "fetch timed out");
            Err(KeeperError::PollTimeout {
                what: source.to_string(),
                waited: limit,
            }
            .into())
        }
    }
}

impl<'a> StatusAggregator<'a> {
    pub fn new(
        control: &'a dyn ControlApi,
        chain: &'a dyn ChainRpc,
        engine: &'a dyn EngineProbe,
        timeouts: &TimeoutsConfig,
    ) -> Self {
        Self {
            control,
            chain,
            engine,
            fetch_timeout: timeouts.status_fetch(),
            chain_timeout: timeouts.chain_fetch(),
        }
    }

    /// Query every source concurrently, each under its own timeout.
    ///
    /// Observations come back in priority order, least authoritative first.
    pub async fn observe(&self) -> Vec<Observation> {
        let (report, config, nodes, sync, app, peers, validators, engine) = tokio::join!(
            bounded(Source::HealthReport, self.fetch_timeout, self.control.fetch_health_report()),
            bounded(Source::ControlConfig, self.fetch_timeout, self.control.fetch_config()),
            bounded(Source::NodeListing, self.fetch_timeout, self.control.list_nodes()),
            bounded(Source::ChainStatus, self.chain_timeout, self.chain.sync_status()),
            bounded(Source::ChainApp, self.chain_timeout, self.chain.app_version()),
            bounded(Source::ChainPeers, self.chain_timeout, self.chain.peer_count()),
            bounded(Source::ChainValidators, self.chain_timeout, self.chain.validators()),
            bounded(Source::Engine, self.fetch_timeout, self.engine.health()),
        );

        vec![
            Observation::from_result(Source::HealthReport, report, Payload::HealthReport),
            Observation::from_result(Source::ControlConfig, config, Payload::Config),
            Observation::from_result(Source::NodeListing, nodes, Payload::Nodes),
            Observation::from_result(Source::ChainStatus, sync, Payload::Sync),
            Observation::from_result(Source::ChainApp, app, Payload::AppVersion),
            Observation::from_result(Source::ChainPeers, peers, Payload::Peers),
            Observation::from_result(Source::ChainValidators, validators, Payload::Validators),
            Observation::from_result(Source::Engine, engine, Payload::Engine),
        ]
    }

    /// Fresh snapshot
    pub async fn collect(&self) -> StatusSnapshot {
        self.refresh(StatusSnapshot::default()).await
    }

    /// Fold a new round of observations onto an earlier snapshot
    pub async fn refresh(&self, prior: StatusSnapshot) -> StatusSnapshot {
        let mut snapshot = self.observe().await.into_iter().fold(prior, merge);
        snapshot.collected_at = Some(Utc::now());
        snapshot
    }
}
