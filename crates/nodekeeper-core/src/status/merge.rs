//! Folding observations into a snapshot.
//!
//! `merge` is pure: it takes the prior snapshot and one observation and
//! returns the next snapshot. Two rules hold for every field:
//! a failed observation never touches a field, and a successful one only
//! replaces a value that came from an equally or less authoritative source.

use crate::adapters::{EngineHealth, HealthReport, NodeConfig, NodeEntry, SyncStatus, Validator};

use super::snapshot::{Reachability, Source, Sourced, StatusSnapshot};

/// Data returned by a successful fetch
#[derive(Debug, Clone)]
pub enum Payload {
    HealthReport(HealthReport),
    Config(NodeConfig),
    Nodes(Vec<NodeEntry>),
    Sync(SyncStatus),
    AppVersion(Option<String>),
    Peers(u32),
    Validators(Vec<Validator>),
    Engine(EngineHealth),
}

impl Payload {
    pub fn source(&self) -> Source {
        match self {
            Payload::HealthReport(_) => Source::HealthReport,
            Payload::Config(_) => Source::ControlConfig,
            Payload::Nodes(_) => Source::NodeListing,
            Payload::Sync(_) => Source::ChainStatus,
            Payload::AppVersion(_) => Source::ChainApp,
            Payload::Peers(_) => Source::ChainPeers,
            Payload::Validators(_) => Source::ChainValidators,
            Payload::Engine(_) => Source::Engine,
        }
    }
}

/// One fetch result, successful or not
#[derive(Debug, Clone)]
pub struct Observation {
    pub source: Source,
    pub outcome: Result<Payload, String>,
}

impl Observation {
    pub fn ok(payload: Payload) -> Self {
        Self {
            source: payload.source(),
            outcome: Ok(payload),
        }
    }

    pub fn failed(source: Source, error: impl std::fmt::Display) -> Self {
        Self {
            source,
            outcome: Err(error.to_string()),
        }
    }

    /// Wrap an adapter result, mapping the success value into a payload
    pub fn from_result<T>(
        source: Source,
        result: anyhow::Result<T>,
        into: impl FnOnce(T) -> Payload,
    ) -> Self {
        match result {
            Ok(value) => Self::ok(into(value)),
            Err(err) => Self::failed(source, format!("{:#}", err)),
        }
    }
}

/// Replace `slot` with `value` unless a more authoritative value is there
fn put<T>(slot: &mut Option<Sourced<T>>, value: Option<T>, source: Source) {
    let Some(value) = value else {
        return;
    };
    let replace = match slot {
        Some(existing) => source.priority() >= existing.source.priority(),
        None => true,
    };
    if replace {
        *slot = Some(Sourced { value, source });
    }
}

pub fn merge(mut snapshot: StatusSnapshot, observation: Observation) -> StatusSnapshot {
    let source = observation.source;
    let payload = match observation.outcome {
        Ok(payload) => payload,
        Err(error) => {
            snapshot
                .sources
                .insert(source, Reachability::Unreachable { error });
            return snapshot;
        }
    };
    snapshot.sources.insert(source, Reachability::Reachable);

    match payload {
        Payload::HealthReport(report) => {
            let overview = &mut snapshot.overview;
            put(&mut overview.overall, report.overall, source);
            put(&mut overview.checks, Some(report.checks), source);
            if let Some(chain) = report.chain {
                let blockchain = &mut snapshot.blockchain;
                put(&mut blockchain.block_height, chain.block_height, source);
                put(&mut blockchain.network_height, chain.network_height, source);
                put(&mut blockchain.catching_up, chain.catching_up, source);
            }
            if let Some(epoch) = report.epoch {
                put(&mut snapshot.epoch.index, epoch.index, source);
                put(&mut snapshot.epoch.phase, epoch.phase, source);
            }
            snapshot.health_report = Some(report.raw);
        }
        Payload::Config(config) => {
            let overview = &mut snapshot.overview;
            put(&mut overview.participant_address, config.participant_address, source);
            put(&mut overview.public_url, config.public_url, source);
            put(&mut overview.api_version, config.api_version, source);
        }
        Payload::Nodes(nodes) => put(&mut snapshot.mlnode.nodes, Some(nodes), source),
        Payload::Sync(status) => {
            let blockchain = &mut snapshot.blockchain;
            put(&mut blockchain.block_height, Some(status.latest_block_height), source);
            put(&mut blockchain.catching_up, Some(status.catching_up), source);
            put(&mut blockchain.latest_block_time, status.latest_block_time, source);
            put(&mut blockchain.consensus_version, status.consensus_version, source);
            put(
                &mut snapshot.security.validator_address,
                status.validator_address,
                source,
            );
        }
        Payload::AppVersion(version) => {
            put(&mut snapshot.blockchain.node_version, version, source)
        }
        Payload::Peers(peers) => put(&mut snapshot.blockchain.peers, Some(peers), source),
        Payload::Validators(validators) => {
            put(&mut snapshot.security.validators, Some(validators), source)
        }
        Payload::Engine(health) => {
            let mlnode = &mut snapshot.mlnode;
            put(&mut mlnode.engine_healthy, Some(health.healthy), source);
            // an unhealthy engine says nothing reliable about the model
            if health.healthy {
                put(&mut mlnode.model_loaded, Some(health.model_loaded), source);
                put(&mut mlnode.model, health.model, source);
            }
        }
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ReportedChain;

    fn report_with_height(height: u64) -> Observation {
        Observation::ok(Payload::HealthReport(HealthReport {
            overall: Some("healthy".to_string()),
            chain: Some(ReportedChain {
                block_height: Some(height),
                network_height: Some(height + 5),
                catching_up: Some(false),
            }),
            ..Default::default()
        }))
    }

    fn sync_at(height: u64) -> Observation {
        Observation::ok(Payload::Sync(SyncStatus {
            latest_block_height: height,
            latest_block_time: None,
            catching_up: false,
            consensus_version: Some("0.38.17".to_string()),
            validator_address: None,
        }))
    }

    fn height(snapshot: &StatusSnapshot) -> Option<(u64, Source)> {
        snapshot
            .blockchain
            .block_height
            .as_ref()
            .map(|s| (s.value, s.source))
    }

    #[test]
    fn report_height_used_when_rpc_fails() {
        let snapshot = [
            Observation::failed(Source::ChainStatus, "connection refused"),
            report_with_height(100),
        ]
        .into_iter()
        .fold(StatusSnapshot::default(), merge);

        assert_eq!(height(&snapshot), Some((100, Source::HealthReport)));
        assert!(matches!(
            snapshot.sources.get(&Source::ChainStatus),
            Some(Reachability::Unreachable { .. })
        ));
    }

    #[test]
    fn rpc_height_supersedes_report_and_survives_later_failure() {
        let snapshot = [
            report_with_height(100),
            sync_at(120),
            report_with_height(101),
            Observation::failed(Source::ChainStatus, "timed out"),
        ]
        .into_iter()
        .fold(StatusSnapshot::default(), merge);

        assert_eq!(height(&snapshot), Some((120, Source::ChainStatus)));
        // local height is ahead of the report's network height
        assert_eq!(snapshot.blockchain.block_lag(), Some(0));
    }

    #[test]
    fn failure_never_erases_populated_fields() {
        let populated = [report_with_height(100), sync_at(120)]
            .into_iter()
            .fold(StatusSnapshot::default(), merge);
        let after = [
            Observation::failed(Source::HealthReport, "HTTP 502"),
            Observation::failed(Source::ChainStatus, "refused"),
        ]
        .into_iter()
        .fold(populated.clone(), merge);

        assert_eq!(after.blockchain, populated.blockchain);
        assert_eq!(after.overview, populated.overview);
        assert_eq!(after.health_report, populated.health_report);
    }

    #[test]
    fn node_version_only_comes_from_app_info() {
        let snapshot = [sync_at(120)]
            .into_iter()
            .fold(StatusSnapshot::default(), merge);
        assert!(snapshot.blockchain.node_version.is_none());
        assert_eq!(
            snapshot
                .blockchain
                .consensus_version
                .as_ref()
                .map(|s| s.value.as_str()),
            Some("0.38.17")
        );

        let snapshot = merge(
            snapshot,
            Observation::ok(Payload::AppVersion(Some("v0.2.10".to_string()))),
        );
        let version = snapshot.blockchain.node_version.as_ref().expect("known");
        assert_eq!((version.value.as_str(), version.source), ("v0.2.10", Source::ChainApp));
    }

    #[test]
    fn unhealthy_engine_leaves_model_unknown() {
        let snapshot = merge(
            StatusSnapshot::default(),
            Observation::ok(Payload::Engine(EngineHealth {
                healthy: false,
                model_loaded: false,
                model: None,
            })),
        );
        assert_eq!(
            snapshot.mlnode.engine_healthy.as_ref().map(|s| s.value),
            Some(false)
        );
        assert!(snapshot.mlnode.model_loaded.is_none());
    }

    #[test]
    fn from_result_maps_errors_to_failures() {
        let observation = Observation::from_result(
            Source::ChainPeers,
            Err::<u32, _>(anyhow::anyhow!("refused")),
            Payload::Peers,
        );
        assert_eq!(observation.outcome.unwrap_err(), "refused");
    }
}
