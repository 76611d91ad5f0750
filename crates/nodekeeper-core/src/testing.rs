//! In-memory fakes for every external contract.
//!
//! Available to this crate's unit tests and, through the `testkit` feature,
//! to integration tests and downstream crates.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::adapters::{
    ChainRpc, ContainerRuntime, ControlApi, EngineHealth, EngineProbe, HealthReport, NodeConfig,
    NodeEntry, SyncStatus, Validator,
};
use crate::install::Downloader;
use crate::release::{ProbeResult, Release, ReleaseSource};
use crate::versions::VersionSource;

fn hang<T>() -> impl std::future::Future<Output = T> {
    std::future::pending()
}

/// Records every call; individual operations can be made to fail.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    logs: Vec<String>,
    fail_logs: bool,
    fail_stop: bool,
    fail_start: bool,
    fail_targeted_start: bool,
    fail_pull: bool,
    hang_pull: bool,
}

impl FakeRuntime {
    pub fn with_logs<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.logs = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn failing_logs(mut self) -> Self {
        self.fail_logs = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Every `start` fails
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// `start` of named services fails; starting everything works
    pub fn failing_targeted_start(mut self) -> Self {
        self.fail_targeted_start = true;
        self
    }

    pub fn failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    pub fn hanging_pull(mut self) -> Self {
        self.hang_pull = true;
        self
    }

    /// Calls in order, e.g. `stop node`, `start mlnode`, `start all`, `pull`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("fake runtime lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("fake runtime lock").push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn stop(&self, service: &str) -> anyhow::Result<()> {
        self.record(format!("stop {}", service));
        if self.fail_stop {
            anyhow::bail!("no such service: {}", service);
        }
        Ok(())
    }

    async fn start(&self, services: &[&str]) -> anyhow::Result<()> {
        let target = if services.is_empty() {
            "all".to_string()
        } else {
            services.join(",")
        };
        self.record(format!("start {}", target));
        if self.fail_start || (self.fail_targeted_start && !services.is_empty()) {
            anyhow::bail!("container failed to start");
        }
        Ok(())
    }

    async fn pull(&self) -> anyhow::Result<()> {
        self.record("pull".to_string());
        if self.hang_pull {
            return hang().await;
        }
        if self.fail_pull {
            anyhow::bail!("manifest unknown");
        }
        Ok(())
    }

    async fn logs(&self, service: &str, lines: usize) -> anyhow::Result<Vec<String>> {
        self.record(format!("logs {}", service));
        if self.fail_logs {
            anyhow::bail!("service {} has no container", service);
        }
        let skip = self.logs.len().saturating_sub(lines);
        Ok(self.logs[skip..].to_vec())
    }
}

#[derive(Debug, Default)]
pub struct FakeControlApi {
    nodes: Vec<NodeEntry>,
    config: NodeConfig,
    report: HealthReport,
    unreachable: bool,
    hanging: bool,
    fail_disable: bool,
    fail_enable: bool,
    toggles: Mutex<Vec<(String, bool)>>,
}

impl FakeControlApi {
    pub fn with_nodes(mut self, nodes: Vec<NodeEntry>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_health_report(mut self, report: HealthReport) -> Self {
        self.report = report;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Every call waits forever
    pub fn hanging(mut self) -> Self {
        self.hanging = true;
        self
    }

    pub fn failing_disable(mut self) -> Self {
        self.fail_disable = true;
        self
    }

    pub fn failing_enable(mut self) -> Self {
        self.fail_enable = true;
        self
    }

    /// `(node_id, enabled)` for every enable/disable request, in order
    pub fn toggles(&self) -> Vec<(String, bool)> {
        self.toggles.lock().expect("fake control lock").clone()
    }

    async fn gate(&self) -> anyhow::Result<()> {
        if self.hanging {
            return hang().await;
        }
        if self.unreachable {
            anyhow::bail!("control API unreachable: connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl ControlApi for FakeControlApi {
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeEntry>> {
        self.gate().await?;
        Ok(self.nodes.clone())
    }

    async fn set_node_enabled(&self, node_id: &str, enabled: bool) -> anyhow::Result<()> {
        self.toggles
            .lock()
            .expect("fake control lock")
            .push((node_id.to_string(), enabled));
        self.gate().await?;
        if (enabled && self.fail_enable) || (!enabled && self.fail_disable) {
            anyhow::bail!("HTTP 500 toggling {}", node_id);
        }
        Ok(())
    }

    async fn fetch_config(&self) -> anyhow::Result<NodeConfig> {
        self.gate().await?;
        Ok(self.config.clone())
    }

    async fn fetch_health_report(&self) -> anyhow::Result<HealthReport> {
        self.gate().await?;
        Ok(self.report.clone())
    }
}

#[derive(Debug)]
pub struct FakeChainRpc {
    status: SyncStatus,
    app_version: Option<String>,
    peers: u32,
    validators: Vec<Validator>,
    unreachable: bool,
}

impl Default for FakeChainRpc {
    fn default() -> Self {
        Self {
            status: SyncStatus {
                latest_block_height: 100,
                latest_block_time: Some("2026-10-16T12:00:00Z".to_string()),
                catching_up: false,
                consensus_version: Some("0.38.17".to_string()),
                validator_address: None,
            },
            app_version: None,
            peers: 8,
            validators: Vec::new(),
            unreachable: false,
        }
    }
}

impl FakeChainRpc {
    pub fn at_height(mut self, height: u64) -> Self {
        self.status.latest_block_height = height;
        self
    }

    pub fn catching_up(mut self) -> Self {
        self.status.catching_up = true;
        self
    }

    /// Release reported by `/abci_info`
    pub fn with_version(mut self, version: &str) -> Self {
        self.app_version = Some(version.to_string());
        self
    }

    pub fn with_validator(mut self, address: &str, voting_power: u64) -> Self {
        self.status.validator_address = Some(address.to_string());
        self.validators.push(Validator {
            address: address.to_string(),
            voting_power,
        });
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    fn gate(&self) -> anyhow::Result<()> {
        if self.unreachable {
            anyhow::bail!("chain RPC unreachable: connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl ChainRpc for FakeChainRpc {
    async fn sync_status(&self) -> anyhow::Result<SyncStatus> {
        self.gate()?;
        Ok(self.status.clone())
    }

    async fn app_version(&self) -> anyhow::Result<Option<String>> {
        self.gate()?;
        Ok(self.app_version.clone())
    }

    async fn peer_count(&self) -> anyhow::Result<u32> {
        self.gate()?;
        Ok(self.peers)
    }

    async fn validators(&self) -> anyhow::Result<Vec<Validator>> {
        self.gate()?;
        Ok(self.validators.clone())
    }
}

/// Answers from a script; the last answer repeats once the script runs out.
#[derive(Debug)]
pub struct FakeEngine {
    script: Mutex<VecDeque<Option<EngineHealth>>>,
    probes: Mutex<u32>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Some(EngineHealth {
                healthy: true,
                model_loaded: false,
                model: None,
            })])),
            probes: Mutex::new(0),
        }
    }
}

impl FakeEngine {
    fn scripted(answers: Vec<Option<EngineHealth>>) -> Self {
        Self {
            script: Mutex::new(answers.into()),
            probes: Mutex::new(0),
        }
    }

    pub fn loaded(self, model: &str) -> Self {
        Self::scripted(vec![Some(EngineHealth {
            healthy: true,
            model_loaded: true,
            model: Some(model.to_string()),
        })])
    }

    /// Down, then up but loading, for `pending` probes before the model loads
    pub fn loading_then_loaded(self, pending: usize, model: &str) -> Self {
        let mut answers = vec![None];
        answers.extend((0..pending).map(|_| {
            Some(EngineHealth {
                healthy: true,
                model_loaded: false,
                model: None,
            })
        }));
        answers.push(Some(EngineHealth {
            healthy: true,
            model_loaded: true,
            model: Some(model.to_string()),
        }));
        Self::scripted(answers)
    }

    pub fn unreachable(self) -> Self {
        Self::scripted(vec![None])
    }

    pub fn probes(&self) -> u32 {
        *self.probes.lock().expect("fake engine lock")
    }
}

#[async_trait]
impl EngineProbe for FakeEngine {
    async fn health(&self) -> anyhow::Result<EngineHealth> {
        *self.probes.lock().expect("fake engine lock") += 1;
        let answer = {
            let mut script = self.script.lock().expect("fake engine lock");
            if script.len() > 1 {
                script.pop_front().flatten()
            } else {
                script.front().cloned().flatten()
            }
        };
        answer.ok_or_else(|| anyhow::anyhow!("inference engine unreachable: connection refused"))
    }
}

#[derive(Debug, Default)]
pub struct FakeReleaseSource {
    tags: HashMap<String, Release>,
    listed: Vec<Release>,
    downloadable: HashSet<String>,
    failing_api: bool,
}

impl FakeReleaseSource {
    pub const DOWNLOAD_BASE: &'static str = "https://downloads.test";

    pub fn with_tag(mut self, release: Release) -> Self {
        self.tags.insert(release.tag.clone(), release);
        self
    }

    pub fn with_listed(mut self, release: Release) -> Self {
        self.listed.push(release);
        self
    }

    /// Make the direct download URL of `asset` under `tag` probe as present
    pub fn with_downloadable(mut self, tag: &str, asset: &str) -> Self {
        let url = self.download_url(tag, asset);
        self.downloadable.insert(url);
        self
    }

    /// Tag lookups and listings fail, as when rate-limited
    pub fn failing_api(mut self) -> Self {
        self.failing_api = true;
        self
    }
}

#[async_trait]
impl ReleaseSource for FakeReleaseSource {
    async fn release_by_tag(&self, tag: &str) -> anyhow::Result<Option<Release>> {
        if self.failing_api {
            anyhow::bail!("HTTP 403: API rate limit exceeded");
        }
        Ok(self.tags.get(tag).cloned())
    }

    async fn list_releases(&self, limit: usize) -> anyhow::Result<Vec<Release>> {
        if self.failing_api {
            anyhow::bail!("HTTP 403: API rate limit exceeded");
        }
        Ok(self.listed.iter().take(limit).cloned().collect())
    }

    async fn probe_download(&self, url: &str) -> anyhow::Result<ProbeResult> {
        Ok(if self.downloadable.contains(url) {
            ProbeResult::Exists
        } else {
            ProbeResult::NotFound
        })
    }

    fn download_url(&self, tag: &str, asset: &str) -> String {
        format!("{}/{}/{}", Self::DOWNLOAD_BASE, tag, asset)
    }
}

/// Serves fixed bodies by URL
#[derive(Debug, Default)]
pub struct FakeDownloader {
    bodies: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
    hang: bool,
}

impl FakeDownloader {
    /// Accept every request and never finish it
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn serving(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("fake downloader lock").clone()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        self.requests
            .lock()
            .expect("fake downloader lock")
            .push(url.to_string());
        if self.hang {
            return hang().await;
        }
        let Some(body) = self.bodies.get(url) else {
            anyhow::bail!("HTTP 404 for {}", url);
        };
        std::fs::write(dest, body)?;
        Ok(body.len() as u64)
    }
}

#[derive(Debug, Default)]
pub struct FakeVersionSource {
    latest: BTreeMap<String, String>,
    unreachable: bool,
}

impl FakeVersionSource {
    pub fn with(mut self, service: &str, tag: &str) -> Self {
        self.latest.insert(service.to_string(), tag.to_string());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }
}

#[async_trait]
impl VersionSource for FakeVersionSource {
    async fn latest(&self) -> anyhow::Result<BTreeMap<String, String>> {
        if self.unreachable {
            anyhow::bail!("version manifest unreachable: HTTP 503");
        }
        Ok(self.latest.clone())
    }
}

/// Stand-in for `sudo`: logs its arguments, opens up `unlock` and runs the
/// command as the current user.
#[cfg(unix)]
#[derive(Debug)]
pub struct FakeEscalation {
    pub program: PathBuf,
    log: PathBuf,
}

#[cfg(unix)]
impl FakeEscalation {
    pub fn install(dir: &Path, unlock: &Path) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let program = dir.join("fake-sudo");
        let log = dir.join("fake-sudo.log");
        let script = format!(
            "#!/bin/sh\necho \"$*\" >> '{}'\nchmod 700 '{}'\nshift\nexec \"$@\"\n",
            log.display(),
            unlock.display()
        );
        std::fs::write(&program, script).expect("write fake sudo");
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake sudo");
        Self { program, log }
    }

    /// Argument lines, one per escalated command
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
