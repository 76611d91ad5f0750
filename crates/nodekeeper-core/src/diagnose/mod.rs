//! Stuck-deployment diagnosis
//!
//! Independent diagnostics each produce zero or more findings; the planner
//! unions them into a [`RepairPlan`]. Diagnosis is stateless: every run
//! re-derives findings from the logs and the filesystem.

pub mod filesystem;
pub mod logs;
pub mod planner;
pub mod types;

use std::time::Duration;

use tracing::info;

use crate::adapters::{ChainRpc, ContainerRuntime};
use crate::config::KeeperConfig;
use crate::privilege::Privilege;
use crate::topology::Service;

pub use filesystem::{FilesystemDiagnostic, UpgradeMarker};
pub use logs::LogPatternDiagnostic;
pub use planner::RepairPlanner;
pub use types::{Diagnosis, DiagnosisId, FixAction, RepairPlan, Severity};

/// Runs every diagnostic against a node and plans the repair
pub struct Diagnostician<'a> {
    runtime: &'a dyn ContainerRuntime,
    chain: Option<&'a dyn ChainRpc>,
    filesystem: FilesystemDiagnostic,
    planner: RepairPlanner,
    lookup_timeout: Duration,
}

impl<'a> Diagnostician<'a> {
    pub fn new(
        config: &KeeperConfig,
        runtime: &'a dyn ContainerRuntime,
        chain: Option<&'a dyn ChainRpc>,
    ) -> Self {
        Self {
            runtime,
            chain,
            filesystem: FilesystemDiagnostic::new(
                config.paths.clone(),
                Privilege::new(config.privilege),
            ),
            planner: RepairPlanner::new(config.paths.clone()),
            lookup_timeout: config.timeouts.metadata(),
        }
    }

    pub async fn run(&self) -> RepairPlan {
        let mut findings = Vec::new();

        if let Some(finding) = LogPatternDiagnostic
            .collect(self.runtime, Service::Node.compose_name())
            .await
        {
            findings.push(finding);
        }
        if let Some(finding) = self
            .filesystem
            .check_marker(self.chain, self.lookup_timeout)
            .await
        {
            findings.push(finding);
        }
        findings.extend(self.filesystem.check_symlinks());

        let plan = self.planner.plan(findings);
        info!(
            findings = plan.diagnoses.len(),
            upgrade = plan.upgrade_name.as_deref().unwrap_or("-"),
            needs_binary = plan.needs_binary,
            "diagnosis complete"
        );
        plan
    }
}
