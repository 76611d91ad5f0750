//! Applies a repair plan step by step.

use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use super::steps::{RepairStep, plan_steps};
use crate::adapters::{ChainRpc, ContainerRuntime};
use crate::config::{KeeperConfig, marker_path, symlink_path, upgrade_dir};
use crate::diagnose::RepairPlan;
use crate::error::KeeperError;
use crate::flow::{Criticality, StepLog};
use crate::install::{ArtifactInstaller, Downloader};
use crate::poll::{CancellationToken, PollOutcome, PollSettings, Probe, poll_until};
use crate::privilege::{Privilege, is_not_found};
use crate::release::{ReleaseResolver, ReleaseSource};
use crate::topology::{Service, Subsystem};

/// Services cycled around a repair
pub const REPAIR_SERVICES: [Service; 2] = [Service::Node, Service::Api];

/// What the chain endpoint said once services were back up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Liveness {
    Responding { height: u64, catching_up: bool },
    TimedOut { waited_secs: u64, last: Option<String> },
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    #[serde(flatten)]
    pub log: StepLog<RepairStep>,
    pub installed: Vec<PathBuf>,
    pub liveness: Option<Liveness>,
}

pub struct RepairExecutor<'a> {
    config: &'a KeeperConfig,
    runtime: &'a dyn ContainerRuntime,
    chain: &'a dyn ChainRpc,
    releases: &'a dyn ReleaseSource,
    downloader: &'a dyn Downloader,
    privilege: Privilege,
    cancel: CancellationToken,
}

impl<'a> RepairExecutor<'a> {
    pub fn new(
        config: &'a KeeperConfig,
        runtime: &'a dyn ContainerRuntime,
        chain: &'a dyn ChainRpc,
        releases: &'a dyn ReleaseSource,
        downloader: &'a dyn Downloader,
    ) -> Self {
        Self {
            config,
            runtime,
            chain,
            releases,
            downloader,
            privilege: Privilege::new(config.privilege),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    /// Derive the steps for `plan` and run them.
    pub async fn execute(&self, plan: &RepairPlan) -> anyhow::Result<RepairReport> {
        let steps = plan_steps(plan);
        self.run(&steps).await
    }

    /// Run steps in order; a hard step failure aborts with the step named.
    pub async fn run(&self, steps: &[RepairStep]) -> anyhow::Result<RepairReport> {
        let mut report = RepairReport::default();

        for step in steps {
            info!(step = %step, "repair step");
            match self.run_step(step, &mut report).await {
                Ok(()) => report.log.done(step),
                Err(err) => match step.criticality() {
                    Criticality::BestEffort => report.log.degrade(step, format!("{:#}", err)),
                    Criticality::Hard => {
                        return Err(err)
                            .with_context(|| format!("repair step '{}' failed", step.name()));
                    }
                },
            }
        }

        Ok(report)
    }

    async fn run_step(&self, step: &RepairStep, report: &mut RepairReport) -> anyhow::Result<()> {
        match step {
            RepairStep::StopServices => self.stop_services().await,
            RepairStep::InstallBinaries { upgrade } => tokio::select! {
                installed = self.install(upgrade, report) => installed,
                _ = self.cancel.cancelled() => Err(KeeperError::Cancelled {
                    what: "binary install".to_string(),
                }
                .into()),
            },
            RepairStep::RemoveMarker => {
                let path = marker_path(&self.config.paths);
                match self.privilege.remove_file(&path) {
                    Err(err) if is_not_found(&err) => Ok(()),
                    other => other,
                }
            }
            RepairStep::Relink {
                upgrade,
                subsystems,
            } => self.relink(upgrade, subsystems, report),
            RepairStep::StartServices => {
                let names: Vec<&str> = REPAIR_SERVICES.iter().map(|s| s.compose_name()).collect();
                self.runtime
                    .start(&names)
                    .await
                    .with_context(|| format!("Failed to start {}", names.join(", ")))
            }
            RepairStep::AwaitLiveness => {
                let liveness = self.await_liveness().await;
                if let Liveness::TimedOut { waited_secs, .. } = &liveness {
                    report.log.warn(format!(
                        "chain did not respond within {}s; check `docker compose logs node`",
                        waited_secs
                    ));
                }
                report.liveness = Some(liveness);
                Ok(())
            }
        }
    }

    async fn stop_services(&self) -> anyhow::Result<()> {
        let mut failures = Vec::new();
        for service in REPAIR_SERVICES {
            if let Err(err) = self.runtime.stop(service.compose_name()).await {
                failures.push(format!("{}: {:#}", service, err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("could not stop {}", failures.join("; "))
        }
    }

    async fn install(&self, upgrade: &str, report: &mut RepairReport) -> anyhow::Result<()> {
        let asset_names = Subsystem::ALL
            .iter()
            .map(|s| s.asset_name(&self.config.release.arch))
            .collect();
        let resolved = ReleaseResolver::new(
            self.releases,
            asset_names,
            self.config.release.recent_release_limit,
        )
        .resolve(upgrade)
        .await?;

        let installed = ArtifactInstaller::new(self.config, self.downloader)
            .install(&resolved.release, upgrade)
            .await?;
        report
            .installed
            .extend(installed.installed.into_iter().map(|b| b.path));
        report.log.warnings.extend(installed.warnings);
        Ok(())
    }

    /// Relink each subsystem whose upgrade directory is present.
    ///
    /// A missing directory leaves the link untouched and is only reported.
    /// Every subsystem is attempted; any failed relink fails the step.
    fn relink(
        &self,
        upgrade: &str,
        subsystems: &[Subsystem],
        report: &mut RepairReport,
    ) -> anyhow::Result<()> {
        let target = PathBuf::from("upgrades").join(upgrade);
        let mut failures = Vec::new();
        for &subsystem in subsystems {
            let dir = upgrade_dir(&self.config.paths, subsystem, upgrade);
            if !dir.is_dir() {
                let message = format!(
                    "{} has no {} directory; leaving current link as is",
                    subsystem, upgrade
                );
                report.log.warn(message);
                continue;
            }
            let link = symlink_path(&self.config.paths, subsystem);
            if let Err(err) = self.privilege.relink(&target, &link) {
                failures.push(format!("{}: {:#}", subsystem, err));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("could not relink {}", failures.join("; "))
        }
    }

    async fn await_liveness(&self) -> Liveness {
        let timeouts = &self.config.timeouts;
        let settings = PollSettings {
            interval: timeouts.liveness_interval(),
            deadline: timeouts.liveness(),
        };
        let chain = self.chain;
        let outcome = poll_until(
            settings,
            &self.cancel,
            || async move {
                let status = chain.sync_status().await?;
                Ok::<_, anyhow::Error>(Probe::Ready((
                    status.latest_block_height,
                    status.catching_up,
                )))
            },
            |progress| {
                info!(
                    attempt = progress.attempt,
                    elapsed = ?progress.elapsed,
                    "waiting for chain: {}",
                    progress.state
                )
            },
        )
        .await;

        match outcome {
            PollOutcome::Ready((height, catching_up)) => {
                info!(height, catching_up, "chain is responding");
                Liveness::Responding {
                    height,
                    catching_up,
                }
            }
            PollOutcome::TimedOut { waited, last } => Liveness::TimedOut {
                waited_secs: waited.as_secs(),
                last,
            },
            PollOutcome::Cancelled => Liveness::Cancelled,
        }
    }
}
