//! Runs update flows against the node.

use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use super::steps::{RolloutStep, TagUpdate, safe_rollout_steps, simple_update_steps};
use crate::adapters::{ContainerRuntime, ControlApi, EngineProbe};
use crate::config::KeeperConfig;
use crate::error::KeeperError;
use crate::flow::{Criticality, StepLog};
use crate::poll::{CancellationToken, PollOutcome, PollSettings, Probe, poll_until};
use crate::topology::Service;
use crate::versions::{VersionDiff, filter_updatable, replace_image_tag};

/// State of the inference engine after the rollout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Readiness {
    Loaded { model: Option<String> },
    TimedOut { waited_secs: u64, last: Option<String> },
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RolloutReport {
    #[serde(flatten)]
    pub log: StepLog<RolloutStep>,
    /// Tags actually changed in the service definition
    pub changes: Vec<TagUpdate>,
    /// Scheduling status of the node before it was disabled
    pub allocation: Option<String>,
    pub readiness: Option<Readiness>,
}

pub struct RolloutOrchestrator<'a> {
    config: &'a KeeperConfig,
    runtime: &'a dyn ContainerRuntime,
    control: &'a dyn ControlApi,
    engine: &'a dyn EngineProbe,
    compose_file: PathBuf,
    cancel: CancellationToken,
}

impl<'a> RolloutOrchestrator<'a> {
    pub fn new(
        config: &'a KeeperConfig,
        runtime: &'a dyn ContainerRuntime,
        control: &'a dyn ControlApi,
        engine: &'a dyn EngineProbe,
    ) -> Self {
        Self {
            config,
            runtime,
            control,
            engine,
            compose_file: config.paths.compose_file.clone(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Steps that would bring every updatable service in `diffs` up to date.
    ///
    /// When the inference service is among them the whole batch goes through
    /// the safe rollout, so it is never recreated while still scheduled.
    pub fn plan(&self, diffs: &[VersionDiff]) -> Vec<RolloutStep> {
        let updates: Vec<TagUpdate> = filter_updatable(diffs).iter().map(TagUpdate::from).collect();
        if updates.is_empty() {
            return Vec::new();
        }
        if updates.iter().any(|u| u.service.is_inference()) {
            safe_rollout_steps(&self.config.rollout.inference_node_id, &updates)
        } else {
            simple_update_steps(&updates)
        }
    }

    pub async fn update(&self, diffs: &[VersionDiff]) -> anyhow::Result<RolloutReport> {
        let steps = self.plan(diffs);
        self.run(&steps).await
    }

    /// Run steps in order; a hard step failure aborts with the step named.
    pub async fn run(&self, steps: &[RolloutStep]) -> anyhow::Result<RolloutReport> {
        let mut report = RolloutReport::default();

        for step in steps {
            info!(step = %step, "rollout step");
            match self.run_step(step, &mut report).await {
                Ok(()) => report.log.done(step),
                Err(err) => match step.criticality() {
                    Criticality::BestEffort => report.log.degrade(step, format!("{:#}", err)),
                    Criticality::Hard => {
                        return Err(err)
                            .with_context(|| format!("rollout step '{}' failed", step.name()));
                    }
                },
            }
        }

        for change in &report.changes {
            info!(service = %change.service, from = %change.from, to = %change.to, "updated");
        }
        Ok(report)
    }

    async fn run_step(&self, step: &RolloutStep, report: &mut RolloutReport) -> anyhow::Result<()> {
        match step {
            RolloutStep::QueryAllocation { node_id } => {
                let nodes = self.control.list_nodes().await?;
                report.allocation = nodes
                    .into_iter()
                    .find(|n| &n.id == node_id)
                    .and_then(|n| n.status);
                info!(node_id, allocation = ?report.allocation, "current allocation");
                Ok(())
            }
            RolloutStep::DisableNode { node_id } => self
                .control
                .set_node_enabled(node_id, false)
                .await
                .context("node may already be disabled"),
            RolloutStep::PatchTags { updates } => {
                report.changes = self.patch_tags(updates)?;
                Ok(())
            }
            RolloutStep::PullImages => self.pull().await,
            RolloutStep::Recreate { services } => self.recreate(services, report).await,
            RolloutStep::AwaitModelReadiness => {
                let readiness = self.await_readiness().await;
                match &readiness {
                    Readiness::TimedOut { waited_secs, .. } => report.log.warn(format!(
                        "model not loaded after {}s; check `docker compose logs mlnode`",
                        waited_secs
                    )),
                    Readiness::Cancelled => {
                        report.log.warn("readiness wait cancelled".to_string())
                    }
                    Readiness::Loaded { .. } => {}
                }
                report.readiness = Some(readiness);
                Ok(())
            }
            RolloutStep::EnableNode { node_id } => self
                .control
                .set_node_enabled(node_id, true)
                .await
                .with_context(|| format!("Failed to re-enable {}; enable it manually", node_id)),
        }
    }

    fn patch_tags(&self, updates: &[TagUpdate]) -> anyhow::Result<Vec<TagUpdate>> {
        let path = &self.compose_file;
        let original = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut content = original.clone();
        let mut changes = Vec::new();
        for update in updates {
            let Some(artifact) = update.service.artifact_name() else {
                continue;
            };
            let patched = replace_image_tag(&content, &format!("{}:", artifact), &update.to);
            if patched != content {
                changes.push(update.clone());
                content = patched;
            }
        }

        if content != original {
            std::fs::write(path, &content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(changes)
    }

    async fn pull(&self) -> anyhow::Result<()> {
        let limit = self.config.timeouts.pull();
        let pulled = tokio::select! {
            pulled = tokio::time::timeout(limit, self.runtime.pull()) => pulled,
            _ = self.cancel.cancelled() => {
                return Err(KeeperError::Cancelled {
                    what: "image pull".to_string(),
                }
                .into());
            }
        };
        match pulled {
            Ok(result) => result.context("Failed to pull images"),
            Err(_) => Err(KeeperError::PollTimeout {
                what: "image pull".to_string(),
                waited: limit,
            }
            .into()),
        }
    }

    async fn recreate(
        &self,
        services: &[Service],
        report: &mut RolloutReport,
    ) -> anyhow::Result<()> {
        let names: Vec<&str> = services.iter().map(|s| s.compose_name()).collect();
        let Err(err) = self.runtime.start(&names).await else {
            return Ok(());
        };
        if names.is_empty() {
            return Err(err).context("Failed to recreate services");
        }

        report.log.warn(format!(
            "recreating {} failed ({:#}); recreating all services",
            names.join(", "),
            err
        ));
        self.runtime
            .start(&[])
            .await
            .context("Failed to recreate all services")
    }

    async fn await_readiness(&self) -> Readiness {
        let timeouts = &self.config.timeouts;
        let settings = PollSettings {
            interval: timeouts.readiness_interval(),
            deadline: timeouts.readiness(),
        };
        let engine = self.engine;
        let outcome = poll_until(
            settings,
            &self.cancel,
            || async move {
                let health = engine.health().await?;
                let probe = if health.model_loaded {
                    Probe::Ready(health.model)
                } else if health.healthy {
                    Probe::Pending("engine up, model loading".to_string())
                } else {
                    Probe::Pending("engine unhealthy".to_string())
                };
                Ok::<_, anyhow::Error>(probe)
            },
            |progress| {
                info!(
                    attempt = progress.attempt,
                    elapsed = ?progress.elapsed,
                    "waiting for model: {}",
                    progress.state
                )
            },
        )
        .await;

        match outcome {
            PollOutcome::Ready(model) => Readiness::Loaded { model },
            PollOutcome::TimedOut { waited, last } => Readiness::TimedOut {
                waited_secs: waited.as_secs(),
                last,
            },
            PollOutcome::Cancelled => Readiness::Cancelled,
        }
    }
}
