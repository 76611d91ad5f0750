//! Repair flow as an ordered list of typed steps.

use serde::Serialize;

use crate::diagnose::{DiagnosisId, RepairPlan};
use crate::flow::Criticality;
use crate::topology::Subsystem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RepairStep {
    StopServices,
    InstallBinaries { upgrade: String },
    RemoveMarker,
    Relink { upgrade: String, subsystems: Vec<Subsystem> },
    StartServices,
    AwaitLiveness,
}

impl RepairStep {
    pub fn criticality(&self) -> Criticality {
        match self {
            RepairStep::InstallBinaries { .. } | RepairStep::StartServices => Criticality::Hard,
            RepairStep::StopServices
            | RepairStep::RemoveMarker
            | RepairStep::Relink { .. }
            | RepairStep::AwaitLiveness => Criticality::BestEffort,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RepairStep::StopServices => "stop services",
            RepairStep::InstallBinaries { .. } => "install binaries",
            RepairStep::RemoveMarker => "remove upgrade marker",
            RepairStep::Relink { .. } => "relink current",
            RepairStep::StartServices => "start services",
            RepairStep::AwaitLiveness => "await liveness",
        }
    }
}

impl std::fmt::Display for RepairStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairStep::InstallBinaries { upgrade } => {
                write!(f, "install binaries for {}", upgrade)
            }
            RepairStep::Relink {
                upgrade,
                subsystems,
            } => {
                let names: Vec<String> = subsystems.iter().map(ToString::to_string).collect();
                write!(f, "relink {} to {}", names.join(", "), upgrade)
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Ordered steps that fix everything in `plan`; empty when nothing is wrong.
pub fn plan_steps(plan: &RepairPlan) -> Vec<RepairStep> {
    if plan.is_empty() {
        return Vec::new();
    }

    let mut steps = vec![RepairStep::StopServices];

    if plan.has(DiagnosisId::MissingBinary)
        && plan.needs_binary
        && let Some(upgrade) = &plan.upgrade_name
    {
        steps.push(RepairStep::InstallBinaries {
            upgrade: upgrade.clone(),
        });
    }

    if plan.has(DiagnosisId::StaleUpgradeMarker) {
        steps.push(RepairStep::RemoveMarker);
    }

    let broken = plan.broken_links();
    if !broken.is_empty()
        && let Some(upgrade) = &plan.upgrade_name
    {
        steps.push(RepairStep::Relink {
            upgrade: upgrade.clone(),
            subsystems: broken,
        });
    }

    steps.push(RepairStep::StartServices);
    steps.push(RepairStep::AwaitLiveness);
    steps
}
