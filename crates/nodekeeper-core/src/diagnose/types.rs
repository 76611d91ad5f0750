//! Findings produced by the diagnostics.

use serde::{Deserialize, Serialize};

use crate::topology::Subsystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => f.write_str("critical"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// What kind of problem a finding describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisId {
    /// The upgrade coordinator is looking for a binary that is not installed
    MissingBinary,
    /// An upgrade marker is left behind in the chain data directory
    StaleUpgradeMarker,
    /// A subsystem's `current` pointer leads nowhere
    BrokenSymlink(Subsystem),
}

impl std::fmt::Display for DiagnosisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosisId::MissingBinary => f.write_str("missing-binary"),
            DiagnosisId::StaleUpgradeMarker => f.write_str("stale-upgrade-marker"),
            DiagnosisId::BrokenSymlink(subsystem) => write!(f, "broken-symlink:{}", subsystem),
        }
    }
}

/// Remedy the repair executor applies for a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixAction {
    InstallBinary,
    RemoveMarker,
    Relink,
}

impl std::fmt::Display for FixAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixAction::InstallBinary => f.write_str("download and install the upgrade binaries"),
            FixAction::RemoveMarker => f.write_str("remove the upgrade marker"),
            FixAction::Relink => f.write_str("point 'current' at the upgrade directory"),
        }
    }
}

/// A detected, named problem with a proposed fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: DiagnosisId,
    pub severity: Severity,
    pub description: String,
    pub fix: FixAction,
    pub upgrade_name: Option<String>,
}

/// Diagnoses plus derived metadata driving repair execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub diagnoses: Vec<Diagnosis>,
    pub upgrade_name: Option<String>,
    /// True iff the node binary for `upgrade_name` is absent on disk
    pub needs_binary: bool,
}

impl RepairPlan {
    pub fn is_empty(&self) -> bool {
        self.diagnoses.is_empty()
    }

    pub fn has(&self, id: DiagnosisId) -> bool {
        self.diagnoses.iter().any(|d| d.id == id)
    }

    /// Subsystems whose `current` pointer is broken
    pub fn broken_links(&self) -> Vec<Subsystem> {
        self.diagnoses
            .iter()
            .filter_map(|d| match d.id {
                DiagnosisId::BrokenSymlink(subsystem) => Some(subsystem),
                _ => None,
            })
            .collect()
    }
}
