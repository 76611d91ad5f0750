//! Union of diagnostic findings into an actionable repair plan.

use crate::config::{PathsConfig, upgrade_binary_path};
use crate::topology::Subsystem;

use super::{Diagnosis, RepairPlan};

#[derive(Debug, Clone)]
pub struct RepairPlanner {
    paths: PathsConfig,
}

impl RepairPlanner {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    /// Build a plan from findings in the order they were produced.
    ///
    /// No finding type takes precedence over another; the upgrade name is
    /// the first one any finding carries.
    pub fn plan(&self, diagnoses: Vec<Diagnosis>) -> RepairPlan {
        let upgrade_name = diagnoses.iter().find_map(|d| d.upgrade_name.clone());
        let needs_binary = upgrade_name
            .as_deref()
            .map(|name| !upgrade_binary_path(&self.paths, Subsystem::Node, name).exists())
            .unwrap_or(false);

        RepairPlan {
            diagnoses,
            upgrade_name,
            needs_binary,
        }
    }
}
