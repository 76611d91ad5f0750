//! Path resolution helpers for the managed deployment layout.

use std::path::{Path, PathBuf};

use crate::topology::Subsystem;

use super::PathsConfig;

/// Default location of nodekeeper.toml
pub fn default_config_path(home_dir: &Path) -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("nodekeeper"))
        .unwrap_or_else(|| home_dir.join(".config").join("nodekeeper"))
        .join("nodekeeper.toml")
}

/// Home directory of a subsystem's cosmovisor tree
pub fn subsystem_home(paths: &PathsConfig, subsystem: Subsystem) -> &Path {
    match subsystem {
        Subsystem::Node => &paths.node_home,
        Subsystem::Api => &paths.api_home,
    }
}

/// The `current` pointer for a subsystem
pub fn symlink_path(paths: &PathsConfig, subsystem: Subsystem) -> PathBuf {
    subsystem_home(paths, subsystem)
        .join("cosmovisor")
        .join("current")
}

/// Directory holding a given upgrade for a subsystem
pub fn upgrade_dir(paths: &PathsConfig, subsystem: Subsystem, upgrade: &str) -> PathBuf {
    subsystem_home(paths, subsystem)
        .join("cosmovisor")
        .join("upgrades")
        .join(upgrade)
}

/// Final install location of a subsystem binary for a given upgrade
pub fn upgrade_binary_path(paths: &PathsConfig, subsystem: Subsystem, upgrade: &str) -> PathBuf {
    upgrade_dir(paths, subsystem, upgrade)
        .join("bin")
        .join(subsystem.binary_name())
}

/// Upgrade marker written by the chain when it halts for an upgrade
pub fn marker_path(paths: &PathsConfig) -> PathBuf {
    paths.node_home.join("data").join("upgrade-info.json")
}
