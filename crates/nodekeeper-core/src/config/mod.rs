//! Node configuration
//!
//! A single `nodekeeper.toml` describes where the deployment lives on disk,
//! which endpoints to talk to and how long each kind of call may take. The
//! loaded [`KeeperConfig`] is passed explicitly into every component.

pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use parser::{parse_keeper_toml, parse_keeper_toml_str, to_toml};
pub use paths::{
    default_config_path, marker_path, subsystem_home, symlink_path, upgrade_binary_path, upgrade_dir,
};
pub use schema::{
    DigestPolicy, EndpointsConfig, KeeperConfig, PathsConfig, PrivilegeMode, ReleaseConfig,
    RolloutConfig, TimeoutsConfig,
};
pub use store::ConfigStore;
