//! Nodekeeper Core Library
//!
//! Operational control loop for a deployed GPU inference node: diagnosing
//! stuck deployments, repairing them with verified replacement binaries,
//! rolling out service updates safely and aggregating node health into a
//! single status snapshot.

pub mod adapters;
pub mod config;
pub mod diagnose;
pub mod error;
pub mod flow;
pub mod install;
pub mod poll;
pub mod privilege;
pub mod release;
pub mod repair;
pub mod rollout;
pub mod status;
pub mod topology;
pub mod versions;

#[cfg(any(test, feature = "testkit"))]
pub mod testing;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, DigestPolicy, KeeperConfig, PrivilegeMode};

    // Errors
    pub use crate::error::{ErrorClass, KeeperError};

    // Topology
    pub use crate::topology::{Service, Subsystem};

    // Diagnosis and repair
    pub use crate::diagnose::{Diagnosis, DiagnosisId, RepairPlan, RepairPlanner, Severity};
    pub use crate::repair::{RepairExecutor, RepairReport, RepairStep};

    // Releases and installation
    pub use crate::install::{ArtifactInstaller, InstallReport};
    pub use crate::release::{ReleaseAsset, ReleaseResolver, ResolvedRelease};

    // Updates
    pub use crate::rollout::{RolloutOrchestrator, RolloutReport, RolloutStep};
    pub use crate::versions::{VersionDiff, filter_updatable};

    // Status
    pub use crate::status::{StatusAggregator, StatusSnapshot};

    // Polling
    pub use crate::poll::{CancellationToken, PollOutcome};
}
