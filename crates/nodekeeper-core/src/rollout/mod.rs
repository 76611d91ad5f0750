//! Service updates: the safe rollout of the inference service and the plain
//! update of everything else.

pub mod orchestrator;
pub mod steps;

pub use orchestrator::{Readiness, RolloutOrchestrator, RolloutReport};
pub use steps::{RolloutStep, TagUpdate, safe_rollout_steps, simple_update_steps};
