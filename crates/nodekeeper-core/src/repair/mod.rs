//! Repair of a stuck deployment.

pub mod executor;
pub mod steps;

pub use executor::{Liveness, REPAIR_SERVICES, RepairExecutor, RepairReport};
pub use steps::{RepairStep, plan_steps};
