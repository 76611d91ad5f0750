//! Per-service update availability.

use serde::Serialize;

use crate::topology::Service;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDiff {
    pub service: Service,
    /// Empty when unknown
    pub current: String,
    /// Empty when unknown
    pub latest: String,
    pub has_update: bool,
    /// Binary swapped by the upgrade coordinator; never updated by hand
    pub auto_update: bool,
}

impl VersionDiff {
    pub fn new(service: Service, current: impl Into<String>, latest: impl Into<String>) -> Self {
        let current = current.into();
        let latest = latest.into();
        let has_update = !current.is_empty() && !latest.is_empty() && current != latest;
        Self {
            service,
            current,
            latest,
            has_update,
            auto_update: service.auto_update(),
        }
    }
}

/// Entries an operator may update manually
pub fn filter_updatable(diffs: &[VersionDiff]) -> Vec<VersionDiff> {
    diffs
        .iter()
        .filter(|d| d.has_update && !d.auto_update)
        .cloned()
        .collect()
}
