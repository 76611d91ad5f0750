//! Update flows as ordered lists of typed steps.

use serde::Serialize;

use crate::flow::Criticality;
use crate::topology::Service;
use crate::versions::VersionDiff;

/// One image tag change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUpdate {
    pub service: Service,
    pub from: String,
    pub to: String,
}

impl From<&VersionDiff> for TagUpdate {
    fn from(diff: &VersionDiff) -> Self {
        Self {
            service: diff.service,
            from: diff.current.clone(),
            to: diff.latest.clone(),
        }
    }
}

impl std::fmt::Display for TagUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} -> {}", self.service, self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RolloutStep {
    /// Record what the node is scheduled for; informational
    QueryAllocation { node_id: String },
    /// Take the node out of scheduling
    DisableNode { node_id: String },
    PatchTags { updates: Vec<TagUpdate> },
    PullImages,
    /// Recreate the listed services; empty means all. A failure for a
    /// non-empty list falls back to recreating all services.
    Recreate { services: Vec<Service> },
    AwaitModelReadiness,
    EnableNode { node_id: String },
}

impl RolloutStep {
    pub fn criticality(&self) -> Criticality {
        match self {
            RolloutStep::QueryAllocation { .. }
            | RolloutStep::DisableNode { .. }
            | RolloutStep::AwaitModelReadiness => Criticality::BestEffort,
            RolloutStep::PatchTags { .. }
            | RolloutStep::PullImages
            | RolloutStep::Recreate { .. }
            | RolloutStep::EnableNode { .. } => Criticality::Hard,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RolloutStep::QueryAllocation { .. } => "query allocation",
            RolloutStep::DisableNode { .. } => "disable node",
            RolloutStep::PatchTags { .. } => "patch image tags",
            RolloutStep::PullImages => "pull images",
            RolloutStep::Recreate { .. } => "recreate services",
            RolloutStep::AwaitModelReadiness => "await model readiness",
            RolloutStep::EnableNode { .. } => "enable node",
        }
    }
}

impl std::fmt::Display for RolloutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RolloutStep::QueryAllocation { node_id } => write!(f, "query allocation of {}", node_id),
            RolloutStep::DisableNode { node_id } => write!(f, "disable {}", node_id),
            RolloutStep::EnableNode { node_id } => write!(f, "enable {}", node_id),
            RolloutStep::PatchTags { updates } => {
                let list: Vec<String> = updates.iter().map(ToString::to_string).collect();
                write!(f, "patch {}", list.join(", "))
            }
            RolloutStep::Recreate { services } if services.is_empty() => {
                f.write_str("recreate all services")
            }
            RolloutStep::Recreate { services } => {
                let list: Vec<&str> = services.iter().map(|s| s.compose_name()).collect();
                write!(f, "recreate {}", list.join(", "))
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Safe rollout: the node stays out of scheduling until the model is loaded
pub fn safe_rollout_steps(node_id: &str, updates: &[TagUpdate]) -> Vec<RolloutStep> {
    vec![
        RolloutStep::QueryAllocation {
            node_id: node_id.to_string(),
        },
        RolloutStep::DisableNode {
            node_id: node_id.to_string(),
        },
        RolloutStep::PatchTags {
            updates: updates.to_vec(),
        },
        RolloutStep::PullImages,
        RolloutStep::Recreate {
            services: updates.iter().map(|u| u.service).collect(),
        },
        RolloutStep::AwaitModelReadiness,
        RolloutStep::EnableNode {
            node_id: node_id.to_string(),
        },
    ]
}

/// Plain update for services that carry no inference traffic
pub fn simple_update_steps(updates: &[TagUpdate]) -> Vec<RolloutStep> {
    vec![
        RolloutStep::PatchTags {
            updates: updates.to_vec(),
        },
        RolloutStep::PullImages,
        RolloutStep::Recreate {
            services: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(service: Service) -> TagUpdate {
        TagUpdate {
            service,
            from: "1".to_string(),
            to: "2".to_string(),
        }
    }

    #[test]
    fn safe_rollout_disables_before_mutating_and_enables_last() {
        let steps = safe_rollout_steps("node1", &[update(Service::MlNode)]);
        let names: Vec<&str> = steps.iter().map(RolloutStep::name).collect();
        assert_eq!(
            names,
            vec![
                "query allocation",
                "disable node",
                "patch image tags",
                "pull images",
                "recreate services",
                "await model readiness",
                "enable node",
            ]
        );
        assert_eq!(
            steps[4],
            RolloutStep::Recreate {
                services: vec![Service::MlNode]
            }
        );
    }

    #[test]
    fn readiness_is_soft_and_enable_is_hard() {
        assert_eq!(
            RolloutStep::AwaitModelReadiness.criticality(),
            Criticality::BestEffort
        );
        assert_eq!(
            RolloutStep::EnableNode {
                node_id: "n".to_string()
            }
            .criticality(),
            Criticality::Hard
        );
        assert_eq!(RolloutStep::PullImages.criticality(), Criticality::Hard);
    }

    #[test]
    fn simple_update_recreates_everything() {
        let steps = simple_update_steps(&[update(Service::Proxy)]);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].to_string(), "recreate all services");
    }
}
