//! The fixed set of services and subsystems managed on a node.

use serde::{Deserialize, Serialize};

/// Compose services of an inference node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    /// Chain node (binary swapped by cosmovisor)
    Node,
    /// Decentralized API (binary swapped by cosmovisor)
    Api,
    /// Inference engine
    MlNode,
    Proxy,
    ProxySsl,
}

impl Service {
    pub const ALL: [Service; 5] = [
        Service::Node,
        Service::Api,
        Service::MlNode,
        Service::Proxy,
        Service::ProxySsl,
    ];

    /// Name of the service in the compose file
    pub fn compose_name(self) -> &'static str {
        match self {
            Service::Node => "node",
            Service::Api => "api",
            Service::MlNode => "mlnode",
            Service::Proxy => "proxy",
            Service::ProxySsl => "proxy-ssl",
        }
    }

    /// Image artifact whose tag is patched on update.
    ///
    /// Auto-update services have no artifact: their binaries are swapped in
    /// place by the upgrade coordinator, never by an image bump.
    pub fn artifact_name(self) -> Option<&'static str> {
        match self {
            Service::Node | Service::Api => None,
            Service::MlNode => Some("mlnode"),
            Service::Proxy => Some("proxy"),
            Service::ProxySsl => Some("proxy-ssl"),
        }
    }

    pub fn auto_update(self) -> bool {
        self.artifact_name().is_none()
    }

    /// Whether this is the inference service that needs a safe rollout
    pub fn is_inference(self) -> bool {
        matches!(self, Service::MlNode)
    }

    pub fn from_compose_name(name: &str) -> Option<Service> {
        Service::ALL.into_iter().find(|s| s.compose_name() == name)
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.compose_name())
    }
}

/// Binaries managed through cosmovisor upgrade directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subsystem {
    Node,
    Api,
}

impl Subsystem {
    pub const ALL: [Subsystem; 2] = [Subsystem::Node, Subsystem::Api];

    pub fn binary_name(self) -> &'static str {
        match self {
            Subsystem::Node => "inferenced",
            Subsystem::Api => "decentralized-api",
        }
    }

    /// Release asset carrying this binary
    pub fn asset_name(self, arch: &str) -> String {
        format!("{}-{}.zip", self.binary_name(), arch)
    }

    /// Compose service that runs this binary
    pub fn service(self) -> Service {
        match self {
            Subsystem::Node => Service::Node,
            Subsystem::Api => Service::Api,
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_mapping_is_total() {
        for service in Service::ALL {
            assert_eq!(service.auto_update(), service.artifact_name().is_none());
        }
    }

    #[test]
    fn only_chain_binaries_auto_update() {
        let auto: Vec<_> = Service::ALL.into_iter().filter(|s| s.auto_update()).collect();
        assert_eq!(auto, vec![Service::Node, Service::Api]);
    }

    #[test]
    fn compose_names_round_trip() {
        for service in Service::ALL {
            assert_eq!(Service::from_compose_name(service.compose_name()), Some(service));
        }
        assert_eq!(Service::from_compose_name("unknown"), None);
    }

    #[test]
    fn asset_names_include_arch() {
        assert_eq!(Subsystem::Node.asset_name("amd64"), "inferenced-amd64.zip");
        assert_eq!(
            Subsystem::Api.asset_name("arm64"),
            "decentralized-api-arm64.zip"
        );
    }
}
