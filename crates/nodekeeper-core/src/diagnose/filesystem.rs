//! Filesystem checks: leftover upgrade markers and dangling `current` links.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::adapters::ChainRpc;
use crate::config::{PathsConfig, marker_path, symlink_path};
use crate::privilege::{Privilege, is_not_found};
use crate::topology::Subsystem;

use super::{Diagnosis, DiagnosisId, FixAction, Severity};

/// Contents of `upgrade-info.json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpgradeMarker {
    pub name: String,
    pub height: i64,
}

#[derive(Debug, Clone)]
pub struct FilesystemDiagnostic {
    paths: PathsConfig,
    privilege: Privilege,
}

impl FilesystemDiagnostic {
    pub fn new(paths: PathsConfig, privilege: Privilege) -> Self {
        Self { paths, privilege }
    }

    /// Read the upgrade marker.
    ///
    /// Unreadable, malformed or nameless markers are treated as absent. The
    /// data directory is often closed to the operator account, so existence
    /// is only decided by the (possibly escalated) read itself.
    pub fn read_marker(&self) -> Option<UpgradeMarker> {
        let path = marker_path(&self.paths);
        let bytes = match self.privilege.read(&path) {
            Ok(bytes) => bytes,
            Err(err) if is_not_found(&err) => return None,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "marker unreadable");
                return None;
            }
        };
        parse_marker(&bytes)
    }

    /// Stale-marker finding, enriched with the chain height when known
    pub fn marker_finding(marker: &UpgradeMarker, chain_height: Option<u64>) -> Diagnosis {
        let mut description = format!(
            "upgrade marker for {} at height {} is still present",
            marker.name, marker.height
        );
        if let Some(height) = chain_height {
            description.push_str(&format!(" (chain at height {})", height));
        }
        Diagnosis {
            id: DiagnosisId::StaleUpgradeMarker,
            severity: Severity::Warning,
            description,
            fix: FixAction::RemoveMarker,
            upgrade_name: Some(marker.name.clone()),
        }
    }

    /// Check the marker, looking up the chain height with a bounded call.
    ///
    /// The lookup is decoration only: a missing height never suppresses the
    /// finding.
    pub async fn check_marker(
        &self,
        chain: Option<&dyn ChainRpc>,
        lookup_timeout: Duration,
    ) -> Option<Diagnosis> {
        let marker = self.read_marker()?;
        let height = match chain {
            Some(chain) => match tokio::time::timeout(lookup_timeout, chain.sync_status()).await {
                Ok(Ok(status)) => Some(status.latest_block_height),
                Ok(Err(err)) => {
                    debug!(error = %err, "chain height unavailable for marker finding");
                    None
                }
                Err(_) => {
                    debug!("chain height lookup timed out");
                    None
                }
            },
            None => None,
        };
        Some(Self::marker_finding(&marker, height))
    }

    /// One finding per subsystem whose `current` link resolves to nothing.
    ///
    /// Missing paths and regular directories are not findings.
    pub fn check_symlinks(&self) -> Vec<Diagnosis> {
        Subsystem::ALL
            .into_iter()
            .filter_map(|subsystem| {
                let link = symlink_path(&self.paths, subsystem);
                let target = broken_link_target(&link)?;
                let upgrade_name = target
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .filter(|n| !n.is_empty());
                Some(Diagnosis {
                    id: DiagnosisId::BrokenSymlink(subsystem),
                    severity: Severity::Critical,
                    description: format!(
                        "{} points to {} which does not exist",
                        link.display(),
                        target.display()
                    ),
                    fix: FixAction::Relink,
                    upgrade_name,
                })
            })
            .collect()
    }
}

pub(crate) fn parse_marker(bytes: &[u8]) -> Option<UpgradeMarker> {
    let marker: UpgradeMarker = serde_json::from_slice(bytes).ok()?;
    if marker.name.trim().is_empty() {
        return None;
    }
    Some(marker)
}

/// Resolved target of `link` when it is a symlink whose target is missing
fn broken_link_target(link: &Path) -> Option<PathBuf> {
    let meta = std::fs::symlink_metadata(link).ok()?;
    if !meta.file_type().is_symlink() {
        return None;
    }
    let target = std::fs::read_link(link).ok()?;
    let resolved = resolve_link_target(link, &target);
    if resolved.exists() {
        None
    } else {
        Some(resolved)
    }
}

/// Relative targets are relative to the directory containing the link
pub(crate) fn resolve_link_target(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match link.parent() {
        Some(parent) => parent.join(target),
        None => target.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_marker_accepts_valid_json() {
        let marker = parse_marker(br#"{"name":"v0.2.10","height":812000}"#).expect("valid");
        assert_eq!(marker.name, "v0.2.10");
        assert_eq!(marker.height, 812_000);
    }

    #[test]
    fn parse_marker_rejects_malformed_or_nameless() {
        assert!(parse_marker(b"{ not json").is_none());
        assert!(parse_marker(br#"{"name":"","height":1}"#).is_none());
        assert!(parse_marker(br#"{"height":1}"#).is_none());
    }

    #[test]
    fn marker_finding_mentions_height_when_known() {
        let marker = UpgradeMarker {
            name: "v0.2.10".to_string(),
            height: 100,
        };
        let with = FilesystemDiagnostic::marker_finding(&marker, Some(150));
        let without = FilesystemDiagnostic::marker_finding(&marker, None);
        assert!(with.description.contains("chain at height 150"));
        assert!(!without.description.contains("chain at height"));
        assert_eq!(without.id, DiagnosisId::StaleUpgradeMarker);
    }

    fn paths(root: &Path) -> PathsConfig {
        let mut paths = crate::config::KeeperConfig::default().paths;
        paths.node_home = root.join(".inference");
        paths.api_home = root.join(".dapi");
        paths
    }

    #[test]
    fn missing_marker_is_no_finding() {
        let root = tempfile::tempdir().expect("tempdir");
        let diagnostic = FilesystemDiagnostic::new(
            paths(root.path()),
            Privilege::new(crate::config::PrivilegeMode::Never),
        );
        assert!(diagnostic.read_marker().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn marker_behind_closed_data_dir_is_read_with_escalation() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().expect("tempdir");
        let paths = paths(root.path());
        let marker = marker_path(&paths);
        let data = marker.parent().expect("data dir").to_path_buf();
        std::fs::create_dir_all(&data).expect("mkdir");
        std::fs::write(&marker, br#"{"name":"v0.2.10","height":812000}"#).expect("write");
        std::fs::set_permissions(&data, std::fs::Permissions::from_mode(0o000)).expect("chmod");
        let escalation = crate::testing::FakeEscalation::install(root.path(), &data);
        let plain_read_denied = std::fs::read(&marker).is_err();

        let diagnostic = FilesystemDiagnostic::new(
            paths,
            Privilege::new(crate::config::PrivilegeMode::Auto).with_program(&escalation.program),
        );
        let found = diagnostic.read_marker().expect("marker should be read");

        assert_eq!(found.name, "v0.2.10");
        if plain_read_denied {
            assert_eq!(escalation.calls().len(), 1);
        }
    }

    #[test]
    fn relative_targets_resolve_against_link_dir() {
        let resolved = resolve_link_target(
            Path::new("/home/.inference/cosmovisor/current"),
            Path::new("upgrades/v0.2.10"),
        );
        assert_eq!(
            resolved,
            PathBuf::from("/home/.inference/cosmovisor/upgrades/v0.2.10")
        );
    }
}
