//! Download, verify, extract and place the subsystem binaries of an upgrade.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use super::archive::{MAX_ENTRY_BYTES, extract_entry};
use super::download::Downloader;
use super::verify::verify_sha256;
use crate::config::{DigestPolicy, KeeperConfig, PathsConfig, upgrade_binary_path};
use crate::error::KeeperError;
use crate::privilege::Privilege;
use crate::release::{Release, ReleaseAsset};
use crate::topology::Subsystem;

/// A binary placed into its upgrade directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledBinary {
    pub subsystem: Subsystem,
    pub path: PathBuf,
    /// Whether a published digest was checked
    pub verified: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub installed: Vec<InstalledBinary>,
    pub warnings: Vec<String>,
}

pub struct ArtifactInstaller<'a> {
    downloader: &'a dyn Downloader,
    paths: PathsConfig,
    arch: String,
    digest_policy: DigestPolicy,
    privilege: Privilege,
    entry_cap: u64,
}

impl<'a> ArtifactInstaller<'a> {
    pub fn new(config: &KeeperConfig, downloader: &'a dyn Downloader) -> Self {
        Self {
            downloader,
            paths: config.paths.clone(),
            arch: config.release.arch.clone(),
            digest_policy: config.release.digest_policy,
            privilege: Privilege::new(config.privilege),
            entry_cap: MAX_ENTRY_BYTES,
        }
    }

    pub fn with_entry_cap(mut self, cap: u64) -> Self {
        self.entry_cap = cap;
        self
    }

    /// Install every subsystem binary `release` carries for `upgrade`.
    ///
    /// Assets missing from the release are skipped with a warning; any
    /// verification or extraction failure aborts before the binary is placed.
    pub async fn install(&self, release: &Release, upgrade: &str) -> anyhow::Result<InstallReport> {
        let mut report = InstallReport::default();

        for subsystem in Subsystem::ALL {
            let asset_name = subsystem.asset_name(&self.arch);
            let Some(asset) = release.asset(&asset_name) else {
                let message = KeeperError::AssetMissing {
                    release: release.tag.clone(),
                    asset: asset_name,
                }
                .to_string();
                warn!("{}; skipping {}", message, subsystem);
                report.warnings.push(message);
                continue;
            };

            let installed = self
                .install_one(subsystem, asset, upgrade, &mut report.warnings)
                .await
                .with_context(|| format!("Failed to install {} binary", subsystem))?;
            info!(
                subsystem = %subsystem,
                path = %installed.path.display(),
                verified = installed.verified,
                "installed binary"
            );
            report.installed.push(installed);
        }

        Ok(report)
    }

    async fn install_one(
        &self,
        subsystem: Subsystem,
        asset: &ReleaseAsset,
        upgrade: &str,
        warnings: &mut Vec<String>,
    ) -> anyhow::Result<InstalledBinary> {
        let workdir = tempfile::tempdir().context("Failed to create download directory")?;
        let archive = workdir.path().join(&asset.name);

        self.downloader
            .download(&asset.download_url, &archive)
            .await
            .with_context(|| format!("Failed to download {}", asset.name))?;

        let verified = match &asset.sha256 {
            Some(expected) => {
                verify_sha256(&archive, &asset.name, expected)?;
                true
            }
            None => match self.digest_policy {
                DigestPolicy::Require => {
                    return Err(KeeperError::DigestRequired {
                        asset: asset.name.clone(),
                    }
                    .into());
                }
                DigestPolicy::Warn => {
                    let message = format!(
                        "no digest published for {}; installing unverified",
                        asset.name
                    );
                    warn!("{}", message);
                    warnings.push(message);
                    false
                }
            },
        };

        let extracted = workdir.path().join(subsystem.binary_name());
        extract_entry(&archive, subsystem.binary_name(), &extracted, self.entry_cap)?;

        let dest = upgrade_binary_path(&self.paths, subsystem, upgrade);
        self.place(&extracted, &dest)?;

        Ok(InstalledBinary {
            subsystem,
            path: dest,
            verified,
        })
    }

    fn place(&self, src: &Path, dest: &Path) -> anyhow::Result<()> {
        if let Some(parent) = dest.parent() {
            self.privilege.create_dir_all(parent)?;
        }
        self.privilege.install_executable(src, dest)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::PrivilegeMode;
    use crate::error::ErrorClass;
    use crate::testing::FakeDownloader;

    fn zip_with(entry: &str, content: &[u8]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file(entry, options).expect("start entry");
            zip.write_all(content).expect("write entry");
            zip.finish().expect("finish zip");
        }
        buf.into_inner()
    }

    fn config(root: &Path, policy: DigestPolicy) -> KeeperConfig {
        let mut config = KeeperConfig::default();
        config.paths.node_home = root.join(".inference");
        config.paths.api_home = root.join(".dapi");
        config.release.digest_policy = policy;
        config.privilege = PrivilegeMode::Never;
        config
    }

    fn asset(name: &str, sha256: Option<String>) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            download_url: format!("https://example.test/{}", name),
            sha256,
            size: 0,
        }
    }

    fn sha256_hex(bytes: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(bytes))
    }

    #[tokio::test]
    async fn installs_verified_binary_and_skips_missing_asset() {
        let root = tempfile::tempdir().expect("tempdir");
        let archive = zip_with("inferenced", b"node-binary-v0.2.10");
        let downloader = FakeDownloader::default()
            .serving("https://example.test/inferenced-amd64.zip", archive.clone());
        let release = Release {
            tag: "release/v0.2.10".to_string(),
            assets: vec![asset("inferenced-amd64.zip", Some(sha256_hex(&archive)))],
        };

        let config = config(root.path(), DigestPolicy::Warn);
        let report = ArtifactInstaller::new(&config, &downloader)
            .install(&release, "v0.2.10")
            .await
            .expect("install");

        assert_eq!(report.installed.len(), 1);
        let installed = &report.installed[0];
        assert!(installed.verified);
        assert_eq!(
            installed.path,
            upgrade_binary_path(&config.paths, Subsystem::Node, "v0.2.10")
        );
        assert_eq!(std::fs::read(&installed.path).expect("read"), b"node-binary-v0.2.10");
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("decentralized-api-amd64.zip"));
    }

    #[tokio::test]
    async fn digest_mismatch_aborts_without_placing() {
        let root = tempfile::tempdir().expect("tempdir");
        let archive = zip_with("inferenced", b"node");
        let downloader = FakeDownloader::default()
            .serving("https://example.test/inferenced-amd64.zip", archive);
        let release = Release {
            tag: "release/v0.2.10".to_string(),
            assets: vec![asset("inferenced-amd64.zip", Some("00".repeat(32)))],
        };

        let config = config(root.path(), DigestPolicy::Warn);
        let err = ArtifactInstaller::new(&config, &downloader)
            .install(&release, "v0.2.10")
            .await
            .unwrap_err();

        assert_eq!(KeeperError::classify(&err), ErrorClass::Verification);
        assert!(!upgrade_binary_path(&config.paths, Subsystem::Node, "v0.2.10").exists());
    }

    #[tokio::test]
    async fn missing_digest_follows_policy() {
        let root = tempfile::tempdir().expect("tempdir");
        let archive = zip_with("inferenced", b"node");
        let downloader = FakeDownloader::default()
            .serving("https://example.test/inferenced-amd64.zip", archive);
        let release = Release {
            tag: "release/v0.2.10".to_string(),
            assets: vec![asset("inferenced-amd64.zip", None)],
        };

        let lenient = config(root.path(), DigestPolicy::Warn);
        let report = ArtifactInstaller::new(&lenient, &downloader)
            .install(&release, "v0.2.10")
            .await
            .expect("warn policy installs");
        assert!(!report.installed[0].verified);
        assert!(report.warnings.iter().any(|w| w.contains("no digest published")));

        let strict = config(root.path(), DigestPolicy::Require);
        let err = ArtifactInstaller::new(&strict, &downloader)
            .install(&release, "v0.2.11")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KeeperError>(),
            Some(KeeperError::DigestRequired { .. })
        ));
    }
}
