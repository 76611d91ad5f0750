#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use nodekeeper_core::config::{KeeperConfig, PrivilegeMode, symlink_path};
use nodekeeper_core::topology::Subsystem;

pub const COMPOSE: &str = r#"services:
  node:
    image: ghcr.io/product-science/inferenced:v0.2.9
  api:
    image: ghcr.io/product-science/api:v0.2.9
  mlnode:
    # image: ghcr.io/product-science/mlnode:3.0.10
    image: ghcr.io/product-science/mlnode:3.0.11-post1
  proxy:
    image: ghcr.io/product-science/proxy:0.2.0
  proxy-ssl:
    image: ghcr.io/product-science/proxy-ssl:0.1.0
"#;

/// A node deployment rooted in a temp dir, with fast timeouts
pub struct NodeTree {
    pub tmp: TempDir,
    pub config: KeeperConfig,
}

impl NodeTree {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let root = tmp.path();
        let mut config = KeeperConfig::default();
        config.paths.deploy_dir = root.to_path_buf();
        config.paths.compose_file = root.join("docker-compose.yml");
        config.paths.node_home = root.join(".inference");
        config.paths.api_home = root.join(".dapi");
        config.privilege = PrivilegeMode::Never;
        config.timeouts.liveness_secs = 20;
        config.timeouts.liveness_interval_secs = 1;
        config.timeouts.readiness_secs = 60;
        config.timeouts.readiness_interval_secs = 5;
        for subsystem in Subsystem::ALL {
            let link = symlink_path(&config.paths, subsystem);
            std::fs::create_dir_all(link.parent().expect("cosmovisor dir"))
                .expect("create cosmovisor dir");
        }
        std::fs::write(&config.paths.compose_file, COMPOSE).expect("write compose file");
        Self { tmp, config }
    }

    pub fn compose(&self) -> String {
        std::fs::read_to_string(&self.config.paths.compose_file).expect("read compose file")
    }

    pub fn write_marker(&self, json: &str) {
        let path = nodekeeper_core::config::marker_path(&self.config.paths);
        std::fs::create_dir_all(path.parent().expect("data dir")).expect("create data dir");
        std::fs::write(path, json).expect("write marker");
    }

    #[cfg(unix)]
    pub fn point_current_at(&self, subsystem: Subsystem, target: &str) {
        let link = symlink_path(&self.config.paths, subsystem);
        std::os::unix::fs::symlink(target, link).expect("create symlink");
    }
}

pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options).expect("start zip entry");
            zip.write_all(content).expect("write zip entry");
        }
        zip.finish().expect("finish zip");
    }
    buf.into_inner()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
