//! SHA-256 verification of downloaded artifacts.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::error::KeeperError;

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare a file against its published digest; any difference is fatal.
pub fn verify_sha256(path: &Path, asset: &str, expected: &str) -> anyhow::Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(KeeperError::DigestMismatch {
            asset: asset.to_string(),
            expected: expected.trim().to_string(),
            actual,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    fn fixture(content: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("artifact.zip");
        std::fs::write(&path, content).expect("write");
        (dir, path)
    }

    #[test]
    fn known_digest() {
        let (_dir, path) = fixture(b"abc");
        assert_eq!(
            sha256_file(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn matching_digest_passes_in_any_case() {
        let (_dir, path) = fixture(b"abc");
        verify_sha256(
            &path,
            "artifact.zip",
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD",
        )
        .expect("should verify");
    }

    #[test]
    fn single_character_change_fails() {
        let (_dir, path) = fixture(b"abc");
        let err = verify_sha256(
            &path,
            "artifact.zip",
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ae",
        )
        .unwrap_err();
        assert_eq!(KeeperError::classify(&err), ErrorClass::Verification);
        assert!(err.to_string().contains("sha256 mismatch for artifact.zip"));
    }
}
