//! Privileged filesystem operations.
//!
//! The deployment tree is usually owned by root (containers write into it),
//! while nodekeeper runs as an operator account. Reads and moves try the
//! plain syscall first and escalate through `sudo -n` when allowed.

use std::ffi::{OsStr, OsString};
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;

use anyhow::Context;

use crate::config::PrivilegeMode;

#[derive(Debug, Clone)]
pub struct Privilege {
    mode: PrivilegeMode,
    program: OsString,
}

impl Privilege {
    pub fn new(mode: PrivilegeMode) -> Self {
        Self {
            mode,
            program: OsString::from("sudo"),
        }
    }

    /// Escalate through `program` instead of `sudo`; it is invoked as
    /// `program -n <command...>`.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn mode(&self) -> PrivilegeMode {
        self.mode
    }

    /// Read a file, escalating on permission failure.
    pub fn read(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        if self.mode != PrivilegeMode::Sudo {
            match std::fs::read(path) {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.kind() == ErrorKind::PermissionDenied && self.can_escalate() => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to read {}", path.display()));
                }
            }
        }
        let output = self.sudo(&[OsStr::new("cat"), path.as_os_str()])
            .with_context(|| format!("Failed to read {} with sudo", path.display()))?;
        Ok(output)
    }

    /// Remove a file, escalating on permission failure.
    pub fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
        if self.mode != PrivilegeMode::Sudo {
            match std::fs::remove_file(path) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::PermissionDenied && self.can_escalate() => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to remove {}", path.display()));
                }
            }
        }
        self.sudo(&[OsStr::new("rm"), OsStr::new("-f"), path.as_os_str()])
            .with_context(|| format!("Failed to remove {} with sudo", path.display()))?;
        Ok(())
    }

    /// Create a directory tree, escalating on permission failure.
    pub fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        if self.mode != PrivilegeMode::Sudo {
            match std::fs::create_dir_all(path) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::PermissionDenied && self.can_escalate() => {}
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Failed to create directory {}", path.display())
                    });
                }
            }
        }
        self.sudo(&[OsStr::new("mkdir"), OsStr::new("-p"), path.as_os_str()])
            .with_context(|| format!("Failed to create {} with sudo", path.display()))?;
        Ok(())
    }

    /// Move `src` to `dst` and mark it executable.
    ///
    /// Falls back to copy + delete when the rename crosses filesystems.
    pub fn install_executable(&self, src: &Path, dst: &Path) -> anyhow::Result<()> {
        if self.mode != PrivilegeMode::Sudo {
            match move_file(src, dst).and_then(|()| set_executable(dst)) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::PermissionDenied && self.can_escalate() => {}
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Failed to move {} to {}", src.display(), dst.display())
                    });
                }
            }
        }
        self.sudo(&[OsStr::new("mv"), OsStr::new("-f"), src.as_os_str(), dst.as_os_str()])
            .with_context(|| format!("Failed to move {} with sudo", dst.display()))?;
        self.sudo(&[OsStr::new("chmod"), OsStr::new("0755"), dst.as_os_str()])
            .with_context(|| format!("Failed to chmod {} with sudo", dst.display()))?;
        Ok(())
    }

    /// Point the symlink `link` at `target`, replacing any existing link.
    ///
    /// `target` is stored as given; pass a relative path to keep the tree
    /// relocatable.
    pub fn relink(&self, target: &Path, link: &Path) -> anyhow::Result<()> {
        if self.mode != PrivilegeMode::Sudo {
            match replace_symlink(target, link) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::PermissionDenied && self.can_escalate() => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to relink {}", link.display()));
                }
            }
        }
        self.sudo(&[
            OsStr::new("ln"),
            OsStr::new("-sfn"),
            target.as_os_str(),
            link.as_os_str(),
        ])
        .with_context(|| format!("Failed to relink {} with sudo", link.display()))?;
        Ok(())
    }

    fn can_escalate(&self) -> bool {
        self.mode == PrivilegeMode::Auto
    }

    fn sudo(&self, args: &[&OsStr]) -> anyhow::Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .arg("-n")
            .args(args)
            .output()
            .with_context(|| format!("Failed to invoke {}", self.program.to_string_lossy()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("sudo {:?} failed: {}", args, stderr.trim());
        }
        Ok(output.stdout)
    }
}

/// Whether `err` bottoms out in a missing file or directory
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == ErrorKind::NotFound)
    })
}

/// Rename, or copy then delete when source and destination are on
/// different devices.
pub fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device_os_error(&err) => {
            std::fs::copy(src, dst)?;
            std::fs::remove_file(src)
        }
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn replace_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    if std::fs::symlink_metadata(link).is_ok_and(|m| m.file_type().is_symlink()) {
        std::fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn replace_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        "symlinks are only managed on unix",
    ))
}

#[cfg(unix)]
pub fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn is_cross_device_os_error(err: &std::io::Error) -> bool {
    let Some(code) = err.raw_os_error() else {
        return false;
    };

    #[cfg(unix)]
    {
        const EXDEV: i32 = 18;
        code == EXDEV
    }

    #[cfg(windows)]
    {
        const ERROR_NOT_SAME_DEVICE: i32 = 17;
        code == ERROR_NOT_SAME_DEVICE
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = code;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_device_error_detected() {
        #[cfg(unix)]
        {
            let exdev = std::io::Error::from_raw_os_error(18);
            assert!(is_cross_device_os_error(&exdev));
        }
        let other = std::io::Error::new(ErrorKind::NotFound, "missing");
        assert!(!is_cross_device_os_error(&other));
    }

    #[test]
    fn install_executable_moves_and_sets_mode() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let src = tmp.path().join("staged");
        let dst = tmp.path().join("bin").join("inferenced");
        std::fs::create_dir_all(dst.parent().expect("parent")).expect("mkdir");
        std::fs::write(&src, b"binary").expect("write");

        Privilege::new(PrivilegeMode::Never)
            .install_executable(&src, &dst)
            .expect("install should succeed");

        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).expect("read"), b"binary");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dst).expect("stat").permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[cfg(unix)]
    #[test]
    fn relink_replaces_dangling_link_with_relative_target() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let cosmovisor = tmp.path().join("cosmovisor");
        std::fs::create_dir_all(cosmovisor.join("upgrades").join("v0.2.10")).expect("mkdir");
        let link = cosmovisor.join("current");
        std::os::unix::fs::symlink("upgrades/v0.2.99", &link).expect("symlink");

        Privilege::new(PrivilegeMode::Never)
            .relink(Path::new("upgrades/v0.2.10"), &link)
            .expect("relink should succeed");

        assert_eq!(
            std::fs::read_link(&link).expect("readlink"),
            Path::new("upgrades/v0.2.10")
        );
        assert!(link.exists());
    }

    #[cfg(unix)]
    #[test]
    fn read_missing_file_is_not_found_without_escalation() {
        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let escalation = crate::testing::FakeEscalation::install(tmp.path(), tmp.path());
        let err = Privilege::new(PrivilegeMode::Auto)
            .with_program(&escalation.program)
            .read(&tmp.path().join("absent"))
            .unwrap_err();
        assert!(is_not_found(&err));
        assert!(escalation.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn read_escalates_when_parent_is_not_traversable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().expect("tempdir should succeed");
        let data = tmp.path().join("data");
        std::fs::create_dir(&data).expect("mkdir");
        std::fs::write(data.join("upgrade-info.json"), b"{}").expect("write");
        std::fs::set_permissions(&data, std::fs::Permissions::from_mode(0o000)).expect("chmod");
        let escalation = crate::testing::FakeEscalation::install(tmp.path(), &data);
        let plain_read_denied = std::fs::read(data.join("upgrade-info.json")).is_err();

        let bytes = Privilege::new(PrivilegeMode::Auto)
            .with_program(&escalation.program)
            .read(&data.join("upgrade-info.json"))
            .expect("read should succeed");

        assert_eq!(bytes, b"{}");
        if plain_read_denied {
            assert_eq!(escalation.calls().len(), 1);
            assert!(escalation.calls()[0].starts_with("-n cat "));
        }
    }
}
