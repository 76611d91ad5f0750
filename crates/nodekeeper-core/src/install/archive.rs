//! Single-entry extraction from release archives.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::Context;

use crate::error::KeeperError;

/// Largest entry we are willing to extract
pub const MAX_ENTRY_BYTES: u64 = 500 * 1024 * 1024;

/// Extract the entry whose base filename is `binary_name` into `dest`.
///
/// Directory prefixes inside the archive are ignored. Reading stops one byte
/// past `cap`, so an entry that lies about its size still cannot fill the
/// disk.
pub fn extract_entry(archive: &Path, binary_name: &str, dest: &Path, cap: u64) -> anyhow::Result<u64> {
    let archive_label = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| archive.display().to_string());

    let file = std::fs::File::open(archive)
        .with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read {} as zip archive", archive_label))?;

    let index = (0..zip.len()).find(|&i| {
        zip.by_index(i)
            .map(|entry| !entry.is_dir() && base_name(entry.name()) == binary_name)
            .unwrap_or(false)
    });
    let Some(index) = index else {
        return Err(KeeperError::ArchiveEntryMissing {
            archive: archive_label,
            entry: binary_name.to_string(),
        }
        .into());
    };

    let entry = zip
        .by_index(index)
        .with_context(|| format!("Failed to read zip entry {}", index))?;

    let mut limited = entry.take(cap + 1);
    let mut out = std::fs::File::create(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let copied = std::io::copy(&mut limited, &mut out)
        .with_context(|| format!("Failed to extract {} from {}", binary_name, archive_label))?;
    if copied > cap {
        drop(out);
        let _ = std::fs::remove_file(dest);
        return Err(KeeperError::ArchiveEntryTooLarge {
            entry: binary_name.to_string(),
            limit: cap,
        }
        .into());
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(copied)
}

fn base_name(entry_name: &str) -> &str {
    entry_name.rsplit('/').next().unwrap_or(entry_name)
}
