//! Verified artifact installation.

pub mod archive;
pub mod download;
pub mod installer;
pub mod verify;

pub use archive::{MAX_ENTRY_BYTES, extract_entry};
pub use download::{Downloader, HttpDownloader};
pub use installer::{ArtifactInstaller, InstallReport, InstalledBinary};
pub use verify::{sha256_file, verify_sha256};
