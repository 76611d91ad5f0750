//! Error taxonomy shared by every operational flow.
//!
//! Operations return `anyhow::Result` with context attached at each external
//! call. The root cause of a failure that callers need to react to is one of
//! the [`KeeperError`] variants below, recoverable with [`KeeperError::classify`].

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("{source_name} unreachable: {message}")]
    Unreachable {
        source_name: &'static str,
        message: String,
    },

    #[error("sha256 mismatch for {asset}: expected {expected}, got {actual}")]
    DigestMismatch {
        asset: String,
        expected: String,
        actual: String,
    },

    #[error("no published digest for {asset} and digest policy requires one")]
    DigestRequired { asset: String },

    #[error("release {release} has no asset named {asset}")]
    AssetMissing { release: String, asset: String },

    #[error("archive {archive} has no entry named {entry}")]
    ArchiveEntryMissing { archive: String, entry: String },

    #[error("archive entry {entry} exceeds the {limit} byte extraction cap")]
    ArchiveEntryTooLarge { entry: String, limit: u64 },

    #[error("timed out after {waited:?} waiting for {what}")]
    PollTimeout { what: String, waited: Duration },

    #[error("{what} cancelled")]
    Cancelled { what: String },

    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

/// Coarse classification used to decide between aborting and degrading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Source could not be reached; the affected field stays unknown
    Transient,
    /// Integrity or required-artifact failure; the operation aborts
    Verification,
    /// A bounded wait expired or was cancelled; reported, not fatal
    Timeout,
    /// Anything else
    Operational,
}

impl KeeperError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unreachable { .. } => ErrorClass::Transient,
            Self::DigestMismatch { .. }
            | Self::DigestRequired { .. }
            | Self::AssetMissing { .. }
            | Self::ArchiveEntryMissing { .. }
            | Self::ArchiveEntryTooLarge { .. } => ErrorClass::Verification,
            Self::PollTimeout { .. } | Self::Cancelled { .. } => ErrorClass::Timeout,
            Self::InvalidConfig { .. } => ErrorClass::Operational,
        }
    }

    /// Walk an error chain and return the first `KeeperError` class found.
    pub fn classify(err: &anyhow::Error) -> ErrorClass {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<KeeperError>())
            .map(KeeperError::class)
            .unwrap_or(ErrorClass::Operational)
    }

    pub fn unreachable(source_name: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unreachable {
            source_name,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn classify_finds_root_cause_through_context() {
        let err = Err::<(), _>(KeeperError::DigestMismatch {
            asset: "inferenced-amd64.zip".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        })
        .context("Failed to verify download")
        .context("Repair aborted")
        .unwrap_err();

        assert_eq!(KeeperError::classify(&err), ErrorClass::Verification);
    }

    #[test]
    fn classify_defaults_to_operational() {
        let err = anyhow::anyhow!("plain failure");
        assert_eq!(KeeperError::classify(&err), ErrorClass::Operational);
    }

    #[test]
    fn poll_timeout_is_not_a_verification_failure() {
        let err = KeeperError::PollTimeout {
            what: "model readiness".to_string(),
            waited: Duration::from_secs(900),
        };
        assert_eq!(err.class(), ErrorClass::Timeout);
    }
}
