//! Failure-signature scan over recent service logs.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::adapters::ContainerRuntime;

use super::{Diagnosis, DiagnosisId, FixAction, Severity};

/// Lines of log tail inspected per run
pub const LOG_TAIL_LINES: usize = 200;

fn signature() -> &'static Regex {
    static SIGNATURE: OnceLock<Regex> = OnceLock::new();
    SIGNATURE.get_or_init(|| {
        Regex::new(r"(?i)missing for (v?\d+(?:\.\d+)+(?:-[0-9A-Za-z]+)*)")
            .expect("built-in log signature is a valid regex")
    })
}

/// Scans logs for the binary-missing panic of the upgrade coordinator
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPatternDiagnostic;

impl LogPatternDiagnostic {
    /// Upgrade token of the most recent signature match.
    ///
    /// Restart loops print the same panic over and over; only the last one
    /// reflects what the node is currently waiting for.
    pub fn last_upgrade_token<S: AsRef<str>>(&self, lines: &[S]) -> Option<String> {
        lines
            .iter()
            .flat_map(|line| signature().captures_iter(line.as_ref()))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .last()
    }

    pub fn diagnose<S: AsRef<str>>(&self, lines: &[S]) -> Option<Diagnosis> {
        let token = self.last_upgrade_token(lines)?;
        Some(Diagnosis {
            id: DiagnosisId::MissingBinary,
            severity: Severity::Critical,
            description: format!("node is halted waiting for the {} upgrade binary", token),
            fix: FixAction::InstallBinary,
            upgrade_name: Some(token),
        })
    }

    /// Fetch the log tail and scan it; unreadable logs yield no finding.
    pub async fn collect(&self, runtime: &dyn ContainerRuntime, service: &str) -> Option<Diagnosis> {
        match runtime.logs(service, LOG_TAIL_LINES).await {
            Ok(lines) => {
                debug!(service, lines = lines.len(), "scanning log tail");
                self.diagnose(&lines)
            }
            Err(err) => {
                warn!(service, error = %format!("{:#}", err), "could not read logs");
                None
            }
        }
    }
}
