//! `docker compose` implementation of the container runtime contract.

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ContainerRuntime;

#[derive(Debug, Clone)]
pub struct ComposeCli {
    program: OsString,
    compose_file: PathBuf,
    project_dir: PathBuf,
}

impl ComposeCli {
    pub fn new(compose_file: PathBuf, project_dir: PathBuf) -> Self {
        Self {
            program: OsString::from("docker"),
            compose_file,
            project_dir,
        }
    }

    /// Run `program` in place of `docker`
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_file.to_string_lossy().to_string(),
        ]
    }

    async fn run(&self, args: &[&str]) -> anyhow::Result<String> {
        let mut full = self.base_args();
        full.extend(args.iter().map(|s| s.to_string()));
        debug!(args = ?full, "docker");

        // dropping this future (timeout, interrupt) kills the child
        let output = Command::new(&self.program)
            .args(&full)
            .current_dir(&self.project_dir)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run docker {:?}", args))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("docker compose {:?} failed: {}", args, stderr.trim());
        }
        // compose writes logs to stdout and progress to stderr
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Arguments for `up`; an empty service list recreates the whole project.
pub(crate) fn up_args<'a>(services: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec!["up", "-d", "--force-recreate"];
    if !services.is_empty() {
        args.push("--no-deps");
        args.extend_from_slice(services);
    }
    args
}

#[async_trait]
impl ContainerRuntime for ComposeCli {
    async fn stop(&self, service: &str) -> anyhow::Result<()> {
        self.run(&["stop", service]).await.map(|_| ())
    }

    async fn start(&self, services: &[&str]) -> anyhow::Result<()> {
        self.run(&up_args(services)).await.map(|_| ())
    }

    async fn pull(&self) -> anyhow::Result<()> {
        self.run(&["pull"]).await.map(|_| ())
    }

    async fn logs(&self, service: &str, lines: usize) -> anyhow::Result<Vec<String>> {
        let tail = lines.to_string();
        let out = self
            .run(&["logs", "--no-color", "--no-log-prefix", "--tail", &tail, service])
            .await?;
        Ok(out.lines().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_targets_named_services_without_deps() {
        assert_eq!(
            up_args(&["mlnode"]),
            vec!["up", "-d", "--force-recreate", "--no-deps", "mlnode"]
        );
    }

    #[test]
    fn up_with_no_services_recreates_everything() {
        assert_eq!(up_args(&[]), vec!["up", "-d", "--force-recreate"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abandoned_pull_does_not_outlive_its_caller() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().expect("tempdir");
        let finished = dir.path().join("pull-finished");
        let program = dir.path().join("docker");
        std::fs::write(
            &program,
            format!("#!/bin/sh\nsleep 3\ntouch '{}'\n", finished.display()),
        )
        .expect("write fake docker");
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake docker");

        let cli = ComposeCli::new(dir.path().join("docker-compose.yml"), dir.path().to_path_buf())
            .with_program(&program);
        let result = tokio::time::timeout(Duration::from_millis(500), cli.pull()).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!finished.exists());
    }
}
