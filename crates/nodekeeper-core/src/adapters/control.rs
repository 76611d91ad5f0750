//! HTTP client for the node's admin control API.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::http::{self, get_json};
use super::{ControlApi, HealthReport, NodeConfig, NodeEntry};
use crate::error::KeeperError;

const SOURCE: &str = "control API";

#[derive(Debug, Clone)]
pub struct HttpControlApi {
    base: String,
    client: reqwest::Client,
}

impl HttpControlApi {
    pub fn new(base: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base: base.into(),
            client: http::client(timeout)?,
        })
    }
}

/// Node listing entry as served by the admin API
#[derive(Debug, Deserialize)]
struct WireNode {
    node: WireNodeSpec,
    #[serde(default)]
    state: Option<WireNodeState>,
}

#[derive(Debug, Deserialize)]
struct WireNodeSpec {
    id: String,
    host: String,
    #[serde(default)]
    models: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireNodeState {
    #[serde(default)]
    current_status: Option<String>,
    #[serde(default)]
    admin_state: Option<WireAdminState>,
}

#[derive(Debug, Deserialize)]
struct WireAdminState {
    enabled: bool,
}

impl From<WireNode> for NodeEntry {
    fn from(wire: WireNode) -> Self {
        let (status, enabled) = match wire.state {
            Some(state) => (
                state.current_status,
                state.admin_state.map(|a| a.enabled),
            ),
            None => (None, None),
        };
        NodeEntry {
            id: wire.node.id,
            host: wire.node.host,
            models: wire.node.models.into_keys().collect(),
            status,
            enabled,
        }
    }
}

pub(crate) fn parse_nodes(value: serde_json::Value) -> anyhow::Result<Vec<NodeEntry>> {
    let wire: Vec<WireNode> =
        serde_json::from_value(value).context("Failed to parse node listing")?;
    Ok(wire.into_iter().map(NodeEntry::from).collect())
}

pub(crate) fn parse_health_report(value: serde_json::Value) -> anyhow::Result<HealthReport> {
    let mut report: HealthReport =
        serde_json::from_value(value.clone()).context("Failed to parse health report")?;
    report.raw = value;
    Ok(report)
}

#[async_trait]
impl ControlApi for HttpControlApi {
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeEntry>> {
        let url = http::join(&self.base, "admin/v1/nodes");
        let value: serde_json::Value = get_json(&self.client, SOURCE, &url).await?;
        parse_nodes(value)
    }

    async fn set_node_enabled(&self, node_id: &str, enabled: bool) -> anyhow::Result<()> {
        let action = if enabled { "enable" } else { "disable" };
        let url = http::join(&self.base, &format!("admin/v1/nodes/{}/{}", node_id, action));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| KeeperError::unreachable(SOURCE, e))
            .with_context(|| format!("Failed to {} node {}", action, node_id))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Failed to {} node {}: HTTP {} {}",
                action,
                node_id,
                status,
                body.trim()
            );
        }
        Ok(())
    }

    async fn fetch_config(&self) -> anyhow::Result<NodeConfig> {
        let url = http::join(&self.base, "admin/v1/config");
        get_json(&self.client, SOURCE, &url).await
    }

    async fn fetch_health_report(&self) -> anyhow::Result<HealthReport> {
        let url = http::join(&self.base, "admin/v1/health");
        let value: serde_json::Value = get_json(&self.client, SOURCE, &url).await?;
        parse_health_report(value)
    }
}
