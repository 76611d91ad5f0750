//! Tendermint / CometBFT RPC client.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::http::{self, get_json};
use super::{ChainRpc, SyncStatus, Validator};

const SOURCE: &str = "chain RPC";

#[derive(Debug, Clone)]
pub struct HttpChainRpc {
    base: String,
    client: reqwest::Client,
}

impl HttpChainRpc {
    pub fn new(base: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base: base.into(),
            client: http::client(timeout)?,
        })
    }

    async fn call(&self, path: &str) -> anyhow::Result<Value> {
        let url = http::join(&self.base, path);
        let value: Value = get_json(&self.client, SOURCE, &url).await?;
        Ok(unwrap_result(value))
    }
}

/// JSON-RPC responses wrap the payload in `result`; some proxies strip it.
fn unwrap_result(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// RPC integers are encoded as strings
fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    #[serde(default)]
    node_info: Option<WireNodeInfo>,
    sync_info: WireSyncInfo,
    #[serde(default)]
    validator_info: Option<WireValidatorInfo>,
}

#[derive(Debug, Deserialize)]
struct WireNodeInfo {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSyncInfo {
    latest_block_height: Value,
    #[serde(default)]
    latest_block_time: Option<String>,
    #[serde(default)]
    catching_up: bool,
}

#[derive(Debug, Deserialize)]
struct WireValidatorInfo {
    #[serde(default)]
    address: Option<String>,
}

pub(crate) fn parse_status(value: Value) -> anyhow::Result<SyncStatus> {
    let wire: WireStatus =
        serde_json::from_value(unwrap_result(value)).context("Failed to parse /status")?;
    let latest_block_height = parse_u64(&wire.sync_info.latest_block_height)
        .ok_or_else(|| anyhow::anyhow!("Invalid latest_block_height in /status"))?;
    Ok(SyncStatus {
        latest_block_height,
        latest_block_time: wire.sync_info.latest_block_time,
        catching_up: wire.sync_info.catching_up,
        consensus_version: wire.node_info.and_then(|n| n.version),
        validator_address: wire.validator_info.and_then(|v| v.address),
    })
}

/// Application version from `/abci_info`; blank means the app did not say
pub(crate) fn parse_app_version(value: Value) -> anyhow::Result<Option<String>> {
    let value = unwrap_result(value);
    let response = value
        .get("response")
        .ok_or_else(|| anyhow::anyhow!("Missing response in /abci_info"))?;
    Ok(response
        .get("version")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string))
}

pub(crate) fn parse_peer_count(value: Value) -> anyhow::Result<u32> {
    let value = unwrap_result(value);
    value
        .get("n_peers")
        .and_then(parse_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| anyhow::anyhow!("Missing n_peers in /net_info"))
}

pub(crate) fn parse_validators(value: Value) -> anyhow::Result<Vec<Validator>> {
    let value = unwrap_result(value);
    let list = value
        .get("validators")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("Missing validators in /validators"))?;

    list.iter()
        .map(|v| {
            let address = v
                .get("address")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow::anyhow!("Validator without address"))?;
            let voting_power = v.get("voting_power").and_then(parse_u64).unwrap_or(0);
            Ok(Validator {
                address: address.to_string(),
                voting_power,
            })
        })
        .collect()
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn sync_status(&self) -> anyhow::Result<SyncStatus> {
        parse_status(self.call("status").await?)
    }

    async fn app_version(&self) -> anyhow::Result<Option<String>> {
        parse_app_version(self.call("abci_info").await?)
    }

    async fn peer_count(&self) -> anyhow::Result<u32> {
        parse_peer_count(self.call("net_info").await?)
    }

    async fn validators(&self) -> anyhow::Result<Vec<Validator>> {
        parse_validators(self.call("validators?per_page=100").await?)
    }
}
