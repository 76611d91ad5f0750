//! Where the latest published tag of each service comes from.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::http;

#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Latest tag keyed by compose service name
    async fn latest(&self) -> anyhow::Result<BTreeMap<String, String>>;
}

/// JSON object `{ "<service>": "<tag>" }` served over HTTP
#[derive(Debug, Clone)]
pub struct HttpVersionManifest {
    url: String,
    client: reqwest::Client,
}

impl HttpVersionManifest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            url: url.into(),
            client: http::client(timeout)?,
        })
    }
}

#[async_trait]
impl VersionSource for HttpVersionManifest {
    async fn latest(&self) -> anyhow::Result<BTreeMap<String, String>> {
        http::get_json(&self.client, "version manifest", &self.url).await
    }
}
