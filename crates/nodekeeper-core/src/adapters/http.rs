//! Shared HTTP plumbing for the adapters.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::error::KeeperError;

pub const USER_AGENT: &str = concat!("nodekeeper/", env!("CARGO_PKG_VERSION"));

/// Build a client whose every request is bounded by `timeout`
pub fn client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Join an endpoint base with a path, tolerating trailing slashes
pub fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// GET a JSON document; transport failures surface as `Unreachable`.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    source_name: &'static str,
    url: &str,
) -> anyhow::Result<T> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| KeeperError::unreachable(source_name, e))
        .with_context(|| format!("Failed to fetch {}", url))?;

    if !response.status().is_success() {
        return Err(KeeperError::unreachable(
            source_name,
            format!("HTTP {} from {}", response.status(), url),
        )
        .into());
    }

    response
        .json::<T>()
        .await
        .with_context(|| format!("Failed to parse response from {}", url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_normalizes_slashes() {
        assert_eq!(join("http://h:1/", "/status"), "http://h:1/status");
        assert_eq!(join("http://h:1", "status"), "http://h:1/status");
    }
}
