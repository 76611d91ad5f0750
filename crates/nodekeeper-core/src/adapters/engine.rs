//! Inference engine health probe.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use super::http;
use super::{EngineHealth, EngineProbe};
use crate::error::KeeperError;

const SOURCE: &str = "inference engine";

#[derive(Debug, Clone)]
pub struct HttpEngineProbe {
    base: String,
    client: reqwest::Client,
}

impl HttpEngineProbe {
    pub fn new(base: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base: base.into(),
            client: http::client(timeout)?,
        })
    }
}

/// Interpret a health body served with HTTP 200.
///
/// Engines that answer with plain text are up but say nothing about the
/// model, so `model_loaded` stays false until a structured answer says so.
pub(crate) fn parse_health(body: &str) -> EngineHealth {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return EngineHealth {
            healthy: true,
            model_loaded: false,
            model: None,
        };
    };

    let model = value
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string);
    let model_loaded = value
        .get("model_loaded")
        .and_then(Value::as_bool)
        .or_else(|| {
            value
                .get("status")
                .and_then(Value::as_str)
                .map(|s| s.eq_ignore_ascii_case("loaded") || s.eq_ignore_ascii_case("ready"))
        })
        .unwrap_or(false);

    EngineHealth {
        healthy: true,
        model_loaded,
        model,
    }
}

#[async_trait]
impl EngineProbe for HttpEngineProbe {
    async fn health(&self) -> anyhow::Result<EngineHealth> {
        let url = http::join(&self.base, "health");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| KeeperError::unreachable(SOURCE, e))
            .with_context(|| format!("Failed to probe {}", url))?;

        if !response.status().is_success() {
            return Ok(EngineHealth {
                healthy: false,
                model_loaded: false,
                model: None,
            });
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        Ok(parse_health(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_body_reports_model() {
        let health = parse_health(r#"{"model_loaded": true, "model": "Qwen/Qwen3-32B-FP8"}"#);
        assert!(health.model_loaded);
        assert_eq!(health.model.as_deref(), Some("Qwen/Qwen3-32B-FP8"));
    }

    #[test]
    fn status_field_is_understood() {
        assert!(parse_health(r#"{"status": "READY"}"#).model_loaded);
        assert!(!parse_health(r#"{"status": "loading"}"#).model_loaded);
    }

    #[test]
    fn plain_text_means_up_but_unknown_model() {
        let health = parse_health("OK");
        assert!(health.healthy);
        assert!(!health.model_loaded);
    }
}
