//! TOML parser with helpful error messages

use super::schema::KeeperConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse nodekeeper.toml with detailed error messages
pub fn parse_keeper_toml(path: &Path) -> Result<KeeperConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_keeper_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse nodekeeper.toml content from string
pub fn parse_keeper_toml_str(content: &str) -> Result<KeeperConfig> {
    let config: KeeperConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;

    config.validate()?;

    Ok(config)
}

/// Enhance TOML parsing errors with the offending line
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let error_msg = error.to_string();

    let Some(span) = error.span() else {
        return anyhow::anyhow!("TOML parsing error: {}", error_msg);
    };

    let line_num = content[..span.start.min(content.len())]
        .bytes()
        .filter(|b| *b == b'\n')
        .count()
        + 1;
    let context = get_line_context(content, line_num);
    anyhow::anyhow!(
        "TOML parsing error at line {}:\n{}\n\nError: {}",
        line_num,
        context,
        error_msg
    )
}

/// Get context lines around an error
fn get_line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2);
    let end = (line_num + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration to TOML string
pub fn to_toml(config: &KeeperConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_keeper_toml_str("").expect("empty config should parse");
        assert_eq!(config.release.arch, "amd64");
        assert_eq!(config.timeouts.download_secs, 600);
    }

    #[test]
    fn parse_error_points_at_line() {
        let err = parse_keeper_toml_str("[release]\narch = \n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "got: {err}");
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = KeeperConfig::default();
        config.release.repo = "example/node".to_string();
        let text = to_toml(&config).expect("serialize");
        let parsed = parse_keeper_toml_str(&text).expect("parse");
        assert_eq!(parsed.release.repo, "example/node");
    }
}
