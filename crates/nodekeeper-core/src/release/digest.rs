//! Digest strings published alongside release assets.

/// Normalize a published digest.
///
/// A `sha256:` prefix is stripped; any other value passes through unchanged.
/// Blank values mean no digest was published.
pub fn parse_digest(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(raw.strip_prefix("sha256:").unwrap_or(raw).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sha256_prefix() {
        assert_eq!(
            parse_digest(Some("sha256:abc123")).as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn passes_through_bare_digest() {
        assert_eq!(parse_digest(Some("abc123")).as_deref(), Some("abc123"));
        assert_eq!(
            parse_digest(Some("sha512:ffff")).as_deref(),
            Some("sha512:ffff")
        );
    }

    #[test]
    fn blank_or_missing_means_none() {
        assert_eq!(parse_digest(None), None);
        assert_eq!(parse_digest(Some("  ")), None);
    }
}
