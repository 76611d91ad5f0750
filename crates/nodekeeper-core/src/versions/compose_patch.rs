//! Surgical image tag edits on compose text.
//!
//! The file is never parsed and re-serialized: only the tag characters of
//! matching `image:` values change, so comments and formatting survive.

/// Tag of the first live `image:` line referencing `artifact`
pub fn current_tag(content: &str, artifact: &str) -> Option<String> {
    let prefix = format!("{}:", artifact);
    content
        .lines()
        .filter(|line| is_image_line(line))
        .find_map(|line| find_tag(line, &prefix).map(|(start, end)| line[start..end].to_string()))
}

/// Set the tag of every live `image:` line referencing `prefix`.
///
/// `prefix` is the artifact name with its trailing colon, e.g. `proxy:`. It
/// only matches at a name boundary, so `proxy:` leaves `ssl-proxy:` and
/// `proxy-ssl:` alone. Commented-out lines are never touched.
pub fn replace_image_tag(content: &str, prefix: &str, new_tag: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        if is_image_line(line)
            && let Some((start, end)) = find_tag(line, prefix)
        {
            out.push_str(&line[..start]);
            out.push_str(new_tag);
            out.push_str(&line[end..]);
        } else {
            out.push_str(line);
        }
    }
    out
}

fn is_image_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return false;
    }
    trimmed
        .strip_prefix("- ")
        .unwrap_or(trimmed)
        .trim_start()
        .starts_with("image:")
}

/// Byte range of the tag following a boundary-anchored `prefix`
fn find_tag(line: &str, prefix: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(pos) = line[from..].find(prefix) {
        let at = from + pos;
        let boundary = line[..at]
            .chars()
            .next_back()
            .is_none_or(|c| c == '/' || c == '"' || c == '\'' || c.is_whitespace());
        if boundary {
            let start = at + prefix.len();
            let len = line[start..]
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '#')
                .unwrap_or(line.len() - start);
            if len > 0 {
                return Some((start, start + len));
            }
        }
        from = at + prefix.len();
    }
    None
}
