use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse a hosts list: one hostname per line.
///
/// - surrounding whitespace is trimmed
/// - comments: everything after `#` is ignored
/// - blank lines are ignored
///
/// Order and duplicates are preserved; every observation is recorded on its own.
pub fn parse_hosts_str(s: &str) -> Vec<String> {
    s.lines()
        .filter_map(|raw| {
            let line = raw.split('#').next().map(str::trim).unwrap_or("");
            (!line.is_empty()).then(|| line.to_string())
        })
        .collect()
}

/// Load a hosts list from a file path. Errors if the file cannot be read.
pub fn load_hosts_from_path(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read hosts file: {}", path.as_ref().display()))?;
    Ok(parse_hosts_str(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_lines() {
        let hosts = parse_hosts_str("example.com\n  example.org  \nwww.example.net\n");
        assert_eq!(hosts, vec!["example.com", "example.org", "www.example.net"]);
    }

    #[test]
    fn parse_with_comments_and_blanks() {
        let input = r#"
            # top sites
            google.com   # search

            wikipedia.org
        "#;
        assert_eq!(parse_hosts_str(input), vec!["google.com", "wikipedia.org"]);
    }

    #[test]
    fn missing_file_errors() {
        assert!(load_hosts_from_path("/definitely/not/here.txt").is_err());
    }
}
