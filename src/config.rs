//! Dotenv-style configuration snapshots.
//!
//! A [`Config`] is an immutable key→string map loaded from `KEY=value`
//! lines. The web server holds one and hands a reference to every request
//! handler; the framework itself interprets no keys.
//!
//! Accepted syntax: `#` comment lines, unquoted values, single- or
//! double-quoted values, and the escapes `\n \r \t \\ \"` inside double
//! quotes only.

use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;

/// An immutable key→string configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    /// Empty configuration.
    pub fn new() -> Self {
        Config::default()
    }

    /// Load configuration from a dotenv-style file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Ok(Self::from_str_lossy(&contents))
    }

    /// Parse configuration from in-memory text. Lines that do not look like
    /// assignments are skipped.
    pub fn from_str_lossy(contents: &str) -> Self {
        let mut values = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            values.insert(key.to_string(), unquote(value.trim()));
        }
        Config { values }
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up a key, falling back to `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Iterate over all key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Insert a value, replacing any previous one. Intended for embedding
    /// applications that assemble configuration programmatically.
    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

/// Strip surrounding quotes; apply backslash escapes inside double quotes.
fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && (first == b'\'' || first == b'"') {
            let inner = &value[1..value.len() - 1];
            if first == b'\'' {
                return inner.to_string();
            }
            return unescape(inner);
        }
    }
    value.to_string()
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => {
                // Unknown escape: keep both characters verbatim.
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
