//! Input locator parsing
//!
//! A locator is a URL-like string naming a task's input, e.g.
//! `http://node7/data/part-0`. The host component decides locality:
//! it is compared against node identities by the placement policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LocusError;

/// Scheme assigned to schemeless (local) paths
pub const LOCAL_SCHEME: &str = "file";

/// Parsed form of a task's input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputLocator {
    /// URL scheme, lowercased (`file` for plain paths)
    pub scheme: String,
    /// Network host, without userinfo or port; empty for local inputs
    pub host: String,
    /// Port, if the netloc carried one
    pub port: Option<u16>,
    /// Everything after the netloc, including any query or fragment
    pub path: String,
    raw: String,
}

impl InputLocator {
    /// Parse a locator string
    pub fn parse(raw: &str) -> Result<Self, LocusError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LocusError::InvalidLocator("empty locator".to_string()));
        }

        let Some((scheme, rest)) = split_scheme(trimmed) else {
            return Ok(Self {
                scheme: LOCAL_SCHEME.to_string(),
                host: String::new(),
                port: None,
                path: trimmed.to_string(),
                raw: trimmed.to_string(),
            });
        };

        if scheme == LOCAL_SCHEME {
            return Ok(Self {
                scheme,
                host: String::new(),
                port: None,
                path: rest.to_string(),
                raw: trimmed.to_string(),
            });
        }

        // The netloc ends at the first path, query or fragment delimiter.
        let (netloc, path) = match rest.find(['/', '?', '#']) {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        let (host, port) = split_host_port(netloc);

        Ok(Self {
            scheme,
            host,
            port,
            path: path.to_string(),
            raw: trimmed.to_string(),
        })
    }

    /// Whether the input lives on a network host
    pub fn is_remote(&self) -> bool {
        !self.host.is_empty()
    }

    /// The locator as originally given
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Returns `(scheme, rest)` when the string starts with `scheme://`
fn split_scheme(s: &str) -> Option<(String, &str)> {
    let idx = s.find("://")?;
    let scheme = &s[..idx];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some((scheme.to_ascii_lowercase(), &s[idx + 3..]))
}

fn split_host_port(netloc: &str) -> (String, Option<u16>) {
    // userinfo@host:port
    let hostport = match netloc.rfind('@') {
        Some(idx) => &netloc[idx + 1..],
        None => netloc,
    };

    if let Some(stripped) = hostport.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            let host = &stripped[..end];
            let port = stripped[end + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse().ok());
            return (host.to_string(), port);
        }
    }

    match hostport.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (hostport.to_string(), None),
        },
        None => (hostport.to_string(), None),
    }
}

impl FromStr for InputLocator {
    type Err = LocusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for InputLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
