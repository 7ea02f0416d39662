use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::core::errors::{PocketError, Result};
use crate::modules::TargetType;

/// Prefix that switches a target field into multi-target (file) mode.
pub const FILE_SCHEME: &str = "file://";

pub fn is_file_target(value: &str) -> bool {
    value.starts_with(FILE_SCHEME)
}

/// One raw target string parsed for the module's target type.
///
/// For tcp the raw string is split into host and an optional port override;
/// for http the raw string is carried verbatim as the URL. No validation of
/// the parsed pieces happens here; an empty host is still dispatched and the
/// module decides what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub raw: String,
    pub endpoint: String,
    pub port: Option<String>,
}

pub fn parse_target(raw: &str, target_type: TargetType) -> ResolvedTarget {
    match target_type {
        TargetType::Tcp => match raw.split_once(':') {
            Some((host, port)) => ResolvedTarget {
                raw: raw.to_string(),
                endpoint: host.to_string(),
                port: Some(port.to_string()),
            },
            None => ResolvedTarget {
                raw: raw.to_string(),
                endpoint: raw.to_string(),
                port: None,
            },
        },
        TargetType::Http => ResolvedTarget {
            raw: raw.to_string(),
            endpoint: raw.to_string(),
            port: None,
        },
    }
}

/// Read a newline-separated target list: trim whitespace, drop blank lines,
/// keep order and duplicates. A `file://` prefix on the path is stripped.
pub fn load_target_file(value: &str) -> Result<Vec<String>> {
    let path = Path::new(value.strip_prefix(FILE_SCHEME).unwrap_or(value));

    let file = File::open(path).map_err(|source| PocketError::TargetFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut targets = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| PocketError::TargetFile {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            targets.push(trimmed.to_string());
        }
    }

    tracing::debug!("Loaded {} targets from {}", targets.len(), path.display());
    Ok(targets)
}
