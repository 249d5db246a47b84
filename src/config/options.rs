// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::*;
use crate::errors::LoadError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Scan-wide options.
///
/// Every field has a default so a partial file (or none at all) is valid.
///
/// # Example
/// ```yaml
/// concurrency: 50
/// payload_concurrency: 4
/// timeout_seconds: 5
/// max_host_error: 10
/// follow_redirects: true
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanOptions {
    pub concurrency: usize,
    pub payload_concurrency: usize,
    pub timeout_seconds: u64,
    /// Zero disables the host-errors circuit breaker.
    pub max_host_error: usize,
    pub host_errors_cache_size: usize,
    pub interactions_cache_size: usize,
    pub disable_clustering: bool,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Logs every matcher evaluation at debug level.
    pub debug: bool,
    /// Stops a request's remaining variations after its first match.
    pub stop_at_first_match: bool,
    /// Accepts invalid TLS certificates.
    pub insecure: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            payload_concurrency: DEFAULT_PAYLOAD_CONCURRENCY,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_host_error: DEFAULT_MAX_HOST_ERROR,
            host_errors_cache_size: DEFAULT_HOST_ERRORS_CACHE_SIZE,
            interactions_cache_size: DEFAULT_INTERACTIONS_CACHE_SIZE,
            disable_clustering: false,
            follow_redirects: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            debug: false,
            stop_at_first_match: false,
            insecure: true,
        }
    }
}

impl ScanOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    /// Pair concurrency, never below one.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn effective_payload_concurrency(&self) -> usize {
        self.payload_concurrency.max(1)
    }
}

/// Loads options from a YAML or TOML file, chosen by extension.
pub fn load_options<P: AsRef<Path>>(path: P) -> Result<ScanOptions, LoadError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|source| LoadError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        }
        Some("toml") => toml::from_str(&content).map_err(|source| LoadError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        _ => Err(LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}
