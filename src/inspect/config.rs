// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for URL inspection
//!
//! Per-probe timeouts, head capture limits and cache retention.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::version;

/// Configuration for the inspector and its probes
#[derive(Debug, Clone)]
pub struct InspectConfig {
    /// Primary document timeout in seconds (default: 15)
    pub document_timeout_secs: u64,
    /// robots.txt / sitemap.xml / llms.txt timeout in seconds (default: 5)
    pub resource_timeout_secs: u64,
    /// DNS lookup timeout in seconds (default: 5)
    pub dns_timeout_secs: u64,
    /// TLS handshake timeout in seconds (default: 5)
    pub tls_timeout_secs: u64,
    /// Archive history timeout in seconds (default: 10)
    pub archive_timeout_secs: u64,
    /// Host metadata timeout in seconds (default: 5)
    pub host_meta_timeout_secs: u64,
    /// Maximum bytes of the document read while looking for `</head>` (default: 512 KiB)
    pub max_head_bytes: usize,
    /// Bytes that must be buffered before an early `</head>` is honored (default: 16 KiB)
    pub min_head_bytes: usize,
    /// How long a cached report stays fresh in seconds (default: 48h)
    pub cache_retention_secs: u64,
    /// Maximum cached reports (default: 50)
    pub cache_max_entries: usize,
    /// Where the cache index is persisted; memory only when unset
    pub cache_path: Option<PathBuf>,
    /// User agent sent with every request
    pub user_agent: String,
}

impl InspectConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            document_timeout_secs: env_parse("INSPECT_DOCUMENT_TIMEOUT_SECS")
                .unwrap_or(defaults.document_timeout_secs),
            resource_timeout_secs: env_parse("INSPECT_RESOURCE_TIMEOUT_SECS")
                .unwrap_or(defaults.resource_timeout_secs),
            dns_timeout_secs: env_parse("INSPECT_DNS_TIMEOUT_SECS")
                .unwrap_or(defaults.dns_timeout_secs),
            tls_timeout_secs: env_parse("INSPECT_TLS_TIMEOUT_SECS")
                .unwrap_or(defaults.tls_timeout_secs),
            archive_timeout_secs: env_parse("INSPECT_ARCHIVE_TIMEOUT_SECS")
                .unwrap_or(defaults.archive_timeout_secs),
            host_meta_timeout_secs: env_parse("INSPECT_HOST_META_TIMEOUT_SECS")
                .unwrap_or(defaults.host_meta_timeout_secs),
            max_head_bytes: env_parse("INSPECT_MAX_HEAD_BYTES").unwrap_or(defaults.max_head_bytes),
            min_head_bytes: env_parse("INSPECT_MIN_HEAD_BYTES").unwrap_or(defaults.min_head_bytes),
            cache_retention_secs: env_parse("INSPECT_CACHE_RETENTION_SECS")
                .unwrap_or(defaults.cache_retention_secs),
            cache_max_entries: env_parse("INSPECT_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.cache_max_entries),
            cache_path: env::var("INSPECT_CACHE_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            user_agent: env::var("INSPECT_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.document_timeout_secs == 0 {
            return Err("document_timeout_secs must be at least 1".to_string());
        }
        if self.resource_timeout_secs == 0
            || self.dns_timeout_secs == 0
            || self.tls_timeout_secs == 0
            || self.archive_timeout_secs == 0
            || self.host_meta_timeout_secs == 0
        {
            return Err("probe timeouts must be at least 1 second".to_string());
        }
        if self.max_head_bytes < 1024 {
            return Err("max_head_bytes must be at least 1024".to_string());
        }
        if self.min_head_bytes > self.max_head_bytes {
            return Err("min_head_bytes must not exceed max_head_bytes".to_string());
        }
        if self.cache_max_entries == 0 {
            return Err("cache_max_entries must be at least 1".to_string());
        }
        if self.cache_retention_secs == 0 {
            return Err("Cache retention must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn document_timeout(&self) -> Duration {
        Duration::from_secs(self.document_timeout_secs)
    }

    pub fn resource_timeout(&self) -> Duration {
        Duration::from_secs(self.resource_timeout_secs)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }

    pub fn tls_timeout(&self) -> Duration {
        Duration::from_secs(self.tls_timeout_secs)
    }

    pub fn archive_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_timeout_secs)
    }

    pub fn host_meta_timeout(&self) -> Duration {
        Duration::from_secs(self.host_meta_timeout_secs)
    }
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            document_timeout_secs: 15,
            resource_timeout_secs: 5,
            dns_timeout_secs: 5,
            tls_timeout_secs: 5,
            archive_timeout_secs: 10,
            host_meta_timeout_secs: 5,
            max_head_bytes: 512 * 1024,
            min_head_bytes: 16 * 1024,
            cache_retention_secs: 48 * 60 * 60,
            cache_max_entries: 50,
            cache_path: None,
            user_agent: version::USER_AGENT.to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
