// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core types for URL inspection
//!
//! A [`Report`] is the aggregate result for one URL. Every category is
//! optional: `None` means "not determined" (the category was never reached),
//! while background categories carry an explicit [`Probed`] outcome so a
//! failed probe shows up as `unavailable` rather than a missing section.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The aggregate inspection result for one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Canonical (normalized) URL
    pub url: String,
    /// When the report was assembled
    pub fetched_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<Overview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discoverability: Option<Discoverability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networking: Option<Networking>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<Probed<DnsRecords>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<Performance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Probed<HistoryData>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_feeds: Option<DataFeeds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_metadata: Option<Probed<HostMetadata>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_protection: Option<BotProtection>,
}

impl Report {
    /// An empty report for `url`, stamped now
    pub fn empty(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fetched_at: Utc::now(),
            overview: None,
            metadata: None,
            discoverability: None,
            resources: None,
            networking: None,
            dns: None,
            performance: None,
            history: None,
            data_feeds: None,
            host_metadata: None,
            bot_protection: None,
        }
    }

    /// Archived snapshot count, if history data is available
    pub fn snapshot_count(&self) -> Option<u64> {
        match &self.history {
            Some(Probed::Available { data }) => Some(data.wayback_machine_snapshots),
            _ => None,
        }
    }
}

/// Outcome of a background probe as shown in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Probed<T> {
    /// The probe produced data
    Available { data: T },
    /// The probe ran and determined the thing does not exist
    NotFound,
    /// The probe failed; the category could not be determined
    Unavailable {
        reason: String,
        kind: ProbeFailureKind,
    },
}

impl<T> Probed<T> {
    pub fn from_result(result: Result<T, ProbeFailure>) -> Self {
        match result {
            Ok(data) => Probed::Available { data },
            Err(failure) if failure.kind == ProbeFailureKind::NotFound => Probed::NotFound,
            Err(failure) => Probed::Unavailable {
                reason: failure.message,
                kind: failure.kind,
            },
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Probed::Available { data } => Some(data),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Probed::Available { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub title: Option<String>,
    pub description: Option<String>,
    pub favicon: Option<String>,
    pub language: Option<String>,
    pub site_name: Option<String>,
    pub theme_color: Option<String>,
    pub generator: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    /// `og:*` properties, keyed without the prefix
    pub open_graph: BTreeMap<String, String>,
    /// `twitter:*` properties, keyed without the prefix
    pub twitter: BTreeMap<String, String>,
    /// Remaining named `<meta>` tags
    pub meta_tags: BTreeMap<String, String>,
    /// `@type` values found in JSON-LD blocks
    pub json_ld_types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discoverability {
    pub canonical: Option<String>,
    pub robots_meta: Option<String>,
    pub alternates: Vec<AlternateLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robots_txt: Option<ResourceCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sitemap_xml: Option<ResourceCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llms_txt: Option<ResourceCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateLink {
    pub href: String,
    pub hreflang: Option<String>,
}

/// Result of an existence check for a conventional text resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCheck {
    pub url: String,
    pub exists: bool,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub is_soft_404: bool,
    /// Why the check could not complete, when it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResourceCheck {
    /// A failed check, rendered as "not found"
    pub fn missing(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exists: false,
            status_code: None,
            content_type: None,
            is_soft_404: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
    pub preloads: Vec<String>,
    pub preconnects: Vec<String>,
    pub icons: Vec<String>,
    pub manifest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    pub status_code: u16,
    /// Response headers of the same response as `status_code`
    pub headers: BTreeMap<String, String>,
    pub final_url: String,
    pub redirected: bool,
    pub used_http_fallback: bool,
    pub security_headers: SecurityHeaders,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Probed<CertificateInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityHeaders {
    pub strict_transport_security: Option<String>,
    pub content_security_policy: Option<String>,
    pub x_frame_options: Option<String>,
    pub x_content_type_options: Option<String>,
    pub referrer_policy: Option<String>,
    pub permissions_policy: Option<String>,
    pub cross_origin_opener_policy: Option<String>,
    pub cross_origin_resource_policy: Option<String>,
    /// Recommended headers that were not sent
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub days_remaining: i64,
    pub subject_alt_names: Vec<String>,
    pub protocol_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecords {
    pub a: Vec<String>,
    pub aaaa: Vec<String>,
    pub mx: Vec<MxRecord>,
    pub txt: Vec<String>,
    pub ns: Vec<String>,
    pub cname: Vec<String>,
}

impl DnsRecords {
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
            && self.aaaa.is_empty()
            && self.mx.is_empty()
            && self.txt.is_empty()
            && self.ns.is_empty()
            && self.cname.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub time_to_first_byte_ms: u64,
    pub total_ms: u64,
    pub head_bytes: usize,
    pub truncated: bool,
    pub content_length: Option<u64>,
    pub content_encoding: Option<String>,
}

/// Web archive history for a URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryData {
    /// Total captures of the URL, up to the archive row limit
    pub wayback_machine_snapshots: u64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub archive_url: Option<String>,
    /// The archive throttled us; a zero count does not mean "no history"
    pub rate_limited: bool,
    /// The count hit the row limit and is a lower bound
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub count_capped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFeeds {
    pub rss: Vec<String>,
    pub atom: Vec<String>,
    pub json_feeds: Vec<String>,
    pub api_links: Vec<String>,
    pub oembed: Vec<String>,
}

impl DataFeeds {
    pub fn is_empty(&self) -> bool {
        self.rss.is_empty()
            && self.atom.is_empty()
            && self.json_feeds.is_empty()
            && self.api_links.is_empty()
            && self.oembed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMetadata {
    /// Which well-known resource answered
    pub source: String,
    pub links: Vec<HostMetaLink>,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMetaLink {
    pub rel: String,
    pub href: Option<String>,
    pub template: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotProtection {
    pub detected: bool,
    pub provider: Option<String>,
    pub signals: Vec<String>,
}

/// Which probe a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeCategory {
    Main,
    Dns,
    Certificate,
    Wayback,
    HostMeta,
    Robots,
    Sitemap,
    LlmsTxt,
}

impl ProbeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeCategory::Main => "main",
            ProbeCategory::Dns => "dns",
            ProbeCategory::Certificate => "certificate",
            ProbeCategory::Wayback => "wayback",
            ProbeCategory::HostMeta => "hostMeta",
            ProbeCategory::Robots => "robots",
            ProbeCategory::Sitemap => "sitemap",
            ProbeCategory::LlmsTxt => "llmsTxt",
        }
    }
}

impl fmt::Display for ProbeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeFailureKind {
    /// The remote could not be reached or answered unusably
    Unavailable,
    /// The remote throttled the request
    RateLimited,
    /// The probe exceeded its timeout
    Timeout,
    /// The probe was cancelled before it resolved
    Cancelled,
    /// The remote answered that the thing does not exist
    NotFound,
}

/// Typed failure of a single probe
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{category} probe failed ({kind:?}): {message}")]
pub struct ProbeFailure {
    pub category: ProbeCategory,
    pub kind: ProbeFailureKind,
    pub message: String,
    /// Whether the overall inspection can continue
    pub recoverable: bool,
}

impl ProbeFailure {
    pub fn new(category: ProbeCategory, kind: ProbeFailureKind, message: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            message: message.into(),
            recoverable: true,
        }
    }

    pub fn unavailable(category: ProbeCategory, message: impl Into<String>) -> Self {
        Self::new(category, ProbeFailureKind::Unavailable, message)
    }

    pub fn not_found(category: ProbeCategory, message: impl Into<String>) -> Self {
        Self::new(category, ProbeFailureKind::NotFound, message)
    }

    pub fn timeout(category: ProbeCategory, timeout_ms: u64) -> Self {
        Self::new(
            category,
            ProbeFailureKind::Timeout,
            format!("timed out after {}ms", timeout_ms),
        )
    }

    pub fn cancelled(category: ProbeCategory) -> Self {
        Self::new(category, ProbeFailureKind::Cancelled, "cancelled")
    }

    /// Mark this failure as fatal for the whole inspection
    pub fn irrecoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ProbeFailureKind::Cancelled
    }
}

/// Errors that halt an inspection
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InspectError {
    /// The input could not be turned into an http(s) URL
    #[error("Invalid URL '{input}': {reason}")]
    InvalidUrl {
        /// The raw input
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// The primary document could not be fetched over HTTPS or HTTP
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed {
        /// The normalized URL
        url: String,
        /// Last underlying failure
        reason: String,
    },

    /// The caller cancelled the inspection
    #[error("Inspection of {url} was cancelled")]
    Cancelled {
        /// The normalized URL
        url: String,
    },
}
