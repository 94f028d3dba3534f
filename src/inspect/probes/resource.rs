// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Existence probes for conventional text resources
//!
//! robots.txt, sitemap.xml and llms.txt. Many hosts answer 200 with an HTML
//! "not found" page, so a 2xx only counts when the body is not a soft 404.

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http_failure;
use crate::inspect::types::{ProbeCategory, ProbeFailure, ResourceCheck};

/// Bytes of body inspected for HTML markers
const SNIFF_BYTES: usize = 1024;

const HTML_MARKERS: &[&str] = &["<!doctype html", "<html", "<head", "<body", "<title"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    RobotsTxt,
    SitemapXml,
    LlmsTxt,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::RobotsTxt,
        ResourceKind::SitemapXml,
        ResourceKind::LlmsTxt,
    ];

    /// Path relative to the origin
    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::RobotsTxt => "/robots.txt",
            ResourceKind::SitemapXml => "/sitemap.xml",
            ResourceKind::LlmsTxt => "/llms.txt",
        }
    }

    pub fn category(&self) -> ProbeCategory {
        match self {
            ResourceKind::RobotsTxt => ProbeCategory::Robots,
            ResourceKind::SitemapXml => ProbeCategory::Sitemap,
            ResourceKind::LlmsTxt => ProbeCategory::LlmsTxt,
        }
    }

    /// Whether the sniffed body looks like this kind of resource
    fn matches_body(&self, sniff: &str) -> bool {
        let trimmed = sniff.trim_start_matches('\u{feff}').trim_start();
        match self {
            ResourceKind::RobotsTxt => ["user-agent:", "disallow:", "allow:", "sitemap:"]
                .iter()
                .any(|directive| sniff.contains(directive)),
            ResourceKind::SitemapXml => {
                trimmed.starts_with("<?xml")
                    || sniff.contains("<urlset")
                    || sniff.contains("<sitemapindex")
            }
            ResourceKind::LlmsTxt => trimmed.starts_with('#'),
        }
    }
}

/// Whether a 2xx response is really an HTML error page
///
/// `sniff` is the start of the body; it is lowercased here.
pub fn is_soft_404(kind: ResourceKind, content_type: Option<&str>, sniff: &str) -> bool {
    let sniff = sniff.to_ascii_lowercase();
    let has_markers = HTML_MARKERS.iter().any(|marker| sniff.contains(marker));
    if has_markers {
        return true;
    }

    let html_type = content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        })
        .unwrap_or(false);

    html_type && !kind.matches_body(&sniff)
}

/// GET `url` and classify whether the resource exists
pub async fn check_resource(
    client: &Client,
    kind: ResourceKind,
    url: &str,
) -> Result<ResourceCheck, ProbeFailure> {
    let category = kind.category();
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| http_failure(category, &e))?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let mut sniff = Vec::with_capacity(SNIFF_BYTES);
    if status.is_success() {
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| http_failure(category, &e))?;
            let room = SNIFF_BYTES - sniff.len();
            sniff.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if sniff.len() >= SNIFF_BYTES {
                break;
            }
        }
    }
    let sniff = String::from_utf8_lossy(&sniff);

    let soft_404 = status.is_success() && is_soft_404(kind, content_type.as_deref(), &sniff);
    let exists = status.is_success() && !soft_404;
    debug!(url, status = status.as_u16(), exists, soft_404, "Resource checked");

    Ok(ResourceCheck {
        url: url.to_string(),
        exists,
        status_code: Some(status.as_u16()),
        content_type,
        is_soft_404: soft_404,
        error: None,
    })
}
