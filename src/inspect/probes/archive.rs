// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Web archive history probe
//!
//! Asks the availability endpoint for the closest snapshot, then the CDX
//! endpoint for every capture timestamp, up to [`CDX_ROW_LIMIT`] rows. The
//! count is the number of captures; past the limit it is a lower bound and
//! flagged as capped. The archive throttles aggressively,
//! so throttling is reported inside [`HistoryData::rate_limited`] instead of
//! as a failure. A zero count with `rate_limited` set means "unknown".

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::http_failure;
use crate::inspect::types::{HistoryData, ProbeCategory, ProbeFailure};

pub const AVAILABILITY_ENDPOINT: &str = "https://archive.org/wayback/available";
pub const CDX_ENDPOINT: &str = "https://web.archive.org/cdx/search/cdx";

/// Most capture rows read from the count endpoint
pub const CDX_ROW_LIMIT: usize = 10_000;

/// Where archive lookups are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEndpoints {
    pub availability: String,
    pub count: String,
}

impl Default for ArchiveEndpoints {
    fn default() -> Self {
        Self {
            availability: AVAILABILITY_ENDPOINT.to_string(),
            count: CDX_ENDPOINT.to_string(),
        }
    }
}

impl ArchiveEndpoints {
    /// Endpoints rooted at `base`, using the public paths
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            availability: format!("{}/wayback/available", base),
            count: format!("{}/cdx/search/cdx", base),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<ClosestSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ClosestSnapshot {
    #[serde(default)]
    available: bool,
    url: Option<String>,
    timestamp: Option<String>,
}

/// Parse a 4-14 digit archive timestamp, padding missing fields with zeros
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.len() < 4 || raw.len() > 14 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut padded = raw.to_string();
    // Month and day must be at least 01
    while padded.len() < 14 {
        let next = if padded.len() == 5 || padded.len() == 7 { '1' } else { '0' };
        padded.push(next);
    }
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Timestamps out of a CDX `output=json` body; the first row is the header
fn parse_cdx(body: &str) -> Option<Vec<String>> {
    if body.trim().is_empty() {
        return None;
    }
    let rows: Vec<Vec<String>> = serde_json::from_str(body).ok()?;
    let mut rows = rows.into_iter();
    let header = rows.next()?;
    let column = header.iter().position(|name| name == "timestamp")?;
    Some(
        rows.filter_map(|row| row.get(column).cloned())
            .collect(),
    )
}

fn rate_limited(archive_url: Option<String>) -> HistoryData {
    HistoryData {
        archive_url,
        rate_limited: true,
        ..Default::default()
    }
}

pub async fn lookup_history(
    client: &Client,
    endpoints: &ArchiveEndpoints,
    url: &str,
) -> Result<HistoryData, ProbeFailure> {
    let category = ProbeCategory::Wayback;

    let response = client
        .get(&endpoints.availability)
        .query(&[("url", url)])
        .send()
        .await
        .map_err(|e| http_failure(category, &e))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(url, "Archive availability endpoint rate limited");
        return Ok(rate_limited(None));
    }
    if !status.is_success() {
        return Err(ProbeFailure::unavailable(
            category,
            format!("availability endpoint returned HTTP {}", status.as_u16()),
        ));
    }

    let availability: AvailabilityResponse = response
        .json()
        .await
        .map_err(|e| ProbeFailure::unavailable(category, format!("bad availability response: {}", e)))?;

    let closest = match availability.archived_snapshots.closest {
        Some(closest) if closest.available => closest,
        _ => {
            debug!(url, "No archived snapshots");
            return Ok(HistoryData::default());
        }
    };
    let archive_url = closest.url.clone();

    let limit = CDX_ROW_LIMIT.to_string();
    let response = client
        .get(&endpoints.count)
        .query(&[
            ("url", url),
            ("output", "json"),
            ("fl", "timestamp"),
            ("limit", limit.as_str()),
        ])
        .send()
        .await
        .map_err(|e| http_failure(category, &e))?;

    let status = response.status();
    if !status.is_success() {
        // The availability check already proved snapshots exist
        warn!(url, status = status.as_u16(), "Archive count endpoint refused");
        return Ok(rate_limited(archive_url));
    }

    let body = response
        .text()
        .await
        .map_err(|e| http_failure(category, &e))?;
    let timestamps = match parse_cdx(&body) {
        Some(timestamps) if !timestamps.is_empty() => timestamps,
        _ => {
            warn!(url, "Archive count empty despite a closest snapshot; assuming rate limit");
            return Ok(rate_limited(archive_url));
        }
    };

    let count_capped = timestamps.len() >= CDX_ROW_LIMIT;
    let closest_at = closest.timestamp.as_deref().and_then(parse_timestamp);
    let mut seen: Vec<DateTime<Utc>> = timestamps.iter().filter_map(|t| parse_timestamp(t)).collect();
    seen.sort();
    let first_seen = seen.first().copied().or(closest_at);
    // Rows come oldest first, so a capped list may stop short of the newest capture
    let last_seen = seen.last().copied().max(closest_at).or(first_seen);

    let history = HistoryData {
        wayback_machine_snapshots: timestamps.len() as u64,
        first_seen,
        last_seen,
        archive_url,
        rate_limited: false,
        count_capped,
    };
    debug!(
        url,
        snapshots = history.wayback_machine_snapshots,
        capped = count_capped,
        "Archive history resolved"
    );
    Ok(history)
}
