// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Primary document probe
//!
//! Fetches the target page and reads only as much of the body as needed to
//! capture its `<head>`.

use futures::StreamExt;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::http_failure;
use crate::inspect::types::{ProbeCategory, ProbeFailure};

const HEAD_CLOSE: &[u8] = b"</head>";
const BODY_OPEN: &[u8] = b"<body";

/// Response of the primary document probe
#[derive(Debug, Clone)]
pub struct DocumentFetch {
    /// URL the request was sent to
    pub requested_url: String,
    /// URL after redirects
    pub final_url: String,
    pub status_code: u16,
    /// Lowercased header names; repeated headers joined with ", "
    pub headers: BTreeMap<String, String>,
    pub head: CapturedHead,
    pub time_to_first_byte_ms: u64,
    pub total_ms: u64,
    pub content_length: Option<u64>,
    pub content_encoding: Option<String>,
}

impl DocumentFetch {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn redirected(&self) -> bool {
        self.requested_url.trim_end_matches('/') != self.final_url.trim_end_matches('/')
    }
}

/// Head markup captured from the start of a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedHead {
    pub markup: String,
    /// Bytes kept in `markup`
    pub bytes: usize,
    /// Reading stopped before the end of the response body
    pub truncated: bool,
}

/// Incremental `<head>` capture over a streamed body
///
/// Markers ending before `min_bytes` are ignored, so an early `</head>` inside
/// an inline script does not cut the head short. Falls back to `<body` as a
/// marker and to `max_bytes` as a hard ceiling; a body that ends below the
/// floor is kept whole.
#[derive(Debug)]
pub struct HeadCapture {
    buf: Vec<u8>,
    min_bytes: usize,
    max_bytes: usize,
    head_close: Option<usize>,
    body_open: Option<usize>,
    cut: Option<usize>,
}

impl HeadCapture {
    pub fn new(min_bytes: usize, max_bytes: usize) -> Self {
        let max_bytes = max_bytes.max(1);
        Self {
            buf: Vec::with_capacity(max_bytes.min(64 * 1024)),
            min_bytes: min_bytes.min(max_bytes),
            max_bytes,
            head_close: None,
            body_open: None,
            cut: None,
        }
    }

    /// Feed the next chunk; returns `true` once no more input is needed
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if self.cut.is_some() {
            return true;
        }

        let room = self.max_bytes - self.buf.len();
        let take = chunk.len().min(room);
        let scan_from = self.buf.len().saturating_sub(HEAD_CLOSE.len());
        self.buf.extend_from_slice(&chunk[..take]);

        if self.head_close.is_none() {
            self.head_close = self.find_marker(HEAD_CLOSE, scan_from);
        }
        if self.body_open.is_none() {
            self.body_open = self.find_marker(BODY_OPEN, scan_from);
        }

        if let Some(cut) = self.marker_cut() {
            self.cut = Some(cut);
            return true;
        }
        if self.buf.len() >= self.max_bytes {
            self.cut = Some(self.max_bytes);
            return true;
        }
        false
    }

    /// Finish the capture; `reached_end` is whether the body was fully read
    pub fn finish(self, reached_end: bool) -> CapturedHead {
        let cut = self
            .cut
            .or_else(|| self.marker_cut())
            .unwrap_or(self.buf.len())
            .min(self.buf.len());

        let markup = String::from_utf8_lossy(&self.buf[..cut]).into_owned();
        CapturedHead {
            markup,
            bytes: cut,
            truncated: !reached_end,
        }
    }

    /// First `marker` at or after `from` that ends at or past the floor
    fn find_marker(&self, marker: &[u8], from: usize) -> Option<usize> {
        let start = from.max(self.min_bytes.saturating_sub(marker.len()));
        if start >= self.buf.len() {
            return None;
        }
        find_ignore_case(&self.buf[start..], marker).map(|i| start + i)
    }

    fn marker_cut(&self) -> Option<usize> {
        self.head_close
            .map(|i| i + HEAD_CLOSE.len())
            .or(self.body_open)
    }
}

fn find_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// GET `url` following redirects and capture its head
pub async fn fetch_document(
    client: &Client,
    url: &Url,
    min_head_bytes: usize,
    max_head_bytes: usize,
) -> Result<DocumentFetch, ProbeFailure> {
    let start = Instant::now();
    debug!(url = %url, "Fetching primary document");

    let response = client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
        .send()
        .await
        .map_err(|e| http_failure(ProbeCategory::Main, &e))?;

    let time_to_first_byte_ms = start.elapsed().as_millis() as u64;
    let status_code = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_length = response.content_length();

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    let content_encoding = headers.get("content-encoding").cloned();

    let mut capture = HeadCapture::new(min_head_bytes, max_head_bytes);
    let mut stream = response.bytes_stream();
    let mut reached_end = true;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                if capture.push(&bytes) {
                    reached_end = false;
                    break;
                }
            }
            Err(e) => {
                // Keep what arrived; the headers are still valid
                warn!(url = %url, error = %e, "Document body ended abruptly");
                reached_end = false;
                break;
            }
        }
    }
    drop(stream);

    let head = capture.finish(reached_end);
    let total_ms = start.elapsed().as_millis() as u64;
    debug!(
        url = %url,
        status_code,
        head_bytes = head.bytes,
        truncated = head.truncated,
        total_ms,
        "Primary document fetched"
    );

    Ok(DocumentFetch {
        requested_url: url.to_string(),
        final_url,
        status_code,
        headers,
        head,
        time_to_first_byte_ms,
        total_ms,
        content_length,
        content_encoding,
    })
}
