// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Well-known host metadata probe (RFC 6415)
//!
//! Tries the JSON form first, then the XRD form.

use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

use super::http_failure;
use crate::inspect::types::{
    HostMetaLink, HostMetadata, ProbeCategory, ProbeFailure, ProbeFailureKind,
};

pub const JSON_PATH: &str = "/.well-known/host-meta.json";
pub const XRD_PATH: &str = "/.well-known/host-meta";

#[derive(Debug, Deserialize)]
struct Jrd {
    #[serde(default)]
    properties: BTreeMap<String, Option<String>>,
    #[serde(default)]
    links: Vec<JrdLink>,
}

#[derive(Debug, Deserialize)]
struct JrdLink {
    rel: String,
    href: Option<String>,
    template: Option<String>,
    #[serde(rename = "type")]
    media_type: Option<String>,
}

/// Parse a JRD document
pub fn parse_jrd(body: &str) -> Option<HostMetadata> {
    let jrd: Jrd = serde_json::from_str(body).ok()?;
    Some(HostMetadata {
        source: JSON_PATH.to_string(),
        links: jrd
            .links
            .into_iter()
            .map(|link| HostMetaLink {
                rel: link.rel,
                href: link.href,
                template: link.template,
                media_type: link.media_type,
            })
            .collect(),
        properties: jrd
            .properties
            .into_iter()
            .map(|(key, value)| (key, value.unwrap_or_default()))
            .collect(),
    })
}

fn xrd_root() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<XRD[\s>]").expect("valid XRD root pattern"))
}

fn xrd_link() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<Link\b([^>]*?)/?>").expect("valid XRD link pattern"))
}

fn xrd_property() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<Property\b[^>]*?\btype\s*=\s*["']([^"']*)["'][^>]*?(?:/>|>(.*?)</Property>)"#)
            .expect("valid XRD property pattern")
    })
}

fn xml_attribute() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("valid attribute pattern")
    })
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Parse an XRD document
pub fn parse_xrd(body: &str) -> Option<HostMetadata> {
    if !xrd_root().is_match(body) {
        return None;
    }

    let links = xrd_link()
        .captures_iter(body)
        .filter_map(|caps| {
            let mut attrs: BTreeMap<String, String> = BTreeMap::new();
            for attr in xml_attribute().captures_iter(caps.get(1)?.as_str()) {
                let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());
                attrs.insert(attr[1].to_ascii_lowercase(), unescape_xml(value.unwrap_or("")));
            }
            Some(HostMetaLink {
                rel: attrs.remove("rel")?,
                href: attrs.remove("href"),
                template: attrs.remove("template"),
                media_type: attrs.remove("type"),
            })
        })
        .collect();

    let properties = xrd_property()
        .captures_iter(body)
        .map(|caps| {
            let value = caps.get(2).map(|m| unescape_xml(m.as_str().trim()));
            (unescape_xml(&caps[1]), value.unwrap_or_default())
        })
        .collect();

    Some(HostMetadata {
        source: XRD_PATH.to_string(),
        links,
        properties,
    })
}

enum Attempt {
    Found(HostMetadata),
    Missing,
    Failed(ProbeFailure),
}

async fn attempt(
    client: &Client,
    url: &str,
    parse: fn(&str) -> Option<HostMetadata>,
) -> Attempt {
    let category = ProbeCategory::HostMeta;
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return Attempt::Failed(http_failure(category, &e)),
    };

    let status = response.status();
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => return Attempt::Missing,
        StatusCode::TOO_MANY_REQUESTS => {
            return Attempt::Failed(ProbeFailure::new(
                category,
                ProbeFailureKind::RateLimited,
                format!("{} returned HTTP 429", url),
            ))
        }
        s if !s.is_success() => {
            return Attempt::Failed(ProbeFailure::unavailable(
                category,
                format!("{} returned HTTP {}", url, s.as_u16()),
            ))
        }
        _ => {}
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return Attempt::Failed(http_failure(category, &e)),
    };
    // An HTML page or anything else unparseable at a 2xx is a soft 404
    match parse(&body) {
        Some(metadata) => Attempt::Found(metadata),
        None => Attempt::Missing,
    }
}

/// Fetch host metadata from `origin` (scheme, host and port, no path)
pub async fn fetch_host_meta(client: &Client, origin: &str) -> Result<HostMetadata, ProbeFailure> {
    let origin = origin.trim_end_matches('/');
    let mut first_failure = None;

    for (path, parse) in [
        (JSON_PATH, parse_jrd as fn(&str) -> Option<HostMetadata>),
        (XRD_PATH, parse_xrd),
    ] {
        let url = format!("{}{}", origin, path);
        match attempt(client, &url, parse).await {
            Attempt::Found(metadata) => {
                debug!(url = %url, links = metadata.links.len(), "Host metadata found");
                return Ok(metadata);
            }
            Attempt::Missing => debug!(url = %url, "Host metadata absent"),
            Attempt::Failed(failure) => {
                debug!(url = %url, error = %failure, "Host metadata fetch failed");
                first_failure.get_or_insert(failure);
            }
        }
    }

    Err(first_failure.unwrap_or_else(|| {
        ProbeFailure::not_found(ProbeCategory::HostMeta, format!("no host-meta at {}", origin))
    }))
}
