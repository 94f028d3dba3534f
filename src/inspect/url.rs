// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! URL normalization
//!
//! Turns free-form user input (`example.com.`, `HTTPS://Example.COM/#top`)
//! into the canonical form used as the cache key and probe target.

use std::fmt;
use url::Url;

use super::types::InspectError;

/// Characters that commonly trail a URL pasted from prose
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '>', '\'', '"'];
const LEADING_PUNCTUATION: &[char] = &['(', '[', '{', '<', '\'', '"'];

/// A canonical http(s) URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl {
    url: Url,
    canonical: String,
}

impl NormalizedUrl {
    /// Canonical string form, also the cache key
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// `scheme://host[:port]` without a trailing slash
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Absolute URL for `path` on this origin
    pub fn origin_join(&self, path: &str) -> String {
        format!("{}/{}", self.origin(), path.trim_start_matches('/'))
    }

    /// Same URL over plain HTTP, if this one is HTTPS
    pub fn http_fallback(&self) -> Option<Url> {
        if !self.is_https() {
            return None;
        }
        let mut fallback = self.url.clone();
        fallback.set_scheme("http").ok()?;
        // An explicit 443 would otherwise survive the scheme swap
        if fallback.port() == Some(443) {
            fallback.set_port(None).ok()?;
        }
        Some(fallback)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Normalize user input into a canonical http(s) URL
///
/// Lowercases scheme and host, applies `https` when no scheme is given,
/// strips surrounding punctuation, the fragment and a trailing host dot.
/// A bare root path is rendered without its slash.
pub fn normalize_url(input: &str) -> Result<NormalizedUrl, InspectError> {
    let invalid = |reason: &str| InspectError::InvalidUrl {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input
        .trim()
        .trim_start_matches(LEADING_PUNCTUATION)
        .trim_end_matches(|c: char| TRAILING_PUNCTUATION.contains(&c) || c.is_whitespace())
        .trim();

    if trimmed.is_empty() {
        return Err(invalid("empty input"));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }

    let with_scheme = if has_scheme(trimmed) {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("only http and https URLs can be inspected"));
    }

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return Err(invalid("missing host")),
    };

    let bare_host = host.trim_end_matches('.');
    if bare_host.is_empty() {
        return Err(invalid("missing host"));
    }
    if bare_host != host {
        url.set_host(Some(bare_host))
            .map_err(|e| invalid(&e.to_string()))?;
    }
    if !bare_host.contains('.') && bare_host != "localhost" && url.host().map_or(true, is_domain) {
        return Err(invalid("host is not a fully qualified domain"));
    }

    url.set_fragment(None);

    let mut canonical = url.to_string();
    if url.path() == "/" && url.query().is_none() {
        canonical.pop();
    }

    Ok(NormalizedUrl { url, canonical })
}

fn has_scheme(input: &str) -> bool {
    match input.find("://") {
        Some(idx) if idx > 0 => {
            let scheme = &input[..idx];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

fn is_domain(host: url::Host<&str>) -> bool {
    matches!(host, url::Host::Domain(_))
}
