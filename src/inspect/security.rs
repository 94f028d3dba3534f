// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Security header summary and bot-protection detection
//!
//! Both work purely on the primary document response: status, lowercased
//! headers and the captured head markup.

use std::collections::BTreeMap;

use super::types::{BotProtection, SecurityHeaders};

/// Headers reported as missing when absent
const RECOMMENDED: &[&str] = &[
    "strict-transport-security",
    "content-security-policy",
    "x-frame-options",
    "x-content-type-options",
    "referrer-policy",
    "permissions-policy",
];

pub fn analyze_security_headers(headers: &BTreeMap<String, String>, is_https: bool) -> SecurityHeaders {
    let get = |name: &str| headers.get(name).cloned();
    let mut summary = SecurityHeaders {
        strict_transport_security: get("strict-transport-security"),
        content_security_policy: get("content-security-policy"),
        x_frame_options: get("x-frame-options"),
        x_content_type_options: get("x-content-type-options"),
        referrer_policy: get("referrer-policy"),
        permissions_policy: get("permissions-policy"),
        cross_origin_opener_policy: get("cross-origin-opener-policy"),
        cross_origin_resource_policy: get("cross-origin-resource-policy"),
        missing: Vec::new(),
    };

    for name in RECOMMENDED {
        // HSTS is meaningless over plain HTTP
        if *name == "strict-transport-security" && !is_https {
            continue;
        }
        // frame-ancestors in CSP supersedes X-Frame-Options
        if *name == "x-frame-options"
            && summary
                .content_security_policy
                .as_deref()
                .map(|csp| csp.to_ascii_lowercase().contains("frame-ancestors"))
                .unwrap_or(false)
        {
            continue;
        }
        if !headers.contains_key(*name) {
            summary.missing.push(name.to_string());
        }
    }
    summary
}

struct Vendor {
    name: &'static str,
    /// Header names whose presence identifies the vendor
    headers: &'static [&'static str],
    /// Substrings of the `server` header
    servers: &'static [&'static str],
    /// Substrings of cookie names in `set-cookie`
    cookies: &'static [&'static str],
    /// Markup fragments of challenge pages
    markup: &'static [&'static str],
}

const VENDORS: &[Vendor] = &[
    Vendor {
        name: "Cloudflare",
        headers: &["cf-ray", "cf-mitigated", "cf-chl-bypass"],
        servers: &["cloudflare"],
        cookies: &["__cf_bm", "cf_clearance", "__cfruid"],
        markup: &["challenges.cloudflare.com", "cf-browser-verification", "just a moment..."],
    },
    Vendor {
        name: "Akamai",
        headers: &["akamai-grn", "x-akamai-transformed"],
        servers: &["akamaighost", "akamainetstorage"],
        cookies: &["_abck", "ak_bmsc", "bm_sz"],
        markup: &[],
    },
    Vendor {
        name: "Imperva",
        headers: &["x-iinfo"],
        servers: &[],
        cookies: &["incap_ses", "visid_incap", "reese84"],
        markup: &["_incapsula_resource", "incapsula incident id"],
    },
    Vendor {
        name: "DataDome",
        headers: &["x-datadome", "x-datadome-cid"],
        servers: &["datadome"],
        cookies: &["datadome"],
        markup: &["captcha-delivery.com", "geo.captcha-delivery.com"],
    },
    Vendor {
        name: "Sucuri",
        headers: &["x-sucuri-id", "x-sucuri-cache", "x-sucuri-block"],
        servers: &["sucuri"],
        cookies: &["sucuri_cloudproxy"],
        markup: &["sucuri website firewall"],
    },
    Vendor {
        name: "Vercel",
        headers: &["x-vercel-mitigated", "x-vercel-challenge-token"],
        servers: &[],
        cookies: &["_vcrcs"],
        markup: &["vercel security checkpoint"],
    },
    Vendor {
        name: "AWS WAF",
        headers: &["x-amzn-waf-action"],
        servers: &[],
        cookies: &["aws-waf-token"],
        markup: &["awswafintegration", "challenge.js"],
    },
];

/// Detect a bot-protection layer in front of the document
///
/// A vendor fingerprint alone is reported as the provider; `detected` is only
/// set when the response also looks like a challenge or block.
pub fn detect_bot_protection(
    status_code: u16,
    headers: &BTreeMap<String, String>,
    markup: &str,
) -> BotProtection {
    let server = headers
        .get("server")
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    let cookies = headers
        .get("set-cookie")
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    let markup = markup.to_ascii_lowercase();

    let mut provider = None;
    let mut signals = Vec::new();
    let mut challenge = false;

    for vendor in VENDORS {
        let mut matched = false;
        for header in vendor.headers {
            if headers.contains_key(*header) {
                signals.push(format!("header:{}", header));
                matched = true;
            }
        }
        for fragment in vendor.servers {
            if server.contains(fragment) {
                signals.push(format!("server:{}", fragment));
                matched = true;
            }
        }
        for cookie in vendor.cookies {
            if cookies.contains(cookie) {
                signals.push(format!("cookie:{}", cookie));
                matched = true;
            }
        }
        for fragment in vendor.markup {
            if markup.contains(fragment) {
                signals.push(format!("markup:{}", fragment));
                matched = true;
                challenge = true;
            }
        }
        if matched && provider.is_none() {
            provider = Some(vendor.name.to_string());
        }
    }

    if headers.contains_key("cf-mitigated")
        || headers.contains_key("x-vercel-mitigated")
        || headers.contains_key("x-sucuri-block")
        || headers
            .get("x-amzn-waf-action")
            .map(|v| !v.eq_ignore_ascii_case("allow"))
            .unwrap_or(false)
    {
        challenge = true;
    }
    if matches!(status_code, 403 | 429 | 503) && provider.is_some() {
        signals.push(format!("status:{}", status_code));
        challenge = true;
    }
    if markup.contains("captcha") && !signals.iter().any(|s| s.starts_with("markup:")) {
        signals.push("markup:captcha".to_string());
        challenge = true;
    }

    BotProtection {
        detected: challenge,
        provider,
        signals,
    }
}
