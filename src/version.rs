// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the site inspector

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Full version string with feature description
pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"), "-site-inspector");

/// User agent sent by every probe unless overridden
pub const USER_AGENT: &str = concat!("site-inspector/", env!("CARGO_PKG_VERSION"));

/// Report categories produced by this version
pub const FEATURES: &[&str] = &[
    "head-capture",
    "soft-404-detection",
    "dns-records",
    "tls-certificate",
    "wayback-history",
    "host-meta",
    "llms-txt",
    "security-headers",
    "bot-protection",
    "persistent-cache",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Site Inspector {}", VERSION_NUMBER)
}
