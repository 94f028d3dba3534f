// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! URL inspection
//!
//! Fetches a single URL and assembles a composite [`Report`] about it:
//! - Page overview, metadata, resources and data feeds from the captured `<head>`
//! - Discoverability, including robots.txt / sitemap.xml / llms.txt checks
//! - Networking, security headers, TLS certificate and bot protection
//! - DNS records, web archive history and well-known host metadata
//!
//! Key features:
//! - Independent probes with per-probe timeouts, run concurrently
//! - Monotonic per-category progress and partial report snapshots
//! - Retention-bounded LRU report cache, optionally persisted to disk
//! - HTTPS first with a single HTTP fallback

pub mod builder;
pub mod cache;
pub mod config;
pub mod head;
pub mod orchestrator;
pub mod probes;
pub mod progress;
pub mod security;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use builder::{reconcile_history, ReportBuilder};
pub use cache::{CacheEntry, ReportCache, ReportCacheStats};
pub use config::InspectConfig;
pub use orchestrator::{Inspection, Inspector};
pub use probes::{NetworkProbes, ProbeSet, ResourceKind};
pub use progress::{ProgressState, ProgressTracker, ReportCategory};
pub use types::{InspectError, ProbeCategory, ProbeFailure, ProbeFailureKind, Probed, Report};
pub use url::{normalize_url, NormalizedUrl};
