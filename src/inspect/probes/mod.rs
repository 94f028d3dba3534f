// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Network probes
//!
//! Each probe wraps one external concern and converts every failure mode into
//! a [`ProbeFailure`] tagged with its category. Probes share no mutable state.
//! Timeouts and cancellation are applied uniformly by [`guarded`]: dropping a
//! probe future drops its connection.

pub mod archive;
pub mod dns;
pub mod document;
pub mod host_meta;
pub mod resource;
pub mod tls;

use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::InspectConfig;
use super::types::{
    CertificateInfo, DnsRecords, HistoryData, HostMetadata, ProbeCategory, ProbeFailure,
    ResourceCheck,
};

pub use archive::ArchiveEndpoints;
pub use document::{CapturedHead, DocumentFetch, HeadCapture};
pub use resource::ResourceKind;

/// The set of probes the inspector runs for one URL
///
/// Implemented over the network by [`NetworkProbes`]; tests substitute
/// scripted implementations.
#[async_trait]
pub trait ProbeSet: Send + Sync {
    /// GET the document and capture its `<head>`
    async fn fetch_document(&self, url: &Url) -> Result<DocumentFetch, ProbeFailure>;

    /// Check whether a conventional text resource exists at `url`
    async fn check_resource(
        &self,
        kind: ResourceKind,
        url: &str,
    ) -> Result<ResourceCheck, ProbeFailure>;

    /// Resolve A/AAAA/MX/TXT/NS/CNAME records for `host`
    async fn resolve_dns(&self, host: &str) -> Result<DnsRecords, ProbeFailure>;

    /// Handshake with `host:port` and read the leaf certificate
    async fn inspect_certificate(
        &self,
        host: &str,
        port: u16,
    ) -> Result<CertificateInfo, ProbeFailure>;

    /// Look up web archive history for `url`
    async fn lookup_history(&self, url: &str) -> Result<HistoryData, ProbeFailure>;

    /// Fetch the well-known host metadata of `origin`
    async fn fetch_host_meta(&self, origin: &str) -> Result<HostMetadata, ProbeFailure>;
}

/// Run `probe` under a timeout and a cancellation token
///
/// Cancellation is checked before starting and raced against the probe
/// while it runs. Either way the probe resolves to a typed result.
pub async fn guarded<T, F>(
    category: ProbeCategory,
    timeout: Duration,
    cancel: &CancellationToken,
    probe: F,
) -> Result<T, ProbeFailure>
where
    F: Future<Output = Result<T, ProbeFailure>>,
{
    if cancel.is_cancelled() {
        return Err(ProbeFailure::cancelled(category));
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProbeFailure::cancelled(category)),
        result = tokio::time::timeout(timeout, probe) => match result {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeFailure::timeout(category, timeout.as_millis() as u64)),
        },
    }
}

/// Map a transport error to a probe failure
pub(crate) fn http_failure(category: ProbeCategory, error: &reqwest::Error) -> ProbeFailure {
    if error.is_timeout() {
        ProbeFailure::new(
            category,
            super::types::ProbeFailureKind::Timeout,
            error.to_string(),
        )
    } else {
        ProbeFailure::unavailable(category, error.to_string())
    }
}

/// Probes backed by real network access
pub struct NetworkProbes {
    client: Client,
    max_head_bytes: usize,
    min_head_bytes: usize,
    archive: ArchiveEndpoints,
}

impl NetworkProbes {
    /// Create the probe set from configuration
    pub fn new(config: &InspectConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(config.resource_timeout())
            .build()?;

        Ok(Self {
            client,
            max_head_bytes: config.max_head_bytes,
            min_head_bytes: config.min_head_bytes,
            archive: ArchiveEndpoints::default(),
        })
    }

    /// Point archive lookups somewhere other than the public endpoints
    pub fn with_archive_endpoints(mut self, endpoints: ArchiveEndpoints) -> Self {
        self.archive = endpoints;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ProbeSet for NetworkProbes {
    async fn fetch_document(&self, url: &Url) -> Result<DocumentFetch, ProbeFailure> {
        document::fetch_document(&self.client, url, self.min_head_bytes, self.max_head_bytes).await
    }

    async fn check_resource(
        &self,
        kind: ResourceKind,
        url: &str,
    ) -> Result<ResourceCheck, ProbeFailure> {
        resource::check_resource(&self.client, kind, url).await
    }

    async fn resolve_dns(&self, host: &str) -> Result<DnsRecords, ProbeFailure> {
        dns::resolve_records(host).await
    }

    async fn inspect_certificate(
        &self,
        host: &str,
        port: u16,
    ) -> Result<CertificateInfo, ProbeFailure> {
        tls::inspect_certificate(host, port).await
    }

    async fn lookup_history(&self, url: &str) -> Result<HistoryData, ProbeFailure> {
        archive::lookup_history(&self.client, &self.archive, url).await
    }

    async fn fetch_host_meta(&self, origin: &str) -> Result<HostMetadata, ProbeFailure> {
        host_meta::fetch_host_meta(&self.client, origin).await
    }
}
