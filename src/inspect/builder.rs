// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-progress report assembly
//!
//! The orchestrator owns the only [`ReportBuilder`] for a request and merges
//! probe results into it in completion order. Observers only ever see cloned
//! snapshots.

use chrono::{DateTime, Utc};
use url::Url;

use super::probes::{DocumentFetch, ResourceKind};
use super::security::{analyze_security_headers, detect_bot_protection};
use super::types::{
    CertificateInfo, DataFeeds, Discoverability, DnsRecords, HistoryData, HostMetadata, Networking,
    Overview, PageMetadata, Performance, ProbeFailureKind, Probed, Report, ResourceCheck,
    Resources,
};

#[derive(Debug, Clone)]
pub struct ReportBuilder {
    report: Report,
    /// Certificate that arrived before the document
    pending_certificate: Option<Probed<CertificateInfo>>,
    head_discoverability: bool,
}

impl ReportBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            report: Report::empty(url),
            pending_certificate: None,
            head_discoverability: false,
        }
    }

    /// Merge the primary document response
    ///
    /// Networking, performance and bot protection all describe this one
    /// response, so status and headers stay consistent with each other.
    pub fn set_document(&mut self, document: &DocumentFetch, used_http_fallback: bool) {
        let final_is_https = Url::parse(&document.final_url)
            .map(|url| url.scheme() == "https")
            .unwrap_or(false);

        self.report.networking = Some(Networking {
            status_code: document.status_code,
            headers: document.headers.clone(),
            final_url: document.final_url.clone(),
            redirected: document.redirected(),
            used_http_fallback,
            security_headers: analyze_security_headers(&document.headers, final_is_https),
            certificate: self.pending_certificate.take(),
        });
        self.report.performance = Some(Performance {
            time_to_first_byte_ms: document.time_to_first_byte_ms,
            total_ms: document.total_ms,
            head_bytes: document.head.bytes,
            truncated: document.head.truncated,
            content_length: document.content_length,
            content_encoding: document.content_encoding.clone(),
        });
        self.report.bot_protection = Some(detect_bot_protection(
            document.status_code,
            &document.headers,
            &document.head.markup,
        ));
    }

    pub fn has_document(&self) -> bool {
        self.report.networking.is_some()
    }

    pub fn set_certificate(&mut self, certificate: Probed<CertificateInfo>) {
        match self.report.networking.as_mut() {
            Some(networking) => networking.certificate = Some(certificate),
            None => self.pending_certificate = Some(certificate),
        }
    }

    pub fn has_certificate(&self) -> bool {
        self.pending_certificate.is_some()
            || self
                .report
                .networking
                .as_ref()
                .map(|n| n.certificate.is_some())
                .unwrap_or(false)
    }

    pub fn set_overview(&mut self, overview: Overview) {
        self.report.overview = Some(overview);
    }

    pub fn set_metadata(&mut self, metadata: PageMetadata) {
        self.report.metadata = Some(metadata);
    }

    pub fn set_resources(&mut self, resources: Resources) {
        self.report.resources = Some(resources);
    }

    pub fn set_data_feeds(&mut self, feeds: DataFeeds) {
        self.report.data_feeds = Some(feeds);
    }

    /// Merge head-derived discoverability, keeping resource checks already in
    pub fn merge_head_discoverability(&mut self, head: Discoverability) {
        let existing = self.report.discoverability.take().unwrap_or_default();
        self.report.discoverability = Some(Discoverability {
            robots_txt: existing.robots_txt,
            sitemap_xml: existing.sitemap_xml,
            llms_txt: existing.llms_txt,
            ..head
        });
        self.head_discoverability = true;
    }

    pub fn set_resource_check(&mut self, kind: ResourceKind, check: ResourceCheck) {
        let discoverability = self.report.discoverability.get_or_insert_with(Default::default);
        let slot = match kind {
            ResourceKind::RobotsTxt => &mut discoverability.robots_txt,
            ResourceKind::SitemapXml => &mut discoverability.sitemap_xml,
            ResourceKind::LlmsTxt => &mut discoverability.llms_txt,
        };
        *slot = Some(check);
    }

    /// Share of the discoverability inputs merged so far
    ///
    /// The head and each of the three resource checks count a quarter.
    pub fn discoverability_fraction(&self) -> f32 {
        let checks = self
            .report
            .discoverability
            .as_ref()
            .map(|d| {
                [&d.robots_txt, &d.sitemap_xml, &d.llms_txt]
                    .iter()
                    .filter(|c| c.is_some())
                    .count()
            })
            .unwrap_or(0);
        let parts = checks + usize::from(self.head_discoverability);
        parts as f32 / 4.0
    }

    pub fn set_dns(&mut self, dns: Probed<DnsRecords>) {
        self.report.dns = Some(dns);
    }

    pub fn set_history(&mut self, history: Probed<HistoryData>) {
        self.report.history = Some(history);
    }

    pub fn set_host_metadata(&mut self, host_metadata: Probed<HostMetadata>) {
        self.report.host_metadata = Some(host_metadata);
    }

    /// Mark every background category that never reported as unavailable
    ///
    /// Called once all background tasks are joined, so an empty slot means
    /// its task died without a result. Returns how many slots were filled.
    pub fn fill_unresolved(
        &mut self,
        reason: &str,
        resource_url: impl Fn(ResourceKind) -> String,
    ) -> usize {
        let mut filled = 0;

        for kind in ResourceKind::ALL {
            let missing = self
                .report
                .discoverability
                .as_ref()
                .map(|d| match kind {
                    ResourceKind::RobotsTxt => d.robots_txt.is_none(),
                    ResourceKind::SitemapXml => d.sitemap_xml.is_none(),
                    ResourceKind::LlmsTxt => d.llms_txt.is_none(),
                })
                .unwrap_or(true);
            if missing {
                self.set_resource_check(kind, ResourceCheck::missing(resource_url(kind), reason));
                filled += 1;
            }
        }

        if !self.has_certificate() {
            self.set_certificate(unresolved(reason));
            filled += 1;
        }
        if self.report.dns.is_none() {
            self.report.dns = Some(unresolved(reason));
            filled += 1;
        }
        if self.report.history.is_none() {
            self.report.history = Some(unresolved(reason));
            filled += 1;
        }
        if self.report.host_metadata.is_none() {
            self.report.host_metadata = Some(unresolved(reason));
            filled += 1;
        }
        filled
    }

    /// Apply [`reconcile_history`] against a previously stored report
    pub fn reconcile_history(&mut self, previous: Option<&Report>) {
        if let Some(history) = self.report.history.take() {
            self.report.history = Some(reconcile_history(history, previous));
        }
    }

    pub fn snapshot(&self) -> Report {
        self.report.clone()
    }

    pub fn finish(mut self, fetched_at: DateTime<Utc>) -> Report {
        if let (Some(networking), Some(certificate)) =
            (self.report.networking.as_mut(), self.pending_certificate.take())
        {
            networking.certificate = Some(certificate);
        }
        self.report.fetched_at = fetched_at;
        self.report
    }
}

fn unresolved<T>(reason: &str) -> Probed<T> {
    Probed::Unavailable {
        reason: reason.to_string(),
        kind: ProbeFailureKind::Unavailable,
    }
}

/// Keep known archive history when the archive throttled this lookup
///
/// A rate-limited zero count is "unknown", so a positive count from the
/// previous report wins. The result stays flagged as rate limited.
pub fn reconcile_history(
    current: Probed<HistoryData>,
    previous: Option<&Report>,
) -> Probed<HistoryData> {
    let throttled = match &current {
        Probed::Available { data } => data.rate_limited && data.wayback_machine_snapshots == 0,
        _ => false,
    };
    if !throttled {
        return current;
    }

    match previous.and_then(|report| report.history.as_ref()).and_then(|h| h.data()) {
        Some(known) if known.wayback_machine_snapshots > 0 => Probed::Available {
            data: HistoryData {
                rate_limited: true,
                ..known.clone()
            },
        },
        _ => current,
    }
}
