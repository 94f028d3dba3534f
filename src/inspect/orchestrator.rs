// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inspection orchestration
//!
//! Coordinates URL normalization, the report cache, the probe set and
//! progress reporting for one URL at a time. Background probes run as one
//! task group under a child cancellation token while the primary document
//! is fetched; results merge into the report in completion order.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use url::Url;
use uuid::Uuid;

use super::builder::ReportBuilder;
use super::cache::ReportCache;
use super::config::InspectConfig;
use super::head::HeadDocument;
use super::probes::{guarded, DocumentFetch, NetworkProbes, ProbeSet, ResourceKind};
use super::progress::{ProgressState, ProgressTracker, ReportCategory};
use super::types::{
    CertificateInfo, DnsRecords, HistoryData, HostMetadata, InspectError, ProbeCategory,
    ProbeFailure, Probed, Report, ResourceCheck,
};
use super::url::{normalize_url, NormalizedUrl};

/// Result of one background probe task
enum Background {
    Resource {
        kind: ResourceKind,
        url: String,
        result: Result<ResourceCheck, ProbeFailure>,
    },
    Dns(Result<DnsRecords, ProbeFailure>),
    Certificate(Result<CertificateInfo, ProbeFailure>),
    History(Result<HistoryData, ProbeFailure>),
    HostMeta(Result<HostMetadata, ProbeFailure>),
}

impl Background {
    fn is_cancelled(&self) -> bool {
        let failure = match self {
            Background::Resource { result, .. } => result.as_ref().err(),
            Background::Dns(result) => result.as_ref().err(),
            Background::Certificate(result) => result.as_ref().err(),
            Background::History(result) => result.as_ref().err(),
            Background::HostMeta(result) => result.as_ref().err(),
        };
        failure.map(|f| f.is_cancelled()).unwrap_or(false)
    }
}

/// Where a request publishes progress and partial reports
struct Observer {
    progress: Arc<ProgressTracker>,
    partial: watch::Sender<Option<Report>>,
}

impl Observer {
    fn new() -> Self {
        let (partial, _rx) = watch::channel(None);
        Self {
            progress: Arc::new(ProgressTracker::new()),
            partial,
        }
    }

    fn publish(&self, builder: &ReportBuilder) {
        if !self.progress.is_frozen() {
            self.partial.send_replace(Some(builder.snapshot()));
        }
    }
}

/// A running inspection started with [`Inspector::start`]
pub struct Inspection {
    input: String,
    progress: watch::Receiver<ProgressState>,
    partial: watch::Receiver<Option<Report>>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<Report, InspectError>>,
}

impl Inspection {
    /// Live per-category progress
    pub fn progress(&self) -> watch::Receiver<ProgressState> {
        self.progress.clone()
    }

    /// Snapshots of the report as it is assembled
    pub fn partial(&self) -> watch::Receiver<Option<Report>> {
        self.partial.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the final report
    pub async fn wait(self) -> Result<Report, InspectError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(InspectError::Cancelled { url: self.input }),
            Err(e) => Err(InspectError::FetchFailed {
                url: self.input,
                reason: format!("inspection task failed: {}", e),
            }),
        }
    }
}

/// Inspects URLs and caches the resulting reports
pub struct Inspector {
    probes: Arc<dyn ProbeSet>,
    cache: Arc<ReportCache>,
    config: InspectConfig,
}

impl Inspector {
    /// Create an inspector with network probes and the configured cache
    pub fn new(config: InspectConfig) -> anyhow::Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;
        let probes = NetworkProbes::new(&config)?;
        let cache = match &config.cache_path {
            Some(path) => ReportCache::open(
                path.clone(),
                config.cache_retention_secs,
                config.cache_max_entries,
            ),
            None => ReportCache::new(config.cache_retention_secs, config.cache_max_entries),
        };
        Ok(Self::with_probes(Arc::new(probes), Arc::new(cache), config))
    }

    /// Create an inspector over an arbitrary probe set and cache
    pub fn with_probes(
        probes: Arc<dyn ProbeSet>,
        cache: Arc<ReportCache>,
        config: InspectConfig,
    ) -> Self {
        Self {
            probes,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<ReportCache> {
        &self.cache
    }

    pub fn config(&self) -> &InspectConfig {
        &self.config
    }

    /// Inspect `input` to completion
    pub async fn inspect(
        &self,
        input: &str,
        cancel: CancellationToken,
    ) -> Result<Report, InspectError> {
        let observer = Observer::new();
        self.run(input, cancel, &observer).await
    }

    /// Start inspecting `input` in the background
    pub fn start(self: &Arc<Self>, input: &str) -> Inspection {
        let observer = Observer::new();
        let progress = observer.progress.subscribe();
        let partial = observer.partial.subscribe();
        let cancel = CancellationToken::new();

        let inspector = Arc::clone(self);
        let task_input = input.to_string();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            inspector.run(&task_input, task_cancel, &observer).await
        });

        Inspection {
            input: input.to_string(),
            progress,
            partial,
            cancel,
            handle,
        }
    }

    async fn run(
        &self,
        input: &str,
        cancel: CancellationToken,
        observer: &Observer,
    ) -> Result<Report, InspectError> {
        let url = normalize_url(input)?;
        let span = info_span!("inspect", request_id = %Uuid::new_v4(), url = %url);
        self.run_normalized(&url, cancel, observer)
            .instrument(span)
            .await
    }

    async fn run_normalized(
        &self,
        url: &NormalizedUrl,
        cancel: CancellationToken,
        observer: &Observer,
    ) -> Result<Report, InspectError> {
        let progress = &observer.progress;
        progress.reset();

        if cancel.is_cancelled() {
            progress.freeze();
            return Err(InspectError::Cancelled {
                url: url.to_string(),
            });
        }

        if let Some(report) = self.cache.get_async(url.as_str()).await {
            info!("Report served from cache");
            progress.complete_all();
            observer.partial.send_replace(Some(report.clone()));
            return Ok(report);
        }

        progress.start();
        let mut builder = ReportBuilder::new(url.as_str());
        let probe_cancel = cancel.child_token();
        let mut tasks = JoinSet::new();
        self.spawn_background(&mut tasks, url, &probe_cancel);

        // Drive the document while merging background results as they land
        let document = self.fetch_primary(url, &cancel);
        tokio::pin!(document);
        let outcome = loop {
            tokio::select! {
                outcome = &mut document => break outcome,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok(background) => self.merge(background, &mut builder, observer),
                    Err(e) => warn!(error = %e, "Background probe task failed"),
                },
            }
        };

        let (fetch, used_http_fallback) = match outcome {
            Ok(fetched) => fetched,
            Err(failure) => {
                // Nothing more is published for a failed request
                progress.freeze();
                probe_cancel.cancel();
                while tasks.join_next().await.is_some() {}

                if failure.is_cancelled() || cancel.is_cancelled() {
                    info!("Inspection cancelled");
                    return Err(InspectError::Cancelled {
                        url: url.to_string(),
                    });
                }
                warn!(error = %failure, "Primary document unreachable");
                return Err(InspectError::FetchFailed {
                    url: url.to_string(),
                    reason: failure.message,
                });
            }
        };

        self.merge_document(&fetch, used_http_fallback, url, &mut builder, observer);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(background) => self.merge(background, &mut builder, observer),
                Err(e) => warn!(error = %e, "Background probe task failed"),
            }
        }

        if cancel.is_cancelled() {
            progress.freeze();
            info!("Inspection cancelled");
            return Err(InspectError::Cancelled {
                url: url.to_string(),
            });
        }

        let unresolved =
            builder.fill_unresolved("probe task failed", |kind| url.origin_join(kind.path()));
        if unresolved > 0 {
            warn!(unresolved, "Background categories recorded as unavailable");
        }

        let previous = self.cache.peek(url.as_str()).map(|entry| entry.data);
        builder.reconcile_history(previous.as_ref());
        let report = builder.finish(Utc::now());

        self.cache.put_async(url.as_str(), report.clone()).await;
        progress.complete_all();
        observer.partial.send_replace(Some(report.clone()));
        info!(
            status_code = report.networking.as_ref().map(|n| n.status_code),
            snapshots = report.snapshot_count(),
            "Inspection complete"
        );
        Ok(report)
    }

    /// HTTPS first, then one plain HTTP attempt if that failed outright
    async fn fetch_primary(
        &self,
        url: &NormalizedUrl,
        cancel: &CancellationToken,
    ) -> Result<(DocumentFetch, bool), ProbeFailure> {
        let timeout = self.config.document_timeout();
        let first = guarded(
            ProbeCategory::Main,
            timeout,
            cancel,
            self.probes.fetch_document(url.url()),
        )
        .await;

        let failure = match first {
            Ok(fetch) => return Ok((fetch, false)),
            Err(failure) if failure.is_cancelled() => return Err(failure),
            Err(failure) => failure,
        };

        let Some(fallback) = url.http_fallback() else {
            return Err(failure.irrecoverable());
        };
        warn!(error = %failure, fallback = %fallback, "HTTPS fetch failed, retrying over HTTP");
        guarded(
            ProbeCategory::Main,
            timeout,
            cancel,
            self.probes.fetch_document(&fallback),
        )
        .await
        .map(|fetch| (fetch, true))
        .map_err(|failure| failure.irrecoverable())
    }

    fn spawn_background(
        &self,
        tasks: &mut JoinSet<Background>,
        url: &NormalizedUrl,
        cancel: &CancellationToken,
    ) {
        let span = Span::current();

        for kind in ResourceKind::ALL {
            let probes = Arc::clone(&self.probes);
            let token = cancel.clone();
            let timeout = self.config.resource_timeout();
            let target = url.origin_join(kind.path());
            tasks.spawn(
                async move {
                    let result =
                        guarded(kind.category(), timeout, &token, probes.check_resource(kind, &target))
                            .await;
                    Background::Resource {
                        kind,
                        url: target,
                        result,
                    }
                }
                .instrument(span.clone()),
            );
        }

        let host = url.host().to_string();
        {
            let probes = Arc::clone(&self.probes);
            let token = cancel.clone();
            let timeout = self.config.dns_timeout();
            let host = host.clone();
            tasks.spawn(
                async move {
                    Background::Dns(
                        guarded(ProbeCategory::Dns, timeout, &token, probes.resolve_dns(&host)).await,
                    )
                }
                .instrument(span.clone()),
            );
        }

        {
            let probes = Arc::clone(&self.probes);
            let token = cancel.clone();
            let timeout = self.config.tls_timeout();
            let port = tls_port(url.url());
            tasks.spawn(
                async move {
                    Background::Certificate(
                        guarded(
                            ProbeCategory::Certificate,
                            timeout,
                            &token,
                            probes.inspect_certificate(&host, port),
                        )
                        .await,
                    )
                }
                .instrument(span.clone()),
            );
        }

        {
            let probes = Arc::clone(&self.probes);
            let token = cancel.clone();
            let timeout = self.config.archive_timeout();
            let target = url.as_str().to_string();
            tasks.spawn(
                async move {
                    Background::History(
                        guarded(ProbeCategory::Wayback, timeout, &token, probes.lookup_history(&target))
                            .await,
                    )
                }
                .instrument(span.clone()),
            );
        }

        {
            let probes = Arc::clone(&self.probes);
            let token = cancel.clone();
            let timeout = self.config.host_meta_timeout();
            let origin = url.origin();
            tasks.spawn(
                async move {
                    Background::HostMeta(
                        guarded(ProbeCategory::HostMeta, timeout, &token, probes.fetch_host_meta(&origin))
                            .await,
                    )
                }
                .instrument(span),
            );
        }
    }

    fn merge(&self, background: Background, builder: &mut ReportBuilder, observer: &Observer) {
        if background.is_cancelled() {
            return;
        }
        let progress = &observer.progress;

        match background {
            Background::Resource { kind, url, result } => {
                let check = result.unwrap_or_else(|failure| {
                    debug!(resource = kind.path(), error = %failure, "Resource check failed");
                    ResourceCheck::missing(url, failure.message)
                });
                builder.set_resource_check(kind, check);
                progress.advance(ReportCategory::Discoverability, builder.discoverability_fraction());
            }
            Background::Dns(result) => {
                builder.set_dns(Probed::from_result(result));
                progress.complete(ReportCategory::Dns);
            }
            Background::Certificate(result) => {
                builder.set_certificate(Probed::from_result(result));
                if builder.has_document() {
                    progress.complete(ReportCategory::Networking);
                } else {
                    progress.advance(ReportCategory::Networking, 0.5);
                }
            }
            Background::History(result) => {
                builder.set_history(Probed::from_result(result));
                progress.complete(ReportCategory::History);
            }
            Background::HostMeta(result) => {
                builder.set_host_metadata(Probed::from_result(result));
                progress.complete(ReportCategory::HostMetadata);
            }
        }
        observer.publish(builder);
    }

    fn merge_document(
        &self,
        fetch: &DocumentFetch,
        used_http_fallback: bool,
        url: &NormalizedUrl,
        builder: &mut ReportBuilder,
        observer: &Observer,
    ) {
        let progress = &observer.progress;

        builder.set_document(fetch, used_http_fallback);
        if builder.has_certificate() {
            progress.complete(ReportCategory::Networking);
        } else {
            progress.advance(ReportCategory::Networking, 0.5);
        }
        progress.complete(ReportCategory::Performance);
        progress.complete(ReportCategory::BotProtection);
        observer.publish(builder);

        let page_url = Url::parse(&fetch.final_url).unwrap_or_else(|_| url.url().clone());
        let head = HeadDocument::parse(&fetch.head.markup, &page_url);

        builder.set_overview(head.overview());
        progress.complete(ReportCategory::Overview);
        observer.publish(builder);

        builder.set_metadata(head.metadata());
        progress.complete(ReportCategory::Metadata);
        observer.publish(builder);

        builder.merge_head_discoverability(head.discoverability());
        progress.advance(ReportCategory::Discoverability, builder.discoverability_fraction());
        observer.publish(builder);

        builder.set_resources(head.resources());
        progress.complete(ReportCategory::Resources);
        observer.publish(builder);

        builder.set_data_feeds(head.data_feeds());
        progress.complete(ReportCategory::DataFeeds);
        observer.publish(builder);

        debug!(
            status_code = fetch.status_code,
            head_bytes = fetch.head.bytes,
            used_http_fallback,
            "Head extracted"
        );
    }
}

/// Port for the certificate probe: the URL's own port for https, else 443
fn tls_port(url: &Url) -> u16 {
    if url.scheme() == "https" {
        url.port_or_known_default().unwrap_or(443)
    } else {
        443
    }
}
