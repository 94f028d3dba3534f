// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use site_inspector::inspect::types::{ProbeCategory, ProbeFailure, ProbeFailureKind, Probed};
use site_inspector::inspect::{
    InspectConfig, InspectError, Inspector, ProgressState, ReportCache, ReportCategory,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::support::{document, history, ScriptedProbes};

#[cfg(test)]
mod tests {
    use super::*;

    fn inspector_with(probes: Arc<ScriptedProbes>, cache: ReportCache) -> Arc<Inspector> {
        Arc::new(Inspector::with_probes(
            probes,
            Arc::new(cache),
            InspectConfig::default(),
        ))
    }

    fn unavailable(message: &str) -> ProbeFailure {
        ProbeFailure::unavailable(ProbeCategory::Main, message)
    }

    /// Collect every progress state published until the sender goes away
    fn record_progress(
        mut rx: tokio::sync::watch::Receiver<ProgressState>,
    ) -> tokio::task::JoinHandle<Vec<ProgressState>> {
        tokio::spawn(async move {
            let mut seen = vec![rx.borrow_and_update().clone()];
            while rx.changed().await.is_ok() {
                seen.push(rx.borrow_and_update().clone());
            }
            seen
        })
    }

    #[tokio::test]
    async fn test_fresh_inspection_assembles_report() {
        let probes = Arc::new(ScriptedProbes::healthy());
        let inspector = inspector_with(probes.clone(), ReportCache::new(3600, 10));

        let report = inspector
            .inspect("Example.com.", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.url, "https://example.com");
        assert_eq!(probes.document_calls(), vec!["https://example.com/"]);

        let overview = report.overview.as_ref().unwrap();
        assert_eq!(overview.title.as_deref(), Some("Example Domain"));
        assert_eq!(overview.language.as_deref(), Some("en"));

        let disc = report.discoverability.as_ref().unwrap();
        assert_eq!(disc.canonical.as_deref(), Some("https://example.com/"));
        assert!(disc.robots_txt.as_ref().unwrap().exists);
        assert!(!disc.sitemap_xml.as_ref().unwrap().exists);
        assert!(disc.llms_txt.is_some());

        let networking = report.networking.as_ref().unwrap();
        assert_eq!(networking.status_code, 200);
        assert!(!networking.used_http_fallback);
        // Certificate failure is recorded, not fatal
        assert!(matches!(
            networking.certificate,
            Some(Probed::Unavailable { kind: ProbeFailureKind::Unavailable, .. })
        ));

        assert_eq!(report.dns.as_ref().unwrap().data().unwrap().a, vec!["93.184.215.14"]);
        assert_eq!(report.snapshot_count(), Some(42));
        assert_eq!(report.host_metadata, Some(Probed::NotFound));
        assert_eq!(report.data_feeds.as_ref().unwrap().rss, vec!["https://example.com/feed.xml"]);
        assert!(report.performance.is_some());
        assert!(report.bot_protection.is_some());

        assert_eq!(probes.background_completed.load(Ordering::SeqCst), 7);
        assert_eq!(inspector.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_crashed_background_task_is_recorded_unavailable() {
        let probes = Arc::new(ScriptedProbes::healthy().with_panicking_dns());
        let inspector = inspector_with(probes.clone(), ReportCache::new(3600, 10));

        let inspection = inspector.start("example.com");
        let progress = inspection.progress();
        let report = inspection.wait().await.unwrap();

        assert!(matches!(
            report.dns,
            Some(Probed::Unavailable { kind: ProbeFailureKind::Unavailable, .. })
        ));
        assert_eq!(report.snapshot_count(), Some(42));
        assert_eq!(probes.background_completed.load(Ordering::SeqCst), 6);
        assert!(progress.borrow().all_complete());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_probes_and_completes_progress() {
        let probes = Arc::new(ScriptedProbes::healthy());
        let inspector = inspector_with(probes.clone(), ReportCache::new(3600, 10));

        let first = inspector
            .inspect("https://example.com", CancellationToken::new())
            .await
            .unwrap();

        let inspection = inspector.start("example.com/");
        let progress = inspection.progress();
        let second = inspection.wait().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(probes.document_calls().len(), 1);
        assert!(progress.borrow().all_complete());
    }

    #[tokio::test]
    async fn test_rate_limited_history_keeps_previous_count() {
        let probes = Arc::new(ScriptedProbes::healthy());
        // Zero retention: every lookup misses but the previous entry stays peekable
        let inspector = inspector_with(probes.clone(), ReportCache::new(0, 10));

        let first = inspector
            .inspect("example.com", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.snapshot_count(), Some(42));

        probes.set_history(Ok(history(0, true)));
        let second = inspector
            .inspect("example.com", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(probes.document_calls().len(), 2);
        let data = second.history.as_ref().unwrap().data().unwrap();
        assert_eq!(data.wayback_machine_snapshots, 42);
        assert!(data.rate_limited);
        assert!(data.archive_url.is_some());
    }

    #[tokio::test]
    async fn test_rate_limited_history_without_previous_stays_unknown() {
        let probes = Arc::new(ScriptedProbes::healthy());
        probes.set_history(Ok(history(0, true)));
        let inspector = inspector_with(probes, ReportCache::new(3600, 10));

        let report = inspector
            .inspect("example.com", CancellationToken::new())
            .await
            .unwrap();
        let data = report.history.as_ref().unwrap().data().unwrap();
        assert_eq!(data.wayback_machine_snapshots, 0);
        assert!(data.rate_limited);
    }

    #[tokio::test]
    async fn test_double_document_failure_cancels_background() {
        let probes = Arc::new(
            ScriptedProbes::healthy()
                .with_documents(vec![
                    Err(unavailable("connection reset")),
                    Err(unavailable("connection refused")),
                ])
                .with_background_delay(Duration::from_secs(30)),
        );
        let inspector = inspector_with(probes.clone(), ReportCache::new(3600, 10));

        let start = Instant::now();
        let inspection = inspector.start("example.com");
        let recorder = record_progress(inspection.progress());
        let partial = inspection.partial();
        let result = inspection.wait().await;

        match result {
            Err(InspectError::FetchFailed { url, reason }) => {
                assert_eq!(url, "https://example.com");
                assert!(reason.contains("refused"));
            }
            other => panic!("expected FetchFailed, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(
            probes.document_calls(),
            vec!["https://example.com/", "http://example.com/"]
        );
        assert_eq!(probes.background_completed.load(Ordering::SeqCst), 0);
        assert!(inspector.cache().is_empty());

        // Nothing beyond "started" was ever published
        let states = recorder.await.unwrap();
        for state in &states {
            for category in ReportCategory::ALL {
                assert!(state.get(category) < 1.0);
            }
        }
        assert!(partial.borrow().is_none());
    }

    #[tokio::test]
    async fn test_http_url_has_no_fallback() {
        let probes = Arc::new(
            ScriptedProbes::healthy().with_documents(vec![Err(unavailable("connection refused"))]),
        );
        let inspector = inspector_with(probes.clone(), ReportCache::new(3600, 10));

        let result = inspector
            .inspect("http://example.com", CancellationToken::new())
            .await;
        assert!(matches!(result, Err(InspectError::FetchFailed { .. })));
        assert_eq!(probes.document_calls(), vec!["http://example.com/"]);
    }

    #[tokio::test]
    async fn test_http_fallback_is_flagged() {
        let probes = Arc::new(ScriptedProbes::healthy().with_documents(vec![Err(
            unavailable("tls handshake eof"),
        )]));
        let inspector = inspector_with(probes.clone(), ReportCache::new(3600, 10));

        let report = inspector
            .inspect("example.com", CancellationToken::new())
            .await
            .unwrap();
        assert!(report.networking.as_ref().unwrap().used_http_fallback);
        assert_eq!(probes.document_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_document_429_is_a_successful_probe() {
        let probes = Arc::new(ScriptedProbes::healthy().with_documents(vec![Ok(document(
            "https://example.com/",
            429,
            "",
        ))]));
        let inspector = inspector_with(probes, ReportCache::new(3600, 10));

        let report = inspector
            .inspect("example.com", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.networking.as_ref().unwrap().status_code, 429);
        assert_eq!(report.overview.as_ref().unwrap().title, None);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_complete() {
        let probes = Arc::new(
            ScriptedProbes::healthy()
                .with_document_delay(Duration::from_millis(30))
                .with_background_delay(Duration::from_millis(10)),
        );
        let inspector = inspector_with(probes, ReportCache::new(3600, 10));

        let inspection = inspector.start("example.com");
        let recorder = record_progress(inspection.progress());
        inspection.wait().await.unwrap();
        let states = recorder.await.unwrap();

        for pair in states.windows(2) {
            for category in ReportCategory::ALL {
                assert!(pair[1].get(category) >= pair[0].get(category));
            }
        }
        assert!(states.last().unwrap().all_complete());
    }

    #[tokio::test]
    async fn test_partial_reports_are_published() {
        let probes = Arc::new(ScriptedProbes::healthy());
        let inspector = inspector_with(probes, ReportCache::new(3600, 10));

        let inspection = inspector.start("example.com");
        let partial = inspection.partial();
        let report = inspection.wait().await.unwrap();

        let last = partial.borrow().clone().unwrap();
        assert_eq!(last, report);
    }

    #[tokio::test]
    async fn test_caller_cancellation() {
        let probes = Arc::new(
            ScriptedProbes::healthy()
                .with_document_delay(Duration::from_secs(30))
                .with_background_delay(Duration::from_secs(30)),
        );
        let inspector = inspector_with(probes.clone(), ReportCache::new(3600, 10));

        let inspection = inspector.start("example.com");
        let cancel = inspection.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let result = inspection.wait().await;
        assert!(matches!(result, Err(InspectError::Cancelled { .. })));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(probes.background_completed.load(Ordering::SeqCst), 0);
        assert!(inspector.cache().is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let probes = Arc::new(ScriptedProbes::healthy());
        let inspector = inspector_with(probes.clone(), ReportCache::new(3600, 10));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = inspector.inspect("example.com", cancel).await;
        assert!(matches!(result, Err(InspectError::Cancelled { .. })));
        assert!(probes.document_calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let probes = Arc::new(ScriptedProbes::healthy());
        let inspector = inspector_with(probes.clone(), ReportCache::new(3600, 10));

        for input in ["", "ftp://example.com", "intranet", "two words.com"] {
            let result = inspector.inspect(input, CancellationToken::new()).await;
            assert!(
                matches!(result, Err(InspectError::InvalidUrl { .. })),
                "{} should be rejected",
                input
            );
        }
        assert!(probes.document_calls().is_empty());
    }
}
