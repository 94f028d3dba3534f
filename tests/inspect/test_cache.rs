// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use site_inspector::inspect::types::{HistoryData, Probed};
use site_inspector::inspect::{InspectConfig, Inspector, Report, ReportCache};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::support::ScriptedProbes;

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with_history(url: &str, snapshots: u64) -> Report {
        let mut report = Report::empty(url);
        report.history = Some(Probed::Available {
            data: HistoryData {
                wayback_machine_snapshots: snapshots,
                ..Default::default()
            },
        });
        report
    }

    #[tokio::test]
    async fn test_persisted_cache_serves_next_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.json");

        let mut config = InspectConfig::default();
        config.cache_path = Some(path.clone());

        {
            let inspector = Inspector::new(config.clone()).unwrap();
            inspector
                .cache()
                .put("https://example.com", report_with_history("https://example.com", 7));
        }
        assert!(path.exists());

        // A fresh inspector reading the same index answers without probing
        let probes = Arc::new(ScriptedProbes::healthy());
        let cache = ReportCache::open(&path, config.cache_retention_secs, config.cache_max_entries);
        let inspector = Inspector::with_probes(probes.clone(), Arc::new(cache), config);

        let report = inspector
            .inspect("example.com", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.snapshot_count(), Some(7));
        assert!(probes.document_calls().is_empty());
    }

    #[tokio::test]
    async fn test_inspection_writes_through_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reports.json");

        let probes = Arc::new(ScriptedProbes::healthy());
        let cache = Arc::new(ReportCache::open(&path, 3600, 5));
        let inspector = Inspector::with_probes(probes, cache, InspectConfig::default());

        inspector
            .inspect("https://example.org/docs", CancellationToken::new())
            .await
            .unwrap();

        let reloaded = ReportCache::open(&path, 3600, 5);
        let entry = reloaded.peek("https://example.org/docs").unwrap();
        assert_eq!(entry.url, "https://example.org/docs");
        assert_eq!(entry.data.snapshot_count(), Some(42));
    }

    #[tokio::test]
    async fn test_ceiling_holds_across_inspections() {
        let probes = Arc::new(ScriptedProbes::healthy());
        let inspector = Inspector::with_probes(
            probes,
            Arc::new(ReportCache::new(3600, 2)),
            InspectConfig::default(),
        );

        for host in ["a.example.com", "b.example.com", "c.example.com"] {
            inspector.inspect(host, CancellationToken::new()).await.unwrap();
        }

        let cache = inspector.cache();
        assert_eq!(cache.len(), 2);
        assert!(cache.peek("https://a.example.com").is_none());
        assert!(cache.peek("https://c.example.com").is_some());
    }
}
