// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use site_inspector::inspect::probes::{
    archive, document, host_meta, resource, ArchiveEndpoints, NetworkProbes, ProbeSet,
    ResourceKind,
};
use site_inspector::inspect::types::ProbeFailureKind;
use site_inspector::inspect::{InspectConfig, Inspector, Probed, ReportCache};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::support::serve;

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> reqwest::Client {
        reqwest::Client::builder().build().unwrap()
    }

    // ---- existence probes ----

    #[tokio::test]
    async fn test_robots_html_200_is_soft_404() {
        let base = serve(Router::new().route(
            "/robots.txt",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                    "<!DOCTYPE html><html><head><title>Not Found</title></head><body>Oops</body></html>",
                )
            }),
        ))
        .await;

        let url = format!("{}/robots.txt", base);
        let check = resource::check_resource(&client(), ResourceKind::RobotsTxt, &url)
            .await
            .unwrap();
        assert_eq!(check.status_code, Some(200));
        assert!(!check.exists);
        assert!(check.is_soft_404);
    }

    #[tokio::test]
    async fn test_real_robots_exists() {
        let base = serve(Router::new().route(
            "/robots.txt",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/plain")],
                    "User-agent: *\nDisallow: /private\n",
                )
            }),
        ))
        .await;

        let url = format!("{}/robots.txt", base);
        let check = resource::check_resource(&client(), ResourceKind::RobotsTxt, &url)
            .await
            .unwrap();
        assert!(check.exists);
        assert!(!check.is_soft_404);
        assert_eq!(check.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_missing_sitemap_is_plain_404() {
        let base = serve(Router::new()).await;

        let url = format!("{}/sitemap.xml", base);
        let check = resource::check_resource(&client(), ResourceKind::SitemapXml, &url)
            .await
            .unwrap();
        assert_eq!(check.status_code, Some(404));
        assert!(!check.exists);
        assert!(!check.is_soft_404);
    }

    // ---- primary document ----

    #[tokio::test]
    async fn test_document_429_with_empty_body_succeeds() {
        let base = serve(Router::new().route(
            "/",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "60")], "") }),
        ))
        .await;

        let url = Url::parse(&base).unwrap();
        let fetch = document::fetch_document(&client(), &url, 1024, 65536)
            .await
            .unwrap();
        assert_eq!(fetch.status_code, 429);
        assert_eq!(fetch.header("Retry-After"), Some("60"));
        assert!(fetch.head.markup.is_empty());
        assert!(!fetch.head.truncated);
    }

    #[tokio::test]
    async fn test_oversize_head_without_markers_is_truncated_at_ceiling() {
        let base = serve(Router::new().route(
            "/",
            get(|| async { "x".repeat(300_000) }),
        ))
        .await;

        let url = Url::parse(&base).unwrap();
        let fetch = document::fetch_document(&client(), &url, 1024, 65536)
            .await
            .unwrap();
        assert_eq!(fetch.head.bytes, 65536);
        assert_eq!(fetch.head.markup.len(), 65536);
        assert!(fetch.head.truncated);
    }

    #[tokio::test]
    async fn test_document_head_capture_stops_after_head() {
        let page = format!(
            "<html><head><title>Local</title><style>{}</style></head><body>{}</body></html>",
            "a{}".repeat(2000),
            "<p>body</p>".repeat(10_000)
        );
        let base = serve(Router::new().route(
            "/",
            get(move || {
                let page = page.clone();
                async move { ([(header::CONTENT_TYPE, "text/html")], page) }
            }),
        ))
        .await;

        let url = Url::parse(&base).unwrap();
        let fetch = document::fetch_document(&client(), &url, 1024, 512 * 1024)
            .await
            .unwrap();
        assert!(fetch.head.markup.ends_with("</head>"));
        assert!(fetch.head.truncated);
        assert_eq!(fetch.header("content-type"), Some("text/html"));
    }

    #[tokio::test]
    async fn test_document_follows_redirects() {
        let base = serve(
            Router::new()
                .route("/old", get(|| async { Redirect::permanent("/new") }))
                .route("/new", get(|| async { "<head><title>New</title></head>" })),
        )
        .await;

        let url = Url::parse(&format!("{}/old", base)).unwrap();
        let fetch = document::fetch_document(&client(), &url, 0, 65536)
            .await
            .unwrap();
        assert_eq!(fetch.status_code, 200);
        assert!(fetch.final_url.ends_with("/new"));
        assert!(fetch.redirected());
    }

    #[tokio::test]
    async fn test_unreachable_document_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        let failure = document::fetch_document(&client(), &url, 0, 65536)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ProbeFailureKind::Unavailable);
    }

    // ---- archive ----

    fn availability_json(base: &str) -> String {
        format!(
            r#"{{"url":"example.com","archived_snapshots":{{"closest":{{"status":"200","available":true,"url":"{}/web/20240101000000/https://example.com","timestamp":"20240101000000"}}}}}}"#,
            base
        )
    }

    #[tokio::test]
    async fn test_archive_counts_snapshots() {
        let router = Router::new()
            .route(
                "/wayback/available",
                get(|| async { availability_json("https://web.archive.org") }),
            )
            .route(
                "/cdx/search/cdx",
                get(|| async {
                    r#"[["timestamp"],["20100315000000"],["20150101120000"],["20240101000000"]]"#
                }),
            );
        let base = serve(router).await;

        let endpoints = ArchiveEndpoints::with_base(&base);
        let history = archive::lookup_history(&client(), &endpoints, "https://example.com")
            .await
            .unwrap();
        assert_eq!(history.wayback_machine_snapshots, 3);
        assert!(!history.rate_limited);
        assert!(!history.count_capped);
        assert_eq!(history.first_seen.unwrap().to_rfc3339(), "2010-03-15T00:00:00+00:00");
        assert_eq!(history.last_seen.unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert!(history.archive_url.unwrap().contains("20240101000000"));
    }

    #[tokio::test]
    async fn test_archive_count_is_bounded_by_row_limit() {
        let router = Router::new()
            .route(
                "/wayback/available",
                get(|| async { availability_json("https://web.archive.org") }),
            )
            .route(
                "/cdx/search/cdx",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    // Every capture is counted, capped by the requested limit
                    assert!(!params.contains_key("collapse"));
                    let limit: usize = params["limit"].parse().unwrap();
                    let rows: Vec<[&str; 1]> = std::iter::once(["timestamp"])
                        .chain(std::iter::repeat(["20100315000000"]).take(limit))
                        .collect();
                    serde_json::to_string(&rows).unwrap()
                }),
            );
        let base = serve(router).await;

        let endpoints = ArchiveEndpoints::with_base(&base);
        let history = archive::lookup_history(&client(), &endpoints, "https://example.com")
            .await
            .unwrap();
        assert_eq!(history.wayback_machine_snapshots, archive::CDX_ROW_LIMIT as u64);
        assert!(history.count_capped);
        // The newest capture comes from the availability answer
        assert_eq!(history.last_seen.unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn test_archive_429_is_rate_limited() {
        let base = serve(Router::new().route(
            "/wayback/available",
            get(|| async { StatusCode::TOO_MANY_REQUESTS }),
        ))
        .await;

        let endpoints = ArchiveEndpoints::with_base(&base);
        let history = archive::lookup_history(&client(), &endpoints, "https://example.com")
            .await
            .unwrap();
        assert!(history.rate_limited);
        assert_eq!(history.wayback_machine_snapshots, 0);
    }

    #[tokio::test]
    async fn test_archive_empty_count_after_positive_availability() {
        let router = Router::new()
            .route(
                "/wayback/available",
                get(|| async { availability_json("https://web.archive.org") }),
            )
            .route("/cdx/search/cdx", get(|| async { "" }));
        let base = serve(router).await;

        let endpoints = ArchiveEndpoints::with_base(&base);
        let history = archive::lookup_history(&client(), &endpoints, "https://example.com")
            .await
            .unwrap();
        assert!(history.rate_limited);
        assert_eq!(history.wayback_machine_snapshots, 0);
        assert!(history.archive_url.is_some());
    }

    #[tokio::test]
    async fn test_archive_never_archived() {
        let base = serve(Router::new().route(
            "/wayback/available",
            get(|| async { r#"{"url":"example.com","archived_snapshots":{}}"# }),
        ))
        .await;

        let endpoints = ArchiveEndpoints::with_base(&base);
        let history = archive::lookup_history(&client(), &endpoints, "https://example.com")
            .await
            .unwrap();
        assert_eq!(history.wayback_machine_snapshots, 0);
        assert!(!history.rate_limited);
    }

    #[tokio::test]
    async fn test_archive_server_error_is_unavailable() {
        let base = serve(Router::new().route(
            "/wayback/available",
            get(|| async { StatusCode::BAD_GATEWAY }),
        ))
        .await;

        let endpoints = ArchiveEndpoints::with_base(&base);
        let failure = archive::lookup_history(&client(), &endpoints, "https://example.com")
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ProbeFailureKind::Unavailable);
    }

    // ---- host metadata ----

    #[tokio::test]
    async fn test_host_meta_falls_back_to_xrd() {
        let base = serve(Router::new().route(
            "/.well-known/host-meta",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "application/xrd+xml")],
                    r#"<?xml version="1.0"?><XRD xmlns="http://docs.oasis-open.org/ns/xri/xrd-1.0"><Link rel="lrdd" template="https://example.com/.well-known/webfinger?resource={uri}"/></XRD>"#,
                )
            }),
        ))
        .await;

        let meta = host_meta::fetch_host_meta(&client(), &base).await.unwrap();
        assert_eq!(meta.source, host_meta::XRD_PATH);
        assert_eq!(meta.links.len(), 1);
        assert_eq!(meta.links[0].rel, "lrdd");
    }

    #[tokio::test]
    async fn test_host_meta_prefers_json() {
        let base = serve(
            Router::new()
                .route(
                    "/.well-known/host-meta.json",
                    get(|| async { r#"{"links":[{"rel":"lrdd","template":"https://example.com/wf?r={uri}"}]}"# }),
                )
                .route("/.well-known/host-meta", get(|| async { "<XRD></XRD>" })),
        )
        .await;

        let meta = host_meta::fetch_host_meta(&client(), &base).await.unwrap();
        assert_eq!(meta.source, host_meta::JSON_PATH);
    }

    #[tokio::test]
    async fn test_host_meta_absent_is_not_found() {
        let base = serve(Router::new().route(
            "/.well-known/host-meta",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html><body>nope</body></html>") }),
        ))
        .await;

        let failure = host_meta::fetch_host_meta(&client(), &base).await.unwrap_err();
        assert_eq!(failure.kind, ProbeFailureKind::NotFound);
    }

    // ---- full run over the network probe set ----

    #[tokio::test]
    async fn test_inspector_against_local_site() {
        let router = Router::new()
            .route(
                "/",
                get(|| async {
                    (
                        [
                            (header::CONTENT_TYPE, "text/html"),
                            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
                        ],
                        "<html lang=\"en\"><head><title>Local Site</title></head><body>hi</body></html>",
                    )
                }),
            )
            .route("/robots.txt", get(|| async { "User-agent: *\nAllow: /\n" }))
            .route("/llms.txt", get(|| async { "# Local Site\n> A test site\n" }))
            .route("/wayback/available", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let base = serve(router).await;

        let mut config = InspectConfig::default();
        config.dns_timeout_secs = 1;
        config.tls_timeout_secs = 1;
        config.archive_timeout_secs = 2;
        let probes = NetworkProbes::new(&config)
            .unwrap()
            .with_archive_endpoints(ArchiveEndpoints::with_base(&base));
        let probes: Arc<dyn ProbeSet> = Arc::new(probes);
        let inspector = Inspector::with_probes(probes, Arc::new(ReportCache::new(3600, 10)), config);

        let report = inspector
            .inspect(&base, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.url, base);
        assert_eq!(
            report.overview.as_ref().unwrap().title.as_deref(),
            Some("Local Site")
        );

        let disc = report.discoverability.as_ref().unwrap();
        assert!(disc.robots_txt.as_ref().unwrap().exists);
        assert!(disc.llms_txt.as_ref().unwrap().exists);
        assert!(!disc.sitemap_xml.as_ref().unwrap().exists);

        let networking = report.networking.as_ref().unwrap();
        assert_eq!(networking.status_code, 200);
        assert_eq!(networking.security_headers.x_content_type_options.as_deref(), Some("nosniff"));
        // Nothing listens on 443 locally
        assert!(matches!(
            networking.certificate,
            Some(Probed::Unavailable { .. })
        ));

        assert_eq!(report.dns.as_ref().unwrap().data().unwrap().a, vec!["127.0.0.1"]);
        assert!(report.history.as_ref().unwrap().data().unwrap().rate_limited);
        assert_eq!(report.host_metadata, Some(Probed::NotFound));
        assert!(report.performance.as_ref().unwrap().head_bytes > 0);
    }
}
