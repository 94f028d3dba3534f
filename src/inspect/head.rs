// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Extraction of report categories from captured `<head>` markup
//!
//! [`HeadDocument`] wraps a parsed `scraper::Html`, which is not `Send`.
//! Callers in async code must build and drop it without crossing an await.

use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

use super::types::{AlternateLink, DataFeeds, Discoverability, Overview, PageMetadata, Resources};

/// Parsed head markup plus the URL relative links resolve against
pub struct HeadDocument {
    html: Html,
    base: Url,
}

impl HeadDocument {
    /// Parse `markup`; a `<base href>` in the markup overrides `page_url`
    pub fn parse(markup: &str, page_url: &Url) -> Self {
        let html = Html::parse_document(markup);
        let mut doc = Self {
            html,
            base: page_url.clone(),
        };
        if let Some(base) = doc
            .first_attr("base[href]", "href")
            .and_then(|href| page_url.join(&href).ok())
        {
            doc.base = base;
        }
        doc
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn elements(&self, css: &str) -> Vec<ElementRef<'_>> {
        match Selector::parse(css) {
            Ok(selector) => self.html.select(&selector).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn first_attr(&self, css: &str, attr: &str) -> Option<String> {
        self.elements(css)
            .into_iter()
            .filter_map(|el| el.value().attr(attr))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with("javascript:") || href.starts_with("data:") {
            return None;
        }
        self.base.join(href).ok().map(|url| url.to_string())
    }

    /// `<meta>` content keyed by lowercased `name` or `property`
    fn meta_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for el in self.elements("meta[content]") {
            let value = el.value();
            let key = value.attr("property").or_else(|| value.attr("name"));
            if let (Some(key), Some(content)) = (key, value.attr("content")) {
                let key = key.trim().to_ascii_lowercase();
                if !key.is_empty() {
                    map.entry(key).or_insert_with(|| content.trim().to_string());
                }
            }
        }
        map
    }

    /// `<link>` elements as (rel tokens, element)
    fn links(&self) -> Vec<(Vec<String>, ElementRef<'_>)> {
        self.elements("link[rel]")
            .into_iter()
            .filter_map(|el| {
                let rel = el.value().attr("rel")?;
                let tokens = rel
                    .split_ascii_whitespace()
                    .map(|t| t.to_ascii_lowercase())
                    .collect::<Vec<_>>();
                Some((tokens, el))
            })
            .collect()
    }

    fn link_hrefs(&self, wanted: &[&str]) -> Vec<String> {
        let mut hrefs = Vec::new();
        for (rel, el) in self.links() {
            if rel.iter().any(|token| wanted.contains(&token.as_str())) {
                if let Some(href) = el.value().attr("href").and_then(|h| self.resolve(h)) {
                    push_unique(&mut hrefs, href);
                }
            }
        }
        hrefs
    }

    pub fn overview(&self) -> Overview {
        let meta = self.meta_map();
        let title = self
            .elements("title")
            .into_iter()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .find(|title| !title.is_empty());

        Overview {
            title,
            description: meta.get("description").cloned(),
            favicon: self.link_hrefs(&["icon"]).into_iter().next(),
            language: self.first_attr("html[lang]", "lang"),
            site_name: meta
                .get("og:site_name")
                .or_else(|| meta.get("application-name"))
                .cloned(),
            theme_color: meta.get("theme-color").cloned(),
            generator: meta.get("generator").cloned(),
        }
    }

    pub fn metadata(&self) -> PageMetadata {
        let mut metadata = PageMetadata::default();
        for (key, value) in self.meta_map() {
            if let Some(og) = key.strip_prefix("og:") {
                metadata.open_graph.insert(og.to_string(), value);
            } else if let Some(twitter) = key.strip_prefix("twitter:") {
                metadata.twitter.insert(twitter.to_string(), value);
            } else {
                metadata.meta_tags.insert(key, value);
            }
        }

        for el in self.elements(r#"script[type="application/ld+json"]"#) {
            let raw = el.text().collect::<String>();
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw.trim()) {
                collect_json_ld_types(&value, &mut metadata.json_ld_types);
            }
        }
        metadata
    }

    /// Head-derived discoverability; the resource checks are filled in later
    pub fn discoverability(&self) -> Discoverability {
        let mut alternates = Vec::new();
        for (rel, el) in self.links() {
            if !rel.iter().any(|t| t == "alternate") {
                continue;
            }
            let Some(hreflang) = el.value().attr("hreflang") else {
                continue;
            };
            if let Some(href) = el.value().attr("href").and_then(|h| self.resolve(h)) {
                alternates.push(AlternateLink {
                    href,
                    hreflang: Some(hreflang.trim().to_string()),
                });
            }
        }

        Discoverability {
            canonical: self.link_hrefs(&["canonical"]).into_iter().next(),
            robots_meta: self.meta_map().get("robots").cloned(),
            alternates,
            ..Default::default()
        }
    }

    pub fn resources(&self) -> Resources {
        let mut scripts = Vec::new();
        for el in self.elements("script[src]") {
            if let Some(src) = el.value().attr("src").and_then(|s| self.resolve(s)) {
                push_unique(&mut scripts, src);
            }
        }

        Resources {
            stylesheets: self.link_hrefs(&["stylesheet"]),
            scripts,
            preloads: self.link_hrefs(&["preload", "modulepreload", "prefetch"]),
            preconnects: self.link_hrefs(&["preconnect", "dns-prefetch"]),
            icons: self.link_hrefs(&["icon", "apple-touch-icon", "apple-touch-icon-precomposed", "mask-icon"]),
            manifest: self.link_hrefs(&["manifest"]).into_iter().next(),
        }
    }

    pub fn data_feeds(&self) -> DataFeeds {
        let mut feeds = DataFeeds::default();
        for (rel, el) in self.links() {
            let Some(href) = el.value().attr("href").and_then(|h| self.resolve(h)) else {
                continue;
            };
            let media_type = el
                .value()
                .attr("type")
                .map(|t| t.trim().to_ascii_lowercase())
                .unwrap_or_default();

            if media_type.ends_with("+oembed") {
                push_unique(&mut feeds.oembed, href);
            } else if rel.iter().any(|t| t == "alternate") {
                match media_type.as_str() {
                    "application/rss+xml" => push_unique(&mut feeds.rss, href),
                    "application/atom+xml" => push_unique(&mut feeds.atom, href),
                    "application/feed+json" | "application/json" => {
                        push_unique(&mut feeds.json_feeds, href)
                    }
                    _ => {}
                }
            } else if rel
                .iter()
                .any(|t| t == "https://api.w.org/" || t == "api" || t == "edituri" || t == "service")
            {
                push_unique(&mut feeds.api_links, href);
            }
        }
        feeds
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_json_ld_types(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                collect_json_ld_types(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            match map.get("@type") {
                Some(serde_json::Value::String(t)) => push_unique(out, t.clone()),
                Some(serde_json::Value::Array(types)) => {
                    for t in types.iter().filter_map(|t| t.as_str()) {
                        push_unique(out, t.to_string());
                    }
                }
                _ => {}
            }
            if let Some(graph) = map.get("@graph") {
                collect_json_ld_types(graph, out);
            }
        }
        _ => {}
    }
}
