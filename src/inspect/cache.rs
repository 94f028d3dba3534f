// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded, time-expiring report cache
//!
//! Keyed by normalized URL. Expiry is lazy: stale entries read as absent and
//! are dropped on the next write. The entry count is capped and the least
//! recently accessed entry is evicted first. When a path is configured the
//! whole index is persisted as JSON after every mutation. The index is
//! snapshotted under the entry lock and written after releasing it; a
//! generation counter keeps an older snapshot from overwriting a newer one.
//!
//! Reads and writes touch the disk, so async callers go through
//! [`ReportCache::get_async`] and [`ReportCache::put_async`].

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::types::Report;

/// One cached report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub url: String,
    pub data: Report,
    /// Write time
    pub timestamp: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct ReportCacheStats {
    /// Total entries in cache
    pub total: usize,
    /// Expired entries (not yet evicted)
    pub expired: usize,
    /// Maximum cache capacity
    pub max: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedIndex {
    entries: Vec<CacheEntry>,
}

/// Report cache with retention window and LRU eviction
pub struct ReportCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    retention: Duration,
    max_entries: usize,
    path: Option<PathBuf>,
    /// Generation of the last snapshot taken; bumped under the entry lock
    generation: AtomicU64,
    /// Generation of the last snapshot written; held while writing
    written: Mutex<u64>,
}

impl ReportCache {
    /// Create an in-memory cache
    ///
    /// # Arguments
    /// * `retention_secs` - How long an entry stays fresh
    /// * `max_entries` - Maximum number of entries to store
    pub fn new(retention_secs: u64, max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            retention: Duration::seconds(retention_secs.min(i64::MAX as u64 / 1000) as i64),
            max_entries,
            path: None,
            generation: AtomicU64::new(0),
            written: Mutex::new(0),
        }
    }

    /// Create a cache persisted at `path`, loading any existing index
    ///
    /// An unreadable or corrupt index is logged and replaced.
    pub fn open(path: impl Into<PathBuf>, retention_secs: u64, max_entries: usize) -> Self {
        let mut cache = Self::new(retention_secs, max_entries);
        let path = path.into();

        match load_index(&path) {
            Ok(mut entries) => {
                entries.sort_by_key(|e| e.last_accessed);
                if let Ok(mut lru) = cache.entries.lock() {
                    // Oldest first so the most recently accessed ends up at the front
                    for entry in entries {
                        lru.put(entry.url.clone(), entry);
                    }
                    debug!(path = %path.display(), entries = lru.len(), "Loaded report cache");
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable report cache");
            }
        }

        cache.path = Some(path);
        cache
    }

    /// Fresh report for `key`, refreshing its access time
    pub fn get(&self, key: &str) -> Option<Report> {
        self.get_at(key, Utc::now())
    }

    /// Upsert the report for `key`
    pub fn put(&self, key: &str, report: Report) {
        self.put_at(key, report, Utc::now())
    }

    /// [`ReportCache::get`] on the blocking pool
    pub async fn get_async(self: &Arc<Self>, key: &str) -> Option<Report> {
        let cache = Arc::clone(self);
        let key = key.to_string();
        tokio::task::spawn_blocking(move || cache.get(&key))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Report cache read failed");
                None
            })
    }

    /// [`ReportCache::put`] on the blocking pool
    pub async fn put_async(self: &Arc<Self>, key: &str, report: Report) {
        let cache = Arc::clone(self);
        let key = key.to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || cache.put(&key, report)).await {
            warn!(error = %e, "Report cache write failed");
        }
    }

    /// Entry for `key` regardless of freshness, without touching access order
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.lock().ok()?;
        entries.peek(key).cloned()
    }

    pub(crate) fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Report> {
        let mut entries = self.entries.lock().ok()?;

        let entry = entries.get_mut(key)?;
        if now - entry.timestamp >= self.retention {
            debug!(key, "Report cache entry expired");
            return None;
        }

        entry.last_accessed = now;
        let report = entry.data.clone();
        let snapshot = self.snapshot(&entries);
        drop(entries);

        self.persist(snapshot);
        Some(report)
    }

    pub(crate) fn put_at(&self, key: &str, report: Report, now: DateTime<Utc>) {
        let mut entries = match self.entries.lock() {
            Ok(e) => e,
            Err(_) => return,
        };

        let expired: Vec<String> = entries
            .iter()
            .filter(|(k, e)| k.as_str() != key && now - e.timestamp >= self.retention)
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            entries.pop(&k);
        }

        let entry = CacheEntry {
            url: key.to_string(),
            data: report,
            timestamp: now,
            last_accessed: now,
        };
        if let Some((evicted, _)) = entries.push(key.to_string(), entry) {
            if evicted != key {
                debug!(evicted = %evicted, "Evicted least recently used report");
            }
        }
        let snapshot = self.snapshot(&entries);
        drop(entries);

        self.persist(snapshot);
    }

    /// Remove the entry for `key`
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().ok()?;
        let removed = entries.pop(key);
        if removed.is_some() {
            let snapshot = self.snapshot(&entries);
            drop(entries);
            self.persist(snapshot);
        }
        removed
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        let snapshot = match self.entries.lock() {
            Ok(mut entries) => {
                entries.clear();
                self.snapshot(&entries)
            }
            Err(_) => return,
        };
        self.persist(snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> ReportCacheStats {
        let now = Utc::now();
        let entries = match self.entries.lock() {
            Ok(e) => e,
            Err(_) => {
                return ReportCacheStats {
                    total: 0,
                    expired: 0,
                    max: self.max_entries,
                }
            }
        };
        let expired = entries
            .iter()
            .filter(|(_, e)| now - e.timestamp >= self.retention)
            .count();
        ReportCacheStats {
            total: entries.len(),
            expired,
            max: self.max_entries,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy the index for writing; must be called with the entry lock held
    fn snapshot(&self, entries: &LruCache<String, CacheEntry>) -> Option<(u64, PersistedIndex)> {
        self.path.as_ref()?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let index = PersistedIndex {
            entries: entries.iter().map(|(_, e)| e.clone()).collect(),
        };
        Some((generation, index))
    }

    fn persist(&self, snapshot: Option<(u64, PersistedIndex)>) {
        let (Some(path), Some((generation, index))) = (&self.path, snapshot) else {
            return;
        };
        let Ok(mut written) = self.written.lock() else {
            return;
        };
        if generation <= *written {
            debug!(generation, "Skipping stale report cache snapshot");
            return;
        }
        match write_index(path, &index) {
            Ok(()) => *written = generation,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to persist report cache"),
        }
    }
}

fn load_index(path: &Path) -> anyhow::Result<Vec<CacheEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read(path)?;
    let index: PersistedIndex = serde_json::from_slice(&raw)?;
    Ok(index.entries)
}

/// Write via a temp file in the same directory so readers never see a partial index
fn write_index(path: &Path, index: &PersistedIndex) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    serde_json::to_writer(&mut tmp, index)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}
