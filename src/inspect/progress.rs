// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-category progress for incremental rendering
//!
//! Each report category carries a completion fraction in `[0, 1]`. Within a
//! request the fractions only grow; a category reaches 1 once its data is
//! final, including "determined absent".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Fraction published for every category when a fetch starts
pub const STARTED_FRACTION: f32 = 0.05;

/// A report section, as tracked for progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportCategory {
    Overview,
    Metadata,
    Discoverability,
    Resources,
    Networking,
    Dns,
    Performance,
    History,
    DataFeeds,
    HostMetadata,
    BotProtection,
}

impl ReportCategory {
    pub const ALL: [ReportCategory; 11] = [
        ReportCategory::Overview,
        ReportCategory::Metadata,
        ReportCategory::Discoverability,
        ReportCategory::Resources,
        ReportCategory::Networking,
        ReportCategory::Dns,
        ReportCategory::Performance,
        ReportCategory::History,
        ReportCategory::DataFeeds,
        ReportCategory::HostMetadata,
        ReportCategory::BotProtection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::Overview => "overview",
            ReportCategory::Metadata => "metadata",
            ReportCategory::Discoverability => "discoverability",
            ReportCategory::Resources => "resources",
            ReportCategory::Networking => "networking",
            ReportCategory::Dns => "dns",
            ReportCategory::Performance => "performance",
            ReportCategory::History => "history",
            ReportCategory::DataFeeds => "dataFeeds",
            ReportCategory::HostMetadata => "hostMetadata",
            ReportCategory::BotProtection => "botProtection",
        }
    }
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of completion fractions, one per category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    fractions: BTreeMap<ReportCategory, f32>,
}

impl ProgressState {
    /// Every category at `fraction`
    pub fn uniform(fraction: f32) -> Self {
        Self {
            fractions: ReportCategory::ALL
                .iter()
                .map(|category| (*category, fraction.clamp(0.0, 1.0)))
                .collect(),
        }
    }

    pub fn zero() -> Self {
        Self::uniform(0.0)
    }

    pub fn complete() -> Self {
        Self::uniform(1.0)
    }

    pub fn get(&self, category: ReportCategory) -> f32 {
        self.fractions.get(&category).copied().unwrap_or(0.0)
    }

    pub fn is_complete(&self, category: ReportCategory) -> bool {
        self.get(category) >= 1.0
    }

    pub fn all_complete(&self) -> bool {
        ReportCategory::ALL.iter().all(|c| self.is_complete(*c))
    }

    /// Mean over all categories
    pub fn overall(&self) -> f32 {
        let total: f32 = ReportCategory::ALL.iter().map(|c| self.get(*c)).sum();
        total / ReportCategory::ALL.len() as f32
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReportCategory, f32)> + '_ {
        self.fractions.iter().map(|(c, f)| (*c, *f))
    }

    /// Raise `category` to `fraction`; returns whether anything changed
    fn raise(&mut self, category: ReportCategory, fraction: f32) -> bool {
        let fraction = fraction.clamp(0.0, 1.0);
        let current = self.fractions.entry(category).or_insert(0.0);
        if fraction > *current {
            *current = fraction;
            true
        } else {
            false
        }
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::zero()
    }
}

/// Publishes progress for one inspection
///
/// Owned by the orchestrator for the duration of a request. After
/// [`ProgressTracker::freeze`] no further updates are published.
pub struct ProgressTracker {
    tx: watch::Sender<ProgressState>,
    frozen: AtomicBool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressState::zero());
        Self {
            tx,
            frozen: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ProgressState {
        self.tx.borrow().clone()
    }

    /// Reset to all-zero at the start of a new request
    pub fn reset(&self) {
        self.frozen.store(false, Ordering::SeqCst);
        self.tx.send_replace(ProgressState::zero());
    }

    /// Signal liveness without claiming completion
    pub fn start(&self) {
        self.raise_all(STARTED_FRACTION);
    }

    /// Everything final, e.g. on a cache hit
    pub fn complete_all(&self) {
        self.raise_all(1.0);
    }

    pub fn complete(&self, category: ReportCategory) {
        self.advance(category, 1.0);
    }

    /// Raise one category; lower values are ignored
    pub fn advance(&self, category: ReportCategory, fraction: f32) {
        if self.is_frozen() {
            return;
        }
        self.tx
            .send_if_modified(|state| state.raise(category, fraction));
    }

    /// Stop publishing; used once the request is known to have failed
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    fn raise_all(&self, fraction: f32) {
        if self.is_frozen() {
            return;
        }
        self.tx.send_if_modified(|state| {
            ReportCategory::ALL
                .iter()
                .fold(false, |changed, c| state.raise(*c, fraction) || changed)
        });
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
