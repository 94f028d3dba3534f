// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod inspect;
pub mod version;

// Re-export main types
pub use inspect::{
    normalize_url, InspectConfig, InspectError, Inspection, Inspector, ProgressState, Report,
    ReportCache, ReportCategory,
};
