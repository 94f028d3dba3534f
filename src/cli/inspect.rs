// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::Cli;
use crate::inspect::{InspectConfig, Inspector, ProgressState};
use crate::version::{get_version_string, FEATURES};

/// Build the inspector configuration for this invocation
pub fn config_for(cli: &Cli) -> InspectConfig {
    let mut config = InspectConfig::from_env();
    if let Some(path) = &cli.cache_path {
        config.cache_path = Some(path.clone());
    }
    if cli.no_cache {
        config.cache_path = None;
    }
    config
}

/// One stderr line per category as it completes
fn progress_lines(state: &ProgressState, reported: &mut BTreeSet<String>) -> Vec<String> {
    let overall = (state.overall() * 100.0).round() as u32;
    state
        .iter()
        .filter(|(_, fraction)| *fraction >= 1.0)
        .filter(|(category, _)| reported.insert(category.to_string()))
        .map(|(category, _)| format!("[{:>3}%] {}", overall, category))
        .collect()
}

/// Inspect the URL from the command line and print the report
pub async fn run(cli: Cli) -> Result<()> {
    dotenv::dotenv().ok();
    info!(features = ?FEATURES, "{}", get_version_string());

    let config = config_for(&cli);
    debug!(?config, "Loaded inspector configuration");
    let inspector = Arc::new(Inspector::new(config)?);

    let inspection = inspector.start(&cli.url);

    let cancel = inspection.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling inspection");
            cancel.cancel();
        }
    });

    let mut progress = inspection.progress();
    let quiet = cli.quiet;
    let printer = tokio::spawn(async move {
        let mut reported = BTreeSet::new();
        while progress.changed().await.is_ok() {
            let state = progress.borrow_and_update().clone();
            if !quiet {
                for line in progress_lines(&state, &mut reported) {
                    eprintln!("{}", line);
                }
            }
        }
    });

    let report = inspection.wait().await?;
    printer.await.ok();

    let json = if cli.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{}", json);
    Ok(())
}
