// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod inspect;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::version::{VERSION, VERSION_NUMBER};

/// Inspect a website and print a JSON report
#[derive(Parser, Debug)]
#[command(name = "site-inspector")]
#[command(version = VERSION_NUMBER, long_version = VERSION)]
#[command(about = "Inspect a URL: head metadata, discoverability, networking, DNS, TLS and archive history", long_about = None)]
pub struct Cli {
    /// URL or bare domain to inspect (e.g. example.com)
    pub url: String,

    /// Ignore the persisted report cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Where the report cache is persisted
    #[arg(long, env = "INSPECT_CACHE_PATH")]
    pub cache_path: Option<PathBuf>,

    /// Print the report as single-line JSON
    #[arg(long)]
    pub compact: bool,

    /// Do not print progress to stderr
    #[arg(long, short)]
    pub quiet: bool,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    inspect::run(cli).await
}
