//! CLI argument parsing for the collector.

use std::path::PathBuf;

use clap::Parser;

/// Command line of the collector binary.
#[derive(Parser, Debug, Clone)]
#[command(about = "KubeSight telemetry collector")]
pub struct CollectorArgs {
    /// Path to configuration file.
    #[arg(short, long, default_value = "kubesight.json5")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run a single discovery and scrape pass, print the points and exit.
    #[arg(long)]
    pub once: bool,
}

impl CollectorArgs {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
