mod app;
mod cli;
mod config;
mod db;
mod ducking;
mod http;
mod ledger;
mod paths;
mod playback;
mod podcast;
mod speech;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // stdout carries spoken dialog, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("podbutler=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = cli::Cli::parse();
    app::run(cli)
}
