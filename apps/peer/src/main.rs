//! peerdrop endpoint entry point.

mod app;
mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = args.endpoint_config()?;
    tracing::info!(relay = %config.relay_url, "starting peerdrop peer");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, args.plan()))
}
