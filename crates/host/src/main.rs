//! `modkit` command line host.
//!
//! Loads `modkit.toml`, discovers modules from the configured paths, then runs one command
//! against the resulting registry.

mod app;
mod cli;
mod config;
mod logging;

use clap::Parser;
use cli::Cli;
use config::HostConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	let config = HostConfig::load(&cli.config)?;
	logging::init(config.log_filter.as_deref(), cli.verbose);
	tracing::debug!(config = %cli.config.display(), modules = ?config.module_paths, "starting modkit");
	app::run(cli, config).await
}
