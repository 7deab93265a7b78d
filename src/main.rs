//! `queue-lab`: the command-line front end.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use queue_lab::{FileStore, Lab, LabConfig, MemoryStore, RecordStore};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "queue_lab=debug" } else { "queue_lab=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => LabConfig::load(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?,
        None => LabConfig::default(),
    };

    let store: Box<dyn RecordStore> = if cli.memory {
        Box::new(MemoryStore::new())
    } else {
        let data_dir = cli.data_dir.as_ref().unwrap_or(&config.data_dir);
        Box::new(
            FileStore::open(data_dir)
                .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?,
        )
    };
    debug!(?config, memory = cli.memory, "starting");

    let clock = config.clock().context("Invalid [time] settings")?;
    let lab = Lab::open(store, clock)
        .await
        .context("Failed to load the lab's data")?;

    commands::run(cli.command, lab, &config).await
}
