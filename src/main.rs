mod cli;
mod config;
mod driver;
mod error;
mod kubernetes;
mod remediator;
mod rules;
#[cfg(test)]
mod tests;
mod types;
mod utils;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cli::Cli;
use config::Settings;
use driver::{RunMode, drive, escalate_interrupts};
use kubernetes::{KubeCluster, build_client};
use remediator::Remediator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(&cli).context("Invalid configuration")?;
    info!(
        "Watching {} for pending pods matching {} rule(s): {}",
        settings.scope,
        settings.rules.len(),
        settings.rules.names().collect::<Vec<_>>().join(", ")
    );
    if settings.pass.dry_run {
        warn!("Dry run: no pods will be deleted");
    }

    let client = build_client(&settings.auth)
        .await
        .context("Failed to connect to the cluster")?;
    let remediator = Remediator::new(
        KubeCluster::new(client),
        settings.rules,
        settings.scope,
        settings.pass,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if escalate_interrupts(tokio::signal::ctrl_c, on_signal).await {
            std::process::exit(130);
        }
    });

    if let RunMode::Interval(every) = settings.run_mode {
        info!("Running every {:?}", every);
    }
    drive(&remediator, settings.run_mode, &cancel)
        .await
        .context("Remediation pass failed")?;
    Ok(())
}
