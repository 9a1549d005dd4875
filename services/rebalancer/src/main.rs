//! Rebalancer binary.
//!
//! Runs one rebalance pass and exits, or with `--interval-secs` keeps
//! running passes until interrupted. A shutdown signal is honored between
//! passes only; a pass in progress always finishes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rebalancer::config::{Cli, Config, LogFormat};
use rebalancer::{HttpPlatform, LogNotifier, Notifier, Rebalancer, WebhookNotifier};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;

    init_tracing(&config);

    info!(
        url = %config.platform.url,
        project_id = %config.platform.project_id,
        label_filter = ?config.rebalance.label_filter.as_ref().map(ToString::to_string),
        dry_run = config.rebalance.drain.dry_run,
        quota = ?config.rebalance.drain.quota,
        settle = ?config.rebalance.drain.settle,
        interval_secs = config.interval.map(|i| i.as_secs()),
        "Configuration loaded"
    );

    let platform =
        Arc::new(HttpPlatform::new(&config.platform).context("Failed to create platform client")?);

    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .context("Failed to create webhook client")?;
            Arc::new(WebhookNotifier::new(client, url.clone()))
        }
        None => Arc::new(LogNotifier),
    };

    // Signals are only acted on between passes.
    let shutdown = install_shutdown_handler().context("Failed to install signal handlers")?;

    let rebalancer = Rebalancer::new(platform, notifier, config.rebalance.clone());

    let Some(interval) = config.interval else {
        let result = rebalancer.run_pass().await;
        if *shutdown.borrow() {
            info!("Shutdown requested during pass, pass completed");
        }
        return match result {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(error = %e, "Rebalance pass failed");
                Err(e.into())
            }
        };
    };

    rebalancer.run(interval, shutdown).await;

    info!("Rebalancer shutdown complete");
    Ok(())
}

/// Replace the default SIGINT/SIGTERM action with a flag checked between
/// passes.
fn install_shutdown_handler() -> Result<watch::Receiver<bool>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
            info!("Received shutdown signal, stopping after the current pass");
            let _ = shutdown_tx.send(true);
            // Keep the handlers registered so later signals are ignored too.
            loop {
                tokio::select! {
                    Some(_) = interrupt.recv() => {}
                    Some(_) = terminate.recv() => {}
                    else => break,
                }
            }
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping after the current pass");
            let _ = shutdown_tx.send(true);
        }
    });

    Ok(shutdown_rx)
}

fn init_tracing(config: &Config) {
    // Prefer RUST_LOG, fall back to the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
