//! Command-line and environment configuration.
//!
//! Every flag can also be supplied through an environment variable so the
//! rebalancer can run as a scheduled container job.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rebalancer_placement::LabelPair;

use crate::drain::{DeletionQuota, DrainOptions, SettleStrategy};
use crate::platform::PlatformConfig;
use crate::rebalancer::RebalanceConfig;

/// Rebalance service replicas that pile up on a single Cattle host.
#[derive(Debug, Clone, Parser)]
#[command(name = "rebalancer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Platform API endpoint (e.g. https://rancher.example.com/v2-beta).
    #[arg(long, env = "RANCHER_URL")]
    pub url: String,

    /// API access key.
    #[arg(long, env = "RANCHER_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// API secret key.
    #[arg(long, env = "RANCHER_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Project (environment) to rebalance.
    #[arg(long, env = "RANCHER_PROJECT_ID")]
    pub project_id: String,

    /// Only rebalance services labeled key=value.
    #[arg(long, env = "REBALANCER_LABEL_FILTER")]
    pub label_filter: Option<String>,

    /// Log intended actions without changing anything.
    #[arg(long, env = "REBALANCER_DRY_RUN")]
    pub dry_run: bool,

    /// Chat channel for drain notifications.
    #[arg(long, env = "REBALANCER_SLACK_CHANNEL", default_value = "#rebalancer")]
    pub slack_channel: String,

    /// Webhook receiving drain notifications. Notifications are only logged
    /// when unset.
    #[arg(long, env = "REBALANCER_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Seconds to wait before reactivating a drained host (or the poll
    /// timeout when polling).
    #[arg(long, env = "REBALANCER_SETTLE_SECS", default_value_t = 30)]
    pub settle_secs: u64,

    /// Poll the service every N seconds instead of waiting a fixed time.
    #[arg(long, env = "REBALANCER_SETTLE_POLL_SECS")]
    pub settle_poll_secs: Option<u64>,

    /// How replica deletions count toward a host's excess.
    #[arg(
        long,
        env = "REBALANCER_DELETION_QUOTA",
        value_enum,
        default_value_t = DeletionQuota::Confirmed
    )]
    pub deletion_quota: DeletionQuota,

    /// Run continuously, starting a pass every N seconds.
    #[arg(long, env = "REBALANCER_INTERVAL_SECS")]
    pub interval_secs: Option<u64>,

    /// Timeout for each platform API request, in seconds.
    #[arg(long, env = "REBALANCER_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "REBALANCER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "REBALANCER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub platform: PlatformConfig,
    pub rebalance: RebalanceConfig,
    pub webhook_url: Option<String>,
    /// Pause between passes; `None` runs a single pass.
    pub interval: Option<Duration>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Cli {
    /// Validate flags into a [`Config`].
    pub fn into_config(self) -> Result<Config> {
        reqwest::Url::parse(&self.url)
            .with_context(|| format!("Invalid platform URL '{}'", self.url))?;

        if let Some(webhook) = &self.webhook_url {
            reqwest::Url::parse(webhook)
                .with_context(|| format!("Invalid webhook URL '{}'", webhook))?;
        }

        if self.access_key.is_some() && self.secret_key.is_none() {
            bail!("RANCHER_SECRET_KEY is required when an access key is set");
        }

        if self.project_id.trim().is_empty() {
            bail!("Project id must not be empty");
        }

        let label_filter = self
            .label_filter
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<LabelPair>)
            .transpose()
            .context("Invalid label filter")?;

        let settle_timeout = Duration::from_secs(self.settle_secs);
        let settle = match self.settle_poll_secs {
            Some(0) => bail!("Settle poll interval must be at least one second"),
            Some(poll) => SettleStrategy::Poll {
                interval: Duration::from_secs(poll),
                timeout: settle_timeout,
            },
            None => SettleStrategy::Fixed(settle_timeout),
        };

        let interval = match self.interval_secs {
            Some(0) => bail!("Pass interval must be at least one second"),
            other => other.map(Duration::from_secs),
        };

        Ok(Config {
            platform: PlatformConfig {
                url: self.url,
                project_id: self.project_id.clone(),
                access_key: self.access_key,
                secret_key: self.secret_key,
                request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            },
            rebalance: RebalanceConfig {
                project_id: self.project_id,
                label_filter,
                drain: DrainOptions {
                    dry_run: self.dry_run,
                    settle,
                    quota: self.deletion_quota,
                    channel: self.slack_channel,
                },
            },
            webhook_url: self.webhook_url,
            interval,
            log_level: self.log_level,
            log_format: self.log_format,
        })
    }
}
