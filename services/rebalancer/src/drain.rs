//! Host drain orchestration.
//!
//! Draining an over-scheduled host runs, strictly in order:
//!
//! ```text
//! active -> deactivating -> draining -> settling -> reactivating -> active
//! ```
//!
//! Deactivation keeps the platform scheduler from placing the replacement
//! replicas back on the same host. Every transition is a request; only the
//! optional settle poll observes the platform's progress.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rebalancer_placement::OverScheduled;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{PlatformError, RebalanceError, RebalanceResult};
use crate::notify::{Notification, Notifier};
use crate::platform::Platform;

/// Default time given to the scheduler before a drained host is reactivated.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(30);

/// How deletions count toward a host's excess.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DeletionQuota {
    /// Only successful deletions count; failed ones are retried with the
    /// next replica on the host.
    #[default]
    Confirmed,
    /// Every attempted deletion counts, whether or not it succeeded.
    Attempts,
}

/// Wait between deleting replicas and reactivating the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStrategy {
    /// Sleep for a fixed duration.
    Fixed(Duration),
    /// Poll the service until its running replica count reaches scale.
    Poll { interval: Duration, timeout: Duration },
}

impl Default for SettleStrategy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_SETTLE)
    }
}

/// Drain behavior shared by every host in a pass.
#[derive(Debug, Clone)]
pub struct DrainOptions {
    pub dry_run: bool,
    pub settle: SettleStrategy,
    pub quota: DeletionQuota,
    /// Notification channel.
    pub channel: String,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            settle: SettleStrategy::default(),
            quota: DeletionQuota::default(),
            channel: "#rebalancer".to_string(),
        }
    }
}

/// Service being rebalanced, as reported in logs and notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContext {
    pub service_id: String,
    /// `stack/service`
    pub service_ref: String,
    pub scale: u32,
    pub host_count: usize,
}

/// Stage of a host drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPhase {
    Deactivating,
    Draining,
    Settling,
    Reactivating,
    Active,
}

impl fmt::Display for DrainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainPhase::Deactivating => write!(f, "deactivating"),
            DrainPhase::Draining => write!(f, "draining"),
            DrainPhase::Settling => write!(f, "settling"),
            DrainPhase::Reactivating => write!(f, "reactivating"),
            DrainPhase::Active => write!(f, "active"),
        }
    }
}

/// Outcome of draining one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub host_id: String,
    pub hostname: String,
    /// `id | name` for every replica a deletion was attempted on. In a dry
    /// run, the bare ids a live run would target.
    pub targeted: Vec<String>,
    pub deleted: usize,
    pub failed: usize,
}

/// Drains over-scheduled hosts.
pub struct HostDrainer {
    platform: Arc<dyn Platform>,
    notifier: Arc<dyn Notifier>,
    options: DrainOptions,
}

impl HostDrainer {
    pub fn new(
        platform: Arc<dyn Platform>,
        notifier: Arc<dyn Notifier>,
        options: DrainOptions,
    ) -> Self {
        Self {
            platform,
            notifier,
            options,
        }
    }

    /// Drain `target.excess` replicas off `target`'s host.
    ///
    /// Fails only if the host cannot be resolved up front or the final
    /// notification cannot be delivered; everything in between is logged
    /// and skipped so the host is always reactivated.
    #[instrument(
        skip(self, service, target),
        fields(
            service = %service.service_ref,
            host_id = %target.entry.host_id,
            excess = target.excess
        )
    )]
    pub async fn drain(
        &self,
        service: &ServiceContext,
        target: &OverScheduled,
    ) -> RebalanceResult<DrainReport> {
        let dry_run = self.options.dry_run;
        let host_id = target.entry.host_id.as_str();

        let host = self.platform.get_host(host_id).await.map_err(|e| {
            error!(error = %e, "Failed to resolve over-scheduled host");
            RebalanceError::escalate(e, |source| RebalanceError::HostResolution {
                host_id: host_id.to_string(),
                source,
            })
        })?;
        let hostname = host.hostname.clone();

        info!(
            hostname = %hostname,
            excess = target.excess,
            replicas_on_host = target.entry.count(),
            dry_run,
            "Host is over-scheduled"
        );

        let mut report = DrainReport {
            host_id: host_id.to_string(),
            hostname: hostname.clone(),
            ..Default::default()
        };

        self.enter(DrainPhase::Deactivating, &hostname);
        if dry_run {
            info!(hostname = %hostname, "Dry run: would deactivate host");
        } else {
            match self.platform.deactivate_host(host_id).await {
                Ok(host) => debug!(
                    hostname = %hostname,
                    state = %host.state,
                    "Host deactivation requested"
                ),
                Err(e) => error!(hostname = %hostname, error = %e, "Failed to deactivate host"),
            }
        }

        self.enter(DrainPhase::Draining, &hostname);
        info!(
            hostname = %hostname,
            count = target.excess,
            "About to delete replicas"
        );
        if dry_run {
            for replica_id in target.entry.replica_ids.iter().take(target.excess) {
                info!(replica_id = %replica_id, "Dry run: would delete replica");
                report.targeted.push(replica_id.clone());
            }
        } else {
            self.delete_replicas(target, &mut report).await;
        }

        self.enter(DrainPhase::Settling, &hostname);
        if dry_run {
            info!(settle = ?self.options.settle, "Dry run: would wait for rescheduling");
        } else {
            self.settle(service).await;
        }

        self.enter(DrainPhase::Reactivating, &hostname);
        if dry_run {
            info!(hostname = %hostname, "Dry run: would activate host");
        } else {
            self.reactivate(host_id, &hostname).await;
        }
        self.enter(DrainPhase::Active, &hostname);

        if dry_run {
            return Ok(report);
        }

        if report.deleted == 0 {
            warn!(hostname = %hostname, failed = report.failed, "No replicas were deleted");
            return Ok(report);
        }

        let notification = Notification {
            channel: self.options.channel.clone(),
            service_ref: service.service_ref.clone(),
            hostname,
            scale: service.scale,
            host_count: service.host_count,
            rescheduled: report.deleted,
            replicas: report.targeted.clone(),
        };
        self.notifier
            .notify(&notification)
            .await
            .map_err(|source| {
                error!(error = %source, "Failed to send notification");
                RebalanceError::Notification {
                    service: service.service_ref.clone(),
                    source,
                }
            })?;

        Ok(report)
    }

    fn enter(&self, phase: DrainPhase, hostname: &str) {
        debug!(hostname = %hostname, phase = %phase, "Drain phase");
    }

    /// Delete replicas in spread order until the quota is met.
    async fn delete_replicas(&self, target: &OverScheduled, report: &mut DrainReport) {
        let mut attempted = 0;

        for replica_id in &target.entry.replica_ids {
            let counted = match self.options.quota {
                DeletionQuota::Attempts => attempted,
                DeletionQuota::Confirmed => report.deleted,
            };
            if counted >= target.excess {
                break;
            }
            attempted += 1;

            debug!(replica_id = %replica_id, "Deleting replica");
            match self.delete_replica(replica_id).await {
                Ok(record) => {
                    report.targeted.push(record);
                    report.deleted += 1;
                }
                Err((record, e)) => {
                    warn!(replica_id = %replica_id, error = %e, "Failed to delete replica");
                    report.targeted.push(format!("{} (delete failed)", record));
                    report.failed += 1;
                }
            }
        }

        if report.deleted < target.excess {
            warn!(
                deleted = report.deleted,
                excess = target.excess,
                quota = ?self.options.quota,
                "Deleted fewer replicas than the host's excess"
            );
        }
    }

    /// Resolve then delete one replica, returning its `id | name` record.
    async fn delete_replica(&self, replica_id: &str) -> Result<String, (String, PlatformError)> {
        let replica = self
            .platform
            .get_replica(replica_id)
            .await
            .map_err(|e| (format!("{} | <unresolved>", replica_id), e))?;
        let record = format!("{} | {}", replica.id, replica.name);

        match self.platform.delete_replica(replica_id).await {
            Ok(()) => Ok(record),
            Err(e) => Err((record, e)),
        }
    }

    async fn settle(&self, service: &ServiceContext) {
        match self.options.settle {
            SettleStrategy::Fixed(delay) => {
                info!(secs = delay.as_secs(), "Waiting for replicas to be rescheduled");
                tokio::time::sleep(delay).await;
            }
            SettleStrategy::Poll { interval, timeout } => {
                self.poll_until_settled(service, interval, timeout).await;
            }
        }
    }

    /// Poll until the service runs `scale` replicas or `timeout` elapses.
    async fn poll_until_settled(
        &self,
        service: &ServiceContext,
        interval: Duration,
        timeout: Duration,
    ) {
        info!(
            interval_secs = interval.as_secs(),
            timeout_secs = timeout.as_secs(),
            "Polling until replicas are rescheduled"
        );
        let deadline = Instant::now() + timeout;

        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!(timeout_secs = timeout.as_secs(), "Timed out waiting for rescheduling");
                return;
            }
            tokio::time::sleep(interval.min(deadline - now)).await;

            match self.running_replicas(&service.service_id).await {
                Ok(running) if running >= service.scale as usize => {
                    info!(running, scale = service.scale, "Replicas rescheduled");
                    return;
                }
                Ok(running) => debug!(running, scale = service.scale, "Still rescheduling"),
                Err(e) => warn!(error = %e, "Failed to poll service state"),
            }
        }
    }

    async fn running_replicas(&self, service_id: &str) -> Result<usize, PlatformError> {
        let service = self.platform.get_service(service_id).await?;
        let replicas = self.platform.list_replicas(&service.instance_ids).await?;
        Ok(replicas.iter().filter(|r| r.is_running()).count())
    }

    /// Re-resolve the host, then request activation.
    async fn reactivate(&self, host_id: &str, hostname: &str) {
        match self.platform.get_host(host_id).await {
            Ok(host) => debug!(
                hostname = %host.hostname,
                state = %host.state,
                "Host state before activation"
            ),
            Err(e) => error!(hostname = %hostname, error = %e, "Failed to re-resolve host"),
        }

        match self.platform.activate_host(host_id).await {
            Ok(_) => info!(hostname = %hostname, "Host re-activated"),
            Err(e) => error!(hostname = %hostname, error = %e, "Failed to activate host"),
        }
    }
}
