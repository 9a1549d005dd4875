//! Rebalance driver.
//!
//! A pass:
//! - Lists the project's services and filters out ineligible ones
//! - For each candidate, computes the replica spread and the fair-share plan
//! - Drains every over-scheduled host, one at a time
//!
//! Services are processed strictly in sequence. A failure scoped to one
//! service is logged and the pass moves on; listing failures and rejected
//! credentials end the pass.

use std::sync::Arc;
use std::time::Duration;

use rebalancer_placement::{filter, planner, Candidate, LabelPair, Spread};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::drain::{DrainOptions, HostDrainer, ServiceContext};
use crate::error::{RebalanceError, RebalanceResult};
use crate::notify::Notifier;
use crate::platform::{Filters, Platform};

/// Settings for a rebalance pass.
#[derive(Debug, Clone)]
pub struct RebalanceConfig {
    pub project_id: String,

    /// Only consider services carrying this label.
    pub label_filter: Option<LabelPair>,

    pub drain: DrainOptions,
}

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub services_total: usize,
    pub services_eligible: usize,
    pub services_rebalanced: usize,
    pub services_failed: usize,
    pub hosts_drained: usize,
    pub hosts_tolerated: usize,
    pub replicas_deleted: usize,
    pub replica_failures: usize,
}

impl PassStats {
    fn record_service(&mut self, service: ServiceStats) {
        if service.hosts_drained > 0 {
            self.services_rebalanced += 1;
        }
        self.hosts_drained += service.hosts_drained;
        self.hosts_tolerated += service.hosts_tolerated;
        self.replicas_deleted += service.replicas_deleted;
        self.replica_failures += service.replica_failures;
    }
}

/// Outcome of rebalancing a single service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ServiceStats {
    hosts_drained: usize,
    hosts_tolerated: usize,
    replicas_deleted: usize,
    replica_failures: usize,
}

/// The rebalance driver.
pub struct Rebalancer {
    platform: Arc<dyn Platform>,
    drainer: HostDrainer,
    config: RebalanceConfig,
}

impl Rebalancer {
    pub fn new(
        platform: Arc<dyn Platform>,
        notifier: Arc<dyn Notifier>,
        config: RebalanceConfig,
    ) -> Self {
        let drainer = HostDrainer::new(Arc::clone(&platform), notifier, config.drain.clone());
        Self {
            platform,
            drainer,
            config,
        }
    }

    /// Run passes every `interval` until `shutdown` flips to true.
    ///
    /// Shutdown is only observed between passes; a pass that has started
    /// always runs to completion so no host is left deactivated.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "Starting rebalance loop");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_pass().await {
                error!(error = %e, "Rebalance pass failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                Ok(_) = shutdown.wait_for(|requested| *requested) => break,
            }
        }

        info!("Rebalance loop stopped");
    }

    /// Run a single rebalance pass over the project.
    #[instrument(
        skip(self),
        fields(project_id = %self.config.project_id, dry_run = self.config.drain.dry_run)
    )]
    pub async fn run_pass(&self) -> RebalanceResult<PassStats> {
        let mut stats = PassStats::default();

        let mut filters = Filters::new();
        filters.insert("accountId".to_string(), self.config.project_id.clone());

        let services = self
            .platform
            .list_services(&filters)
            .await
            .map_err(|e| RebalanceError::escalate(e, RebalanceError::ListServices))?;
        stats.services_total = services.len();
        debug!(count = services.len(), "Initial services found");

        if let Some(label) = &self.config.label_filter {
            debug!(label = %label, "Filtering services by label");
        }
        let selection = filter::select(services, self.config.label_filter.as_ref());
        for (id, name, reason) in &selection.excluded {
            debug!(service_id = %id, service = %name, reason = %reason, "Service excluded");
        }

        stats.services_eligible = selection.candidates.len();
        if selection.candidates.is_empty() {
            info!("No candidate service to rebalance was found");
            return Ok(stats);
        }

        for candidate in &selection.candidates {
            match self.rebalance_service(candidate).await {
                Ok(service_stats) => stats.record_service(service_stats),
                Err(e) if e.is_fatal() => {
                    error!(
                        service = %candidate.service.name,
                        error = %e,
                        "Aborting rebalance pass"
                    );
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        service = %candidate.service.name,
                        error = %e,
                        "Failed to rebalance service"
                    );
                    stats.services_failed += 1;
                }
            }
        }

        info!(
            services_total = stats.services_total,
            services_eligible = stats.services_eligible,
            services_rebalanced = stats.services_rebalanced,
            services_failed = stats.services_failed,
            hosts_drained = stats.hosts_drained,
            hosts_tolerated = stats.hosts_tolerated,
            replicas_deleted = stats.replicas_deleted,
            replica_failures = stats.replica_failures,
            "Rebalance pass complete"
        );

        Ok(stats)
    }

    /// Plan and drain a single service.
    #[instrument(skip(self, candidate), fields(service_id = %candidate.service.id))]
    async fn rebalance_service(&self, candidate: &Candidate) -> RebalanceResult<ServiceStats> {
        let service = &candidate.service;
        let service_ref = self.service_ref(&service.stack_id, &service.name).await;

        let replicas = self
            .platform
            .list_replicas(&service.instance_ids)
            .await
            .map_err(|e| {
                RebalanceError::escalate(e, |source| RebalanceError::ListReplicas {
                    service: service_ref.clone(),
                    source,
                })
            })?;
        let spread = Spread::from_replicas(&replicas);
        debug!(service = %service_ref, spread = ?spread.entries(), "Replica spread");

        let affinity_matches = match &candidate.host_affinity {
            Some(selector) if selector.is_empty() => {
                warn!(
                    service = %service_ref,
                    "Host affinity label has no key=value pair, ignoring"
                );
                None
            }
            Some(selector) => {
                debug!(service = %service_ref, affinity = %selector, "Service has host affinity");
                match self.platform.list_hosts(Some(selector)).await {
                    Ok(hosts) => Some(hosts.len()),
                    Err(e) if e.is_unauthorized() => return Err(RebalanceError::Unauthorized(e)),
                    Err(e) => {
                        warn!(service = %service_ref, error = %e, "Failed to list affinity hosts");
                        None
                    }
                }
            }
            None => None,
        };
        let host_count = planner::resolve_host_count(affinity_matches, &spread);

        let plan = planner::plan(service.scale, host_count, &spread).map_err(|source| {
            RebalanceError::NoEligibleHosts {
                service: service_ref.clone(),
                source,
            }
        })?;

        info!(
            service = %service_ref,
            replicas = ?service.instance_ids,
            host_count,
            scale = service.scale,
            expected_per_host = plan.share.per_host,
            remainder = plan.share.remainder,
            total_excess = plan.total_excess(),
            "Start to check service"
        );

        let mut stats = ServiceStats {
            hosts_tolerated: plan.tolerated.len(),
            ..Default::default()
        };
        for host_id in &plan.tolerated {
            info!(
                service = %service_ref,
                host_id = %host_id,
                "No need to balance host, scale does not divide evenly across hosts"
            );
        }

        let context = ServiceContext {
            service_id: service.id.clone(),
            service_ref: service_ref.clone(),
            scale: service.scale,
            host_count,
        };
        for target in &plan.over_scheduled {
            let report = self.drainer.drain(&context, target).await?;
            stats.hosts_drained += 1;
            stats.replicas_deleted += report.deleted;
            stats.replica_failures += report.failed;
        }

        info!(service = %service_ref, "Finished checking service");
        Ok(stats)
    }

    /// `stack/service`, falling back to the stack id if its name is unavailable.
    async fn service_ref(&self, stack_id: &str, service_name: &str) -> String {
        if stack_id.is_empty() {
            return service_name.to_string();
        }

        match self.platform.stack_name(stack_id).await {
            Ok(stack) => format!("{}/{}", stack, service_name),
            Err(e) => {
                warn!(stack_id = %stack_id, error = %e, "Failed to resolve stack name");
                format!("{}/{}", stack_id, service_name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_drained_services_count_as_rebalanced() {
        let mut stats = PassStats::default();

        stats.record_service(ServiceStats {
            hosts_tolerated: 1,
            ..Default::default()
        });
        assert_eq!(stats.services_rebalanced, 0);

        stats.record_service(ServiceStats {
            hosts_drained: 2,
            replicas_deleted: 3,
            replica_failures: 1,
            ..Default::default()
        });
        assert_eq!(
            stats,
            PassStats {
                services_rebalanced: 1,
                hosts_drained: 2,
                hosts_tolerated: 1,
                replicas_deleted: 3,
                replica_failures: 1,
                ..Default::default()
            }
        );
    }
}
