//! In-memory platform and notifier for driver tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rebalancer::drain::{DeletionQuota, DrainOptions, SettleStrategy};
use rebalancer::platform::Filters;
use rebalancer::{
    Notification, Notifier, NotifyError, Platform, PlatformError, RebalanceConfig, Rebalancer,
};
use rebalancer_placement::{Host, HostSelector, HostState, LabelPair, Replica, Service};

/// A mutating call made against the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Deactivate(String),
    Activate(String),
    Delete(String),
}

#[derive(Default)]
struct State {
    services: Vec<Service>,
    hosts: Vec<Host>,
    replicas: BTreeMap<String, Replica>,
    stacks: BTreeMap<String, String>,
    calls: Vec<Call>,
    failing_deletes: HashSet<String>,
    unauthorized: bool,
    /// Host that replacement replicas are placed on after a delete.
    reschedule_to: Option<String>,
    reschedule_count: usize,
    passes: usize,
}

/// Platform double that records every mutation.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_host(&self, id: &str, labels: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        state.hosts.push(Host {
            id: id.to_string(),
            hostname: format!("{}.cluster", id),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            state: HostState::Active,
        });
    }

    pub fn add_stack(&self, id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.stacks.insert(id.to_string(), name.to_string());
    }

    /// Add a service whose replicas are placed host by host as given.
    ///
    /// Replica ids are `{service}-{host}-{n}`.
    pub fn add_service(
        &self,
        id: &str,
        scale: u32,
        labels: &[(&str, &str)],
        placement: &[(&str, usize)],
    ) {
        let mut state = self.state.lock().unwrap();

        let mut instance_ids = Vec::new();
        for (host, count) in placement {
            for n in 0..*count {
                let replica_id = format!("{}-{}-{}", id, host, n);
                state.replicas.insert(
                    replica_id.clone(),
                    Replica {
                        id: replica_id.clone(),
                        name: format!("stack-{}-{}", id, instance_ids.len() + 1),
                        host_id: Some(host.to_string()),
                        hostname: Some(format!("{}.cluster", host)),
                        state: "running".to_string(),
                        entry_point: None,
                    },
                );
                instance_ids.push(replica_id);
            }
        }

        let mut service: Service = serde_json::from_value(serde_json::json!({
            "id": id,
            "name": id,
            "stackId": "st1",
            "scale": scale,
            "state": "active",
            "instanceIds": instance_ids,
        }))
        .unwrap();
        for (k, v) in labels {
            service
                .launch_config
                .labels
                .insert(k.to_string(), v.to_string());
        }
        state.services.push(service);
    }

    pub fn fail_delete(&self, replica_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_deletes.insert(replica_id.to_string());
    }

    pub fn reject_credentials(&self) {
        self.state.lock().unwrap().unauthorized = true;
    }

    /// Recreate deleted replicas on `host_id`, as the platform scheduler would.
    pub fn reschedule_to(&self, host_id: &str) {
        self.state.lock().unwrap().reschedule_to = Some(host_id.to_string());
    }

    /// Number of service listings, one per pass.
    pub fn passes(&self) -> usize {
        self.state.lock().unwrap().passes
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn check_auth(&self) -> Result<(), PlatformError> {
        if self.state.lock().unwrap().unauthorized {
            return Err(PlatformError::Unauthorized("401 Unauthorized".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn list_services(&self, filters: &Filters) -> Result<Vec<Service>, PlatformError> {
        self.check_auth()?;
        assert!(filters.contains_key("accountId"));
        let mut state = self.state.lock().unwrap();
        state.passes += 1;
        Ok(state.services.clone())
    }

    async fn get_service(&self, service_id: &str) -> Result<Service, PlatformError> {
        self.check_auth()?;
        let state = self.state.lock().unwrap();
        state
            .services
            .iter()
            .find(|s| s.id == service_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(service_id.to_string()))
    }

    async fn list_hosts(
        &self,
        selector: Option<&HostSelector>,
    ) -> Result<Vec<Host>, PlatformError> {
        self.check_auth()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .hosts
            .iter()
            .filter(|h| selector.map_or(true, |s| s.matches(&h.labels)))
            .cloned()
            .collect())
    }

    async fn get_host(&self, host_id: &str) -> Result<Host, PlatformError> {
        self.check_auth()?;
        let state = self.state.lock().unwrap();
        state
            .hosts
            .iter()
            .find(|h| h.id == host_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(host_id.to_string()))
    }

    async fn deactivate_host(&self, host_id: &str) -> Result<Host, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Deactivate(host_id.to_string()));
        let host = state
            .hosts
            .iter_mut()
            .find(|h| h.id == host_id)
            .ok_or_else(|| PlatformError::NotFound(host_id.to_string()))?;
        host.state = HostState::Inactive;
        Ok(host.clone())
    }

    async fn activate_host(&self, host_id: &str) -> Result<Host, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Activate(host_id.to_string()));
        let host = state
            .hosts
            .iter_mut()
            .find(|h| h.id == host_id)
            .ok_or_else(|| PlatformError::NotFound(host_id.to_string()))?;
        host.state = HostState::Active;
        Ok(host.clone())
    }

    async fn get_replica(&self, replica_id: &str) -> Result<Replica, PlatformError> {
        self.check_auth()?;
        let state = self.state.lock().unwrap();
        state
            .replicas
            .get(replica_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(replica_id.to_string()))
    }

    async fn delete_replica(&self, replica_id: &str) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(replica_id.to_string()));

        if state.failing_deletes.contains(replica_id) {
            return Err(PlatformError::api(500, "ServerError", "delete failed"));
        }

        let mut removed = state
            .replicas
            .remove(replica_id)
            .ok_or_else(|| PlatformError::NotFound(replica_id.to_string()))?;

        let Some(target) = state.reschedule_to.clone() else {
            for service in &mut state.services {
                service.instance_ids.retain(|id| id.as_str() != replica_id);
            }
            return Ok(());
        };

        state.reschedule_count += 1;
        let replacement_id = format!("replacement-{}", state.reschedule_count);
        removed.id = replacement_id.clone();
        removed.host_id = Some(target.clone());
        removed.hostname = Some(format!("{}.cluster", target));
        state.replicas.insert(replacement_id.clone(), removed);
        for service in &mut state.services {
            for id in &mut service.instance_ids {
                if id.as_str() == replica_id {
                    *id = replacement_id.clone();
                }
            }
        }
        Ok(())
    }

    async fn stack_name(&self, stack_id: &str) -> Result<String, PlatformError> {
        self.check_auth()?;
        let state = self.state.lock().unwrap();
        state
            .stacks
            .get(stack_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(stack_id.to_string()))
    }
}

/// Notifier double that records notifications.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 500,
                body: "webhook down".to_string(),
            });
        }
        Ok(())
    }
}

pub fn test_options() -> DrainOptions {
    DrainOptions {
        dry_run: false,
        settle: SettleStrategy::Fixed(Duration::ZERO),
        quota: DeletionQuota::Confirmed,
        channel: "#ops".to_string(),
    }
}

pub fn test_config(label_filter: Option<LabelPair>, drain: DrainOptions) -> RebalanceConfig {
    RebalanceConfig {
        project_id: "1a5".to_string(),
        label_filter,
        drain,
    }
}

/// Cluster with three plain hosts and a named stack.
pub fn three_host_platform() -> Arc<FakePlatform> {
    let platform = Arc::new(FakePlatform::new());
    for host in ["h1", "h2", "h3"] {
        platform.add_host(host, &[]);
    }
    platform.add_stack("st1", "shop");
    platform
}

pub fn new_rebalancer(
    platform: &Arc<FakePlatform>,
    notifier: &Arc<RecordingNotifier>,
    config: RebalanceConfig,
) -> Rebalancer {
    Rebalancer::new(
        Arc::clone(platform) as Arc<dyn Platform>,
        Arc::clone(notifier) as Arc<dyn Notifier>,
        config,
    )
}
