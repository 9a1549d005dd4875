//! Platform interface.
//!
//! The rebalancer only needs a narrow slice of the orchestration API:
//! - Listing services and hosts in the project
//! - Resolving hosts, replicas, and stacks by id
//! - Activating/deactivating hosts and deleting replicas
//!
//! [`HttpPlatform`] talks to the Cattle API; tests substitute an in-memory
//! implementation.

mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use rebalancer_placement::{Host, HostSelector, Replica, Service};

use crate::error::PlatformError;

pub use http::{HttpPlatform, PlatformConfig};

/// Query filters passed through to the service listing.
pub type Filters = BTreeMap<String, String>;

/// Orchestration platform operations, scoped to one project.
#[async_trait]
pub trait Platform: Send + Sync {
    /// List services matching `filters`.
    async fn list_services(&self, filters: &Filters) -> Result<Vec<Service>, PlatformError>;

    /// Resolve a service by id.
    async fn get_service(&self, service_id: &str) -> Result<Service, PlatformError>;

    /// List hosts, optionally restricted to those matching `selector`.
    async fn list_hosts(&self, selector: Option<&HostSelector>) -> Result<Vec<Host>, PlatformError>;

    /// Resolve a host by id.
    async fn get_host(&self, host_id: &str) -> Result<Host, PlatformError>;

    /// Request that a host stop accepting new replicas.
    async fn deactivate_host(&self, host_id: &str) -> Result<Host, PlatformError>;

    /// Request that a host accept new replicas again.
    async fn activate_host(&self, host_id: &str) -> Result<Host, PlatformError>;

    /// Resolve a replica by id.
    async fn get_replica(&self, replica_id: &str) -> Result<Replica, PlatformError>;

    /// Delete a replica.
    async fn delete_replica(&self, replica_id: &str) -> Result<(), PlatformError>;

    /// Resolve a stack's display name.
    async fn stack_name(&self, stack_id: &str) -> Result<String, PlatformError>;

    /// Resolve replicas by id, preserving the given order.
    ///
    /// Replicas that disappeared since the service snapshot was taken are
    /// skipped.
    async fn list_replicas(&self, replica_ids: &[String]) -> Result<Vec<Replica>, PlatformError> {
        let mut replicas = Vec::with_capacity(replica_ids.len());
        for replica_id in replica_ids {
            match self.get_replica(replica_id).await {
                Ok(replica) => replicas.push(replica),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(replica_id = %replica_id, "Replica vanished, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(replicas)
    }
}
