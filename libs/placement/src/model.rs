//! Platform resource snapshots.
//!
//! These mirror the Cattle API resources the rebalancer reads. Field names
//! follow the API's camelCase wire format; unknown fields are ignored and
//! absent collections default to empty.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource labels (key -> value).
pub type Labels = BTreeMap<String, String>;

/// Label marking a service as scheduled on every host.
pub const GLOBAL_LABEL: &str = "io.rancher.scheduler.global";

/// Label constraining a service to hosts carrying the given labels.
pub const HOST_AFFINITY_LABEL: &str = "io.rancher.scheduler.affinity:host_label";

/// A replicated service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,

    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub stack_id: String,

    /// Desired replica count.
    #[serde(default, deserialize_with = "nullable")]
    pub scale: u32,

    #[serde(default, deserialize_with = "nullable")]
    pub state: ServiceState,

    #[serde(default, deserialize_with = "nullable")]
    pub launch_config: LaunchConfig,

    /// Current replica identifiers, in platform order.
    #[serde(default, deserialize_with = "nullable")]
    pub instance_ids: Vec<String>,
}

impl Service {
    pub fn labels(&self) -> &Labels {
        &self.launch_config.labels
    }

    /// Whether the platform runs exactly one replica per host for this service.
    pub fn is_global(&self) -> bool {
        self.labels().get(GLOBAL_LABEL).map(String::as_str) == Some("true")
    }

    /// Raw value of the host affinity label, if declared.
    pub fn host_affinity(&self) -> Option<&str> {
        self.labels().get(HOST_AFFINITY_LABEL).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    #[serde(default, deserialize_with = "nullable")]
    pub labels: Labels,
}

/// Service lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceState {
    #[default]
    Active,
    Inactive,
    Other(String),
}

impl From<String> for ServiceState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            _ => Self::Other(value),
        }
    }
}

impl From<ServiceState> for String {
    fn from(value: ServiceState) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Active => write!(f, "active"),
            ServiceState::Inactive => write!(f, "inactive"),
            ServiceState::Other(state) => write!(f, "{}", state),
        }
    }
}

/// A cluster host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,

    #[serde(default, deserialize_with = "nullable")]
    pub hostname: String,

    #[serde(default, deserialize_with = "nullable")]
    pub labels: Labels,

    #[serde(default, deserialize_with = "nullable")]
    pub state: HostState,
}

/// Host scheduling state.
///
/// Transitional states are reported while an activate/deactivate request is
/// being applied by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HostState {
    #[default]
    Active,
    Inactive,
    Activating,
    Deactivating,
    Other(String),
}

impl HostState {
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Activating | Self::Deactivating)
    }
}

impl From<String> for HostState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            "activating" => Self::Activating,
            "deactivating" => Self::Deactivating,
            _ => Self::Other(value),
        }
    }
}

impl From<HostState> for String {
    fn from(value: HostState) -> Self {
        value.to_string()
    }
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostState::Active => write!(f, "active"),
            HostState::Inactive => write!(f, "inactive"),
            HostState::Activating => write!(f, "activating"),
            HostState::Deactivating => write!(f, "deactivating"),
            HostState::Other(state) => write!(f, "{}", state),
        }
    }
}

/// A running container belonging to a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replica {
    pub id: String,

    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    /// Owning host; absent while the container is not yet scheduled.
    #[serde(default)]
    pub host_id: Option<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub state: String,

    #[serde(default)]
    pub entry_point: Option<Vec<String>>,
}

impl Replica {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Treat an explicit `null` like an absent field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
