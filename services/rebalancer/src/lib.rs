//! Cattle container rebalancer.
//!
//! Periodically inspects the replicated services of a project, finds hosts
//! carrying more replicas than their fair share, and drains them: the host is
//! deactivated, its excess replicas deleted so the platform scheduler places
//! replacements elsewhere, and the host reactivated.
//!
//! ## Modules
//!
//! - `platform`: platform API trait and HTTP client
//! - `drain`: per-host deactivate/delete/settle/reactivate sequence
//! - `notify`: chat webhook notifications
//! - `rebalancer`: the pass driver
//! - `config`: CLI flags and environment configuration

pub mod config;
pub mod drain;
pub mod error;
pub mod notify;
pub mod platform;
pub mod rebalancer;

pub use drain::{
    DeletionQuota, DrainOptions, DrainReport, HostDrainer, ServiceContext, SettleStrategy,
};
pub use error::{NotifyError, PlatformError, RebalanceError};
pub use notify::{LogNotifier, Notification, Notifier, WebhookNotifier};
pub use platform::{HttpPlatform, Platform, PlatformConfig};
pub use rebalancer::{PassStats, RebalanceConfig, Rebalancer};
