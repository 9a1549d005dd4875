//! # rebalancer-placement
//!
//! Pure placement logic for the container rebalancer. Nothing in this crate
//! performs I/O; the service layer feeds it platform snapshots and acts on
//! the plans it returns.
//!
//! ## Pipeline
//!
//! - [`filter`]: which services are worth looking at
//! - [`spread`]: where a service's replicas currently run
//! - [`planner`]: which hosts carry more than their fair share, and by how much

mod error;
pub mod filter;
pub mod labels;
pub mod model;
pub mod planner;
pub mod spread;

pub use error::{LabelError, PlanError};
pub use filter::{Candidate, Exclusion, Selection};
pub use labels::{HostSelector, LabelPair};
pub use model::{Host, HostState, Labels, Replica, Service, ServiceState};
pub use planner::{FairShare, HostVerdict, OverScheduled, RebalancePlan};
pub use spread::{Spread, SpreadEntry};
