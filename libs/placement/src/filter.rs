//! Service eligibility.
//!
//! Decides which services a pass should look at. A service is a candidate
//! when it matches the operator's label filter (if any), is not inactive,
//! runs more than one replica, and is not globally scheduled.

use std::fmt;

use crate::labels::{HostSelector, LabelPair};
use crate::model::{Service, ServiceState};

/// A service selected for rebalancing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub service: Service,

    /// Hosts the service is constrained to, from its affinity label.
    pub host_affinity: Option<HostSelector>,
}

/// Why a service was left out of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// The operator's label filter did not match.
    LabelMismatch,
    Inactive,
    /// One replica (or none) cannot be unevenly spread.
    SingleReplica,
    /// The platform already places one replica per host.
    Global,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::LabelMismatch => write!(f, "label filter does not match"),
            Exclusion::Inactive => write!(f, "service is inactive"),
            Exclusion::SingleReplica => write!(f, "scale is 1"),
            Exclusion::Global => write!(f, "service is globally scheduled"),
        }
    }
}

/// Result of filtering a service list.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub candidates: Vec<Candidate>,

    /// Excluded services (id, name, first reason), in input order.
    pub excluded: Vec<(String, String, Exclusion)>,
}

/// Check a single service against the eligibility rules.
pub fn check(service: &Service, label_filter: Option<&LabelPair>) -> Result<(), Exclusion> {
    if let Some(filter) = label_filter {
        if !filter.matches(service.labels()) {
            return Err(Exclusion::LabelMismatch);
        }
    }

    if service.state == ServiceState::Inactive {
        return Err(Exclusion::Inactive);
    }

    if service.scale <= 1 {
        return Err(Exclusion::SingleReplica);
    }

    if service.is_global() {
        return Err(Exclusion::Global);
    }

    Ok(())
}

/// Split services into candidates and exclusions, preserving order.
pub fn select(services: Vec<Service>, label_filter: Option<&LabelPair>) -> Selection {
    let mut selection = Selection::default();

    for service in services {
        match check(&service, label_filter) {
            Ok(()) => {
                let host_affinity = service.host_affinity().map(HostSelector::parse);
                selection.candidates.push(Candidate {
                    service,
                    host_affinity,
                });
            }
            Err(reason) => selection
                .excluded
                .push((service.id, service.name, reason)),
        }
    }

    selection
}
