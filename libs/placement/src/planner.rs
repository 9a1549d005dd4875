//! Fair-share planning.
//!
//! Given a service's desired scale `S` and a host count `H`, every host
//! should carry `floor(S / H)` replicas. When `S mod H != 0` some hosts
//! necessarily carry one extra replica; those hosts are tolerated instead
//! of drained, otherwise the rebalancer would keep moving the same replica
//! around forever.
//!
//! # Invariants
//!
//! - `per_host * host_count + remainder == scale` and `remainder < host_count`
//! - A host is over-scheduled iff `count > per_host` and not
//!   (`remainder != 0` and `count - per_host == 1`)
//! - Planning is pure: the same inputs always yield the same plan

use crate::error::PlanError;
use crate::spread::{Spread, SpreadEntry};

/// Per-host target for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FairShare {
    pub scale: u32,
    pub host_count: usize,
    pub per_host: usize,
    pub remainder: usize,
}

impl FairShare {
    /// Compute the fair share of `scale` replicas over `host_count` hosts.
    pub fn compute(scale: u32, host_count: usize) -> Result<Self, PlanError> {
        if host_count == 0 {
            return Err(PlanError::NoEligibleHosts { scale });
        }

        let total = scale as usize;
        Ok(Self {
            scale,
            host_count,
            per_host: total / host_count,
            remainder: total % host_count,
        })
    }

    /// Classify a host holding `count` replicas.
    pub fn classify(&self, count: usize) -> HostVerdict {
        if count <= self.per_host {
            return HostVerdict::Balanced;
        }

        let excess = count - self.per_host;
        if self.remainder != 0 && excess == 1 {
            HostVerdict::Tolerated
        } else {
            HostVerdict::OverScheduled { excess }
        }
    }
}

/// Outcome of checking one host against the fair share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostVerdict {
    /// At or below the target.
    Balanced,
    /// One above the target while the scale does not divide evenly.
    Tolerated,
    /// Holds `excess` replicas more than the target.
    OverScheduled { excess: usize },
}

/// Resolve the host-count denominator.
///
/// Hosts matching the service's affinity label win when there is at least
/// one; otherwise the hosts already running a replica are used.
pub fn resolve_host_count(affinity_matches: Option<usize>, spread: &Spread) -> usize {
    match affinity_matches {
        Some(matches) if matches > 0 => matches,
        _ => spread.host_count(),
    }
}

/// A host that needs draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverScheduled {
    pub entry: SpreadEntry,
    pub excess: usize,
}

/// Drain plan for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalancePlan {
    pub share: FairShare,

    /// Hosts to drain, in spread order.
    pub over_scheduled: Vec<OverScheduled>,

    /// Hosts left one replica above target because of the remainder.
    pub tolerated: Vec<String>,
}

impl RebalancePlan {
    pub fn is_balanced(&self) -> bool {
        self.over_scheduled.is_empty()
    }

    /// Total replicas the plan would delete.
    pub fn total_excess(&self) -> usize {
        self.over_scheduled.iter().map(|host| host.excess).sum()
    }
}

/// Plan the drains needed to bring `spread` to the fair share.
pub fn plan(scale: u32, host_count: usize, spread: &Spread) -> Result<RebalancePlan, PlanError> {
    let share = FairShare::compute(scale, host_count)?;

    let mut over_scheduled = Vec::new();
    let mut tolerated = Vec::new();

    for entry in spread.entries() {
        match share.classify(entry.count()) {
            HostVerdict::Balanced => {}
            HostVerdict::Tolerated => tolerated.push(entry.host_id.clone()),
            HostVerdict::OverScheduled { excess } => over_scheduled.push(OverScheduled {
                entry: entry.clone(),
                excess,
            }),
        }
    }

    Ok(RebalancePlan {
        share,
        over_scheduled,
        tolerated,
    })
}
