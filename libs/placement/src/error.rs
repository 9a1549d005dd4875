//! Error types for label parsing and planning.

use thiserror::Error;

/// Errors parsing a `key=value` label.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label filter '{0}' must have the form key=value")]
    MissingSeparator(String),

    #[error("label filter '{0}' has an empty key")]
    EmptyKey(String),
}

/// Errors producing a rebalance plan.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// No host is available to compute a fair share against.
    #[error("no eligible hosts to spread {scale} replicas across")]
    NoEligibleHosts { scale: u32 },
}
