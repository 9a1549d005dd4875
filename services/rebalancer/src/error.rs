//! Error types for platform access, notification, and rebalance passes.

use rebalancer_placement::PlanError;
use thiserror::Error;

/// Errors talking to the platform API.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Credentials were rejected (HTTP 401/403).
    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, code: String, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl PlatformError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to send notification: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Errors raised by a rebalance pass.
///
/// Everything except [`RebalanceError::ListServices`] and
/// [`RebalanceError::Unauthorized`] is scoped to a single service.
#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error("failed to list services: {0}")]
    ListServices(#[source] PlatformError),

    #[error("platform rejected credentials: {0}")]
    Unauthorized(#[source] PlatformError),

    #[error("failed to resolve replicas of {service}: {source}")]
    ListReplicas {
        service: String,
        #[source]
        source: PlatformError,
    },

    #[error("cannot plan {service}: {source}")]
    NoEligibleHosts {
        service: String,
        #[source]
        source: PlanError,
    },

    #[error("failed to resolve host {host_id}: {source}")]
    HostResolution {
        host_id: String,
        #[source]
        source: PlatformError,
    },

    #[error("failed to notify about {service}: {source}")]
    Notification {
        service: String,
        #[source]
        source: NotifyError,
    },
}

impl RebalanceError {
    /// Whether the error ends the whole pass rather than one service.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ListServices(_) | Self::Unauthorized(_))
    }

    /// Lift a platform error, escalating credential failures.
    pub(crate) fn escalate(err: PlatformError, scoped: impl FnOnce(PlatformError) -> Self) -> Self {
        if err.is_unauthorized() {
            Self::Unauthorized(err)
        } else {
            scoped(err)
        }
    }
}

pub type RebalanceResult<T> = Result<T, RebalanceError>;
