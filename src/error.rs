//! Error taxonomy shared by the connector, resolver, pipelines and pages.

use crate::model::Feature;
use serde::{Deserialize, Serialize};

/// Classification carried by `TaskEvent::Error` and `HubError::kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Input,
    Busy,
    ServiceUnreachable,
    Service,
    PullFailed,
    ExternalDataUnavailable,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Short title used by presentation layers for error banners.
    pub fn title(self) -> &'static str {
        match self {
            ErrorKind::Input => "Invalid input",
            ErrorKind::Busy => "Busy",
            ErrorKind::ServiceUnreachable => "Model service unreachable",
            ErrorKind::Service => "Model service error",
            ErrorKind::PullFailed => "Model pull failed",
            ErrorKind::ExternalDataUnavailable => "Transcript unavailable",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "Internal error",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    #[error("{0}")]
    Input(String),
    #[error("a task is already running on the {0} page")]
    Busy(Feature),
    #[error("cannot reach the model service: {0}")]
    ServiceUnreachable(String),
    #[error("model service error: {0}")]
    Service(String),
    #[error("model pull failed: {0}")]
    PullFailed(String),
    #[error("transcript unavailable: {0}")]
    ExternalDataUnavailable(String),
    #[error("task executor was already started")]
    AlreadyStarted,
    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::Input(_) => ErrorKind::Input,
            HubError::Busy(_) => ErrorKind::Busy,
            HubError::ServiceUnreachable(_) => ErrorKind::ServiceUnreachable,
            HubError::Service(_) => ErrorKind::Service,
            HubError::PullFailed(_) => ErrorKind::PullFailed,
            HubError::ExternalDataUnavailable(_) => ErrorKind::ExternalDataUnavailable,
            HubError::AlreadyStarted | HubError::Internal(_) => ErrorKind::Internal,
        }
    }
}
