//! Error types for task orchestration

use portalflow_browser::BrowserError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hint attached to every portal timeout.
pub const TIMEOUT_HINT: &str = "The portal never reached the expected state. This usually means a previous input (such as the CAPTCHA or OTP) was incorrect. Please start the task again.";

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("{0}")]
    InputInvalid(String),

    #[error("Session {0} has expired or was not found. Please start the task again.")]
    SessionExpiredOrNotFound(String),

    #[error("Session {0} is still processing a previous request")]
    SessionBusy(String),

    #[error("Timed out waiting for {operation}. {hint}")]
    PortalInteractionTimeout { operation: String, hint: String },

    #[error("{0}")]
    PortalRejected(String),

    #[error("Browser resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Caller-visible failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InputInvalid,
    SessionExpiredOrNotFound,
    SessionBusy,
    PortalInteractionTimeout,
    PortalRejected,
    ResourceUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InputInvalid => 400,
            ErrorKind::SessionExpiredOrNotFound => 404,
            ErrorKind::SessionBusy => 409,
            ErrorKind::PortalRejected => 422,
            ErrorKind::ResourceUnavailable => 503,
            ErrorKind::PortalInteractionTimeout => 504,
            ErrorKind::Internal => 500,
        }
    }
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::InputInvalid(_) => ErrorKind::InputInvalid,
            OrchestratorError::SessionExpiredOrNotFound(_) => ErrorKind::SessionExpiredOrNotFound,
            OrchestratorError::SessionBusy(_) => ErrorKind::SessionBusy,
            OrchestratorError::PortalInteractionTimeout { .. } => {
                ErrorKind::PortalInteractionTimeout
            }
            OrchestratorError::PortalRejected(_) => ErrorKind::PortalRejected,
            OrchestratorError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            OrchestratorError::Config(_) => ErrorKind::Internal,
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        OrchestratorError::PortalInteractionTimeout {
            operation: operation.into(),
            hint: TIMEOUT_HINT.to_string(),
        }
    }

    pub fn missing_fields(step: &str, fields: &[String]) -> Self {
        OrchestratorError::InputInvalid(format!(
            "Step '{}' requires the following fields: {}",
            step,
            fields.join(", ")
        ))
    }
}

impl From<BrowserError> for OrchestratorError {
    fn from(error: BrowserError) -> Self {
        match error {
            BrowserError::Timeout { operation, .. } => OrchestratorError::timeout(operation),
            BrowserError::Interaction(message) => OrchestratorError::PortalRejected(message),
            BrowserError::InvalidTimeout(message) => OrchestratorError::Config(message),
            BrowserError::Launch(message) => OrchestratorError::ResourceUnavailable(message),
            other => OrchestratorError::ResourceUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
