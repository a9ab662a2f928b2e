//! Controller-specific error types.
//!
//! Besides wrapping upstream errors, this module carries the classification
//! predicates the reconciler's error policy is driven by.

use aiven_client::AivenError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Aiven Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Aiven API error
    #[error("Aiven error: {0}")]
    Aiven(#[from] AivenError),

    /// The remote resource is not actionable yet (e.g. parent service still building)
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    /// The parent service is powered off
    #[error("precondition not met: service is powered off: {0}")]
    ServicePoweredOff(String),

    /// A declared reference names a kind the registry does not know
    #[error("unknown reference kind: {0}")]
    UnknownReferenceKind(String),

    /// The API token could not be resolved
    #[error("auth secret error: {0}")]
    AuthSecret(String),

    /// Publishing connection details failed
    #[error("unable to sync connection secret: {0}")]
    SecretSync(String),

    /// Optimistic concurrency conflict (HTTP 409)
    #[error("conflict writing {0}")]
    Conflict(String),

    /// The Kubernetes object does not exist (HTTP 404)
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Object (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Not actionable yet; includes the powered-off case.
    pub fn is_precondition_not_met(&self) -> bool {
        matches!(self, Self::PreconditionNotMet(_) | Self::ServicePoweredOff(_))
    }

    /// The parent service is powered off.
    pub fn is_service_powered_off(&self) -> bool {
        matches!(self, Self::ServicePoweredOff(_))
    }

    /// Remote or Kubernetes not-found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Aiven(e) => e.is_not_found(),
            Self::ObjectNotFound(_) => true,
            _ => false,
        }
    }

    /// Transient remote failure worth a short requeue.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Aiven(e) if e.is_retryable())
    }

    /// Remote deletion rejected because other resources still depend on it.
    pub fn is_dependency_exists(&self) -> bool {
        matches!(self, Self::Aiven(e) if e.is_dependency_error())
    }

    /// The API token was rejected.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::Aiven(e) if e.is_invalid_token())
    }

    /// Optimistic concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powered_off_is_precondition() {
        let err = ControllerError::ServicePoweredOff("pg".to_string());
        assert!(err.is_precondition_not_met());
        assert!(err.is_service_powered_off());
        assert!(!ControllerError::PreconditionNotMet("pg".to_string()).is_service_powered_off());
    }

    #[test]
    fn test_aiven_classification_passes_through() {
        let err = ControllerError::from(AivenError::from_status(503, "try again"));
        assert!(err.is_retryable());
        assert!(!err.is_not_found());

        let err = ControllerError::from(AivenError::from_status(404, "Service not found"));
        assert!(err.is_not_found());

        let err = ControllerError::from(AivenError::from_status(409, "Project VPC has dependent services"));
        assert!(err.is_dependency_exists());

        let err = ControllerError::from(AivenError::from_status(403, "Invalid token"));
        assert!(err.is_invalid_token());
    }
}
