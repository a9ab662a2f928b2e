//! Classification of handler errors into requeue outcomes.
//!
//! Applies to the observe and delete paths. Only `Fatal` errors are returned
//! to the work queue; everything else becomes a bounded requeue.

use crate::error::ControllerError;

/// How an observe/delete error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Parent service powered off: Error condition, warning, long requeue
    PoweredOff,
    /// Not actionable yet: informational event, short requeue
    PreconditionPending,
    /// Remote 5xx or rate limited: warning, short requeue
    Retryable,
    /// Remote deletion blocked by dependents: informational, short requeue
    DependencyExists,
    /// Error condition, warning, returned as a hard error
    Fatal,
}

/// Classify an error from `observe` or `delete`.
pub fn classify(err: &ControllerError) -> ErrorClass {
    if err.is_service_powered_off() {
        ErrorClass::PoweredOff
    } else if err.is_precondition_not_met() {
        ErrorClass::PreconditionPending
    } else if err.is_retryable() {
        ErrorClass::Retryable
    } else if err.is_dependency_exists() {
        ErrorClass::DependencyExists
    } else {
        ErrorClass::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiven_client::AivenError;

    #[test]
    fn test_classify() {
        assert_eq!(classify(&ControllerError::ServicePoweredOff("pg".into())), ErrorClass::PoweredOff);
        assert_eq!(
            classify(&ControllerError::PreconditionNotMet("pg".into())),
            ErrorClass::PreconditionPending
        );
        assert_eq!(classify(&AivenError::from_status(502, "bad gateway").into()), ErrorClass::Retryable);
        assert_eq!(classify(&AivenError::from_status(429, "slow down").into()), ErrorClass::Retryable);
        assert_eq!(
            classify(&AivenError::from_status(409, "Project VPC has dependent services").into()),
            ErrorClass::DependencyExists
        );
        assert_eq!(classify(&AivenError::from_status(400, "invalid plan").into()), ErrorClass::Fatal);
        assert_eq!(classify(&AivenError::from_status(501, "not implemented").into()), ErrorClass::Fatal);
    }
}
