//! Annotation, finalizer and event vocabulary shared by the reconciler and
//! the secret controllers. These keys are the persisted-state contract.

/// Last spec generation successfully applied remotely.
pub const PROCESSED_GENERATION_ANNOTATION: &str =
    "controllers.aiven.microscaler.io/generation-was-processed";

/// Last observed remote power state ("true"/"false").
pub const INSTANCE_IS_RUNNING_ANNOTATION: &str =
    "controllers.aiven.microscaler.io/instance-is-running";

/// Deletion policy; `Orphan` keeps the remote resource.
pub const DELETION_POLICY_ANNOTATION: &str = "controllers.aiven.microscaler.io/deletion-policy";

/// Value of [`DELETION_POLICY_ANNOTATION`] that skips remote deletion.
pub const DELETION_POLICY_ORPHAN: &str = "Orphan";

/// Presence bypasses the steady-state fast path; cleared on the next status commit.
pub const FORCE_RECONCILE_ANNOTATION: &str = "controllers.aiven.microscaler.io/force-reconcile";

/// Unix timestamp written when a `connInfoSecretSource` secret changed.
pub const SECRET_SOURCE_UPDATED_ANNOTATION: &str =
    "controllers.aiven.microscaler.io/secret-source-updated";

/// Deletion-protection finalizer on managed objects.
pub const DELETE_REMOTE_FINALIZER: &str = "finalizers.aiven.microscaler.io/delete-remote-resource";

/// Protection finalizer on auth credential secrets.
pub const SECRET_PROTECTION_FINALIZER: &str =
    "finalizers.aiven.microscaler.io/needed-to-delete-services";

/// Kubernetes event reasons.
pub mod reasons {
    /// Remote resource created
    pub const CREATED: &str = "Created";
    /// Remote resource updated
    pub const UPDATED: &str = "Updated";
    /// Create call failed
    pub const CREATE_FAILED: &str = "UnableToCreate";
    /// Update call failed
    pub const UPDATE_FAILED: &str = "UnableToUpdate";
    /// Observe call failed
    pub const OBSERVE_FAILED: &str = "UnableToGetResource";
    /// Remote delete failed
    pub const DELETE_FAILED: &str = "UnableToDelete";
    /// Remote resource deleted
    pub const DELETED: &str = "Deleted";
    /// Waiting on a precondition
    pub const PRECONDITION_PENDING: &str = "PreconditionNotMet";
    /// Parent service is powered off
    pub const POWERED_OFF: &str = "ServicePoweredOff";
    /// Transient remote failure
    pub const RETRYING: &str = "Retrying";
    /// Other resources still depend on this one
    pub const DEPENDENCY_EXISTS: &str = "DependencyExists";
    /// A declared reference cannot be resolved
    pub const REFERENCE_FAILED: &str = "UnableToResolveReference";
    /// API token could not be resolved
    pub const CLIENT_FAILED: &str = "UnableToCreateClient";
    /// Connection secret could not be written
    pub const SECRET_SYNC_FAILED: &str = "UnableToSyncConnectionSecret";
    /// Finalizer removed despite a rejected token
    pub const INVALID_TOKEN_IGNORED: &str = "InvalidTokenIgnored";
    /// Remote resource already gone at deletion time
    pub const ALREADY_DELETED: &str = "AlreadyDeleted";
    /// Condition reason while tracking remote power state
    pub const CHECK_RUNNING: &str = "CheckRunning";
}

/// Kubernetes event actions.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Finalization on deletion
    pub const DELETE: &str = "Delete";
}
