//! The per-kind contract the generic reconciler drives.

use crate::error::ControllerError;
use crate::k8s::ObjectApi;
use aiven_client::AivenClientTrait;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Remote state relative to the desired spec. Recomputed every reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// The remote resource exists
    pub resource_exists: bool,
    /// The remote resource matches the spec
    pub resource_up_to_date: bool,
    /// Unprefixed connection details to publish; empty for none
    pub secret_details: BTreeMap<String, String>,
}

/// Result of `create`; same shape as [`Observation`].
pub type CreateResult = Observation;

/// Result of `update`; same shape as [`Observation`].
pub type UpdateResult = Observation;

impl Observation {
    /// The remote resource does not exist.
    pub fn missing() -> Self {
        Self::default()
    }

    /// The remote resource exists.
    pub fn exists(up_to_date: bool) -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            secret_details: BTreeMap::new(),
        }
    }

    /// Attach connection details.
    #[must_use]
    pub fn with_secret(mut self, details: BTreeMap<String, String>) -> Self {
        self.secret_details = details;
        self
    }
}

/// Observe/create/update/delete for one managed kind.
///
/// `observe`, `create` and `update` may mutate the object's status and
/// annotations in memory; the reconciler persists them.
#[async_trait]
pub trait ResourceHandler<K: Send + Sync>: Send + Sync {
    /// Check remote existence and preconditions; no remote side effects.
    /// Returns `PreconditionNotMet`/`ServicePoweredOff` when not actionable yet.
    async fn observe(&self, object: &mut K) -> Result<Observation, ControllerError>;

    /// Create the remote resource. Called only when it does not exist.
    async fn create(&self, object: &mut K) -> Result<CreateResult, ControllerError>;

    /// Re-apply the desired state to an existing remote resource.
    async fn update(&self, object: &mut K) -> Result<UpdateResult, ControllerError>;

    /// Delete the remote resource. A remote not-found is returned as an
    /// error; the reconciler treats it as already deleted.
    async fn delete(&self, object: &K) -> Result<(), ControllerError>;
}

/// What a handler is built from for one reconcile.
#[derive(Clone)]
pub struct HandlerContext {
    /// Client authenticated for the object being reconciled
    pub client: Arc<dyn AivenClientTrait>,
    /// Secret access (e.g. reading `connInfoSecretSource`)
    pub secrets: Arc<dyn ObjectApi<Secret>>,
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("aiven", &self.client.base_url())
            .finish_non_exhaustive()
    }
}

/// Constructs a kind's handler from a [`HandlerContext`].
pub type HandlerBuilder<K> = Arc<dyn Fn(HandlerContext) -> Box<dyn ResourceHandler<K>> + Send + Sync>;
