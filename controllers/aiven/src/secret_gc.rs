//! Garbage collection of the auth secret protection finalizer.
//!
//! A token secret keeps [`SECRET_PROTECTION_FINALIZER`] while any managed
//! object in its namespace names it in `authSecretRef`. Once the last one is
//! gone the finalizer is removed so the secret can be deleted.

use crate::constants::SECRET_PROTECTION_FINALIZER;
use crate::error::ControllerError;
use crate::k8s::{ObjectApi, has_finalizer, set_finalizer};
use crate::metrics::Metrics;
use crate::registry::KindRegistry;
use k8s_openapi::api::core::v1::Secret;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{debug, info};

/// Removes the protection finalizer from auth secrets nobody references.
pub struct SecretGc {
    secrets: Arc<dyn ObjectApi<Secret>>,
    registry: Arc<KindRegistry>,
    metrics: Arc<Metrics>,
    conflict_retry_attempts: u32,
}

impl SecretGc {
    /// GC over `secrets`; `registry` answers whether any managed object still references one.
    /// Finalizer removal retries conflicts up to `conflict_retry_attempts` times.
    pub fn new(
        secrets: Arc<dyn ObjectApi<Secret>>,
        registry: Arc<KindRegistry>,
        metrics: Arc<Metrics>,
        conflict_retry_attempts: u32,
    ) -> Self {
        Self {
            secrets,
            registry,
            metrics,
            conflict_retry_attempts,
        }
    }

    /// Check one secret.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Action, ControllerError> {
        let Some(secret) = self.secrets.get(namespace, name).await? else {
            return Ok(Action::await_change());
        };
        if !has_finalizer(&secret, SECRET_PROTECTION_FINALIZER) {
            return Ok(Action::await_change());
        }

        if let Some((kind, user)) = self.first_user(namespace, name).await? {
            debug!("Secret {}/{} is still used by {} {}", namespace, name, kind, user);
            return Ok(Action::await_change());
        }

        set_finalizer(
            self.secrets.as_ref(),
            namespace,
            name,
            SECRET_PROTECTION_FINALIZER,
            false,
            self.conflict_retry_attempts,
        )
        .await?;
        self.metrics.inc_finalizers_removed();
        info!("Removed protection finalizer from unused secret {}/{}", namespace, name);
        Ok(Action::await_change())
    }

    /// Any object across every kind whose `authSecretRef` names the secret.
    async fn first_user(&self, namespace: &str, name: &str) -> Result<Option<(String, String)>, ControllerError> {
        for entry in self.registry.entries() {
            let summaries = entry.summaries(Some(namespace)).await?;
            if let Some(user) = summaries
                .into_iter()
                .find(|s| s.auth_secret_name.as_deref() == Some(name))
            {
                return Ok(Some((user.kind, user.name)));
            }
        }
        Ok(None)
    }
}
