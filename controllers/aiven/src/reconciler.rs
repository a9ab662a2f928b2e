//! Generic reconciliation engine.
//!
//! One [`Reconciler`] per managed kind drives the same state machine:
//! load, resolve references, acquire a client, finalize or ensure the
//! finalizer, observe, then create/update/steady-state, publish connection
//! details and persist. The per-kind behavior lives behind
//! [`ResourceHandler`].

use crate::backoff::{ErrorBackoff, ExponentialBackoff};
use crate::client::ClientFactory;
use crate::conditions::{
    error_condition, initialized_condition, remove_condition, running_condition, set_condition,
};
use crate::config::ControllerConfig;
use crate::constants::{
    DELETE_REMOTE_FINALIZER, FORCE_RECONCILE_ANNOTATION, PROCESSED_GENERATION_ANNOTATION, actions,
    reasons,
};
use crate::error::ControllerError;
use crate::error_policy::{ErrorClass, classify};
use crate::events::EventPublisher;
use crate::handler::{HandlerBuilder, HandlerContext, ResourceHandler};
use crate::k8s::{ObjectApi, annotation, has_finalizer, object_key, set_annotation, set_finalizer};
use crate::metrics::Metrics;
use crate::registry::KindRegistry;
use crate::secrets::publish_secret_details;
use crate::status::{StatusUpdate, commit_status};
use crds::{
    CONDITION_ERROR, CONDITION_RUNNING, ConditionStatus, ManagedResource, find_condition,
    is_condition_true,
};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::events::EventType;
use kube_runtime::controller::Action;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every kind's reconciler.
pub struct Context {
    /// Every managed kind, for reference resolution
    pub registry: Arc<KindRegistry>,
    /// Aiven client acquisition
    pub clients: Arc<ClientFactory>,
    /// Secret access for connection secrets
    pub secrets: Arc<dyn ObjectApi<Secret>>,
    /// Kubernetes event emission
    pub events: Arc<dyn EventPublisher>,
    /// Prometheus metrics
    pub metrics: Arc<Metrics>,
    /// Requeue intervals, retry bounds
    pub config: ControllerConfig,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

enum ReferenceGate {
    Ready,
    Pending(String),
}

/// Reconciles one managed kind.
pub struct Reconciler<K: ManagedResource> {
    pub(crate) ctx: Arc<Context>,
    pub(crate) api: Arc<dyn ObjectApi<K>>,
    handlers: HandlerBuilder<K>,
    backoff: ErrorBackoff,
}

impl<K: ManagedResource> std::fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("kind", &K::kind(&()))
            .finish_non_exhaustive()
    }
}

/// Processed-generation annotation as a number.
pub fn processed_generation<K: ManagedResource>(object: &K) -> Option<i64> {
    annotation(object, PROCESSED_GENERATION_ANNOTATION)?.parse().ok()
}

/// The current generation has been applied remotely.
pub fn is_already_processed<K: ManagedResource>(object: &K) -> bool {
    processed_generation(object) == Some(object.meta().generation.unwrap_or_default())
}

/// Nothing to do: generation applied, remote running, no force trigger.
fn is_steady<K: ManagedResource>(object: &K) -> bool {
    is_already_processed(object)
        && is_condition_true(object.conditions(), CONDITION_RUNNING)
        && annotation(object, FORCE_RECONCILE_ANNOTATION).is_none()
}

impl<K: ManagedResource> Reconciler<K> {
    /// Reconciler over `api` using `handlers` to build the per-kind handler.
    pub fn new(ctx: Arc<Context>, api: Arc<dyn ObjectApi<K>>, handlers: HandlerBuilder<K>) -> Self {
        let backoff = ErrorBackoff::new(ExponentialBackoff::new(
            ctx.config.error_backoff_base,
            ctx.config.error_backoff_max,
        ));
        Self {
            ctx,
            api,
            handlers,
            backoff,
        }
    }

    fn kind() -> String {
        K::kind(&()).into_owned()
    }

    fn attempts(&self) -> u32 {
        self.ctx.config.conflict_retry_attempts
    }

    /// Entry point for the runtime controller: records metrics and resets
    /// the hard-error backoff on success.
    pub async fn reconcile_object(&self, object: &K) -> Result<Action, ControllerError> {
        let key = object_key(object);
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        let started = Instant::now();
        let result = self.reconcile(&namespace, &name).await;
        self.ctx
            .metrics
            .observe_reconcile(&Self::kind(), started.elapsed(), result.is_err());
        if result.is_ok() {
            self.backoff.reset(&key);
        }
        result
    }

    /// Requeue for a hard error, backing off per object.
    pub fn error_action(&self, object: &K, err: &ControllerError) -> Action {
        let key = object_key(object);
        let delay = self.backoff.record_failure(&key);
        error!("Reconciliation error for {} {}: {} (retrying in {:?})", Self::kind(), key, err, delay);
        Action::requeue(delay)
    }

    /// Run one reconcile of `namespace/name`.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Action, ControllerError> {
        let config = &self.ctx.config;
        let Some(mut object) = self.api.get(namespace, name).await? else {
            debug!("{} {}/{} not found, nothing to do", Self::kind(), namespace, name);
            return Ok(Action::await_change());
        };
        let deleting = object.meta().deletion_timestamp.is_some();

        // Referents may already be gone while this object is being deleted.
        if !deleting {
            match self.check_references(&object).await {
                Ok(ReferenceGate::Ready) => {}
                Ok(ReferenceGate::Pending(reason)) => {
                    info!("{} {}/{} waiting on reference: {}", Self::kind(), namespace, name, reason);
                    return Ok(Action::requeue(config.requeue_timeout));
                }
                Err(e) => {
                    self.record_failure(&object, reasons::REFERENCE_FAILED, &e).await;
                    return Err(e);
                }
            }
        }

        let client = match self.ctx.clients.client_for(&object).await {
            Ok(client) => client,
            Err(e) => {
                self.record_failure(&object, reasons::CLIENT_FAILED, &e).await;
                return Err(e);
            }
        };
        let handler = (self.handlers)(HandlerContext {
            client,
            secrets: Arc::clone(&self.ctx.secrets),
        });

        if deleting {
            return self.finalize(handler.as_ref(), object).await;
        }

        if !has_finalizer(&object, DELETE_REMOTE_FINALIZER) {
            let written = set_finalizer(
                self.api.as_ref(),
                namespace,
                name,
                DELETE_REMOTE_FINALIZER,
                true,
                self.attempts(),
            )
            .await?;
            match written {
                Some(latest) => object = latest,
                None => return Ok(Action::await_change()),
            }
        }
        // Taken after the finalizer write so the diff holds only this pass's changes.
        let snapshot = object.clone();

        if is_steady(&object) {
            debug!("{} {}/{} is up to date", Self::kind(), namespace, name);
            return Ok(Action::requeue(config.poll_interval));
        }

        let mut bookkeeping = StatusUpdate::new();
        let result = self.converge(handler.as_ref(), &mut object, &mut bookkeeping).await;
        let persisted = self.persist(&snapshot, &mut object).await;
        match (result, persisted) {
            (Err(e), Err(persist_err)) => {
                warn!(
                    "Failed to persist {} {}/{} after error: {}",
                    Self::kind(),
                    namespace,
                    name,
                    persist_err
                );
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
            (Ok(action), Ok(())) => {
                commit_status(self.api.as_ref(), namespace, name, &bookkeeping, self.attempts()).await?;
                Ok(action)
            }
        }
    }

    async fn check_references(&self, object: &K) -> Result<ReferenceGate, ControllerError> {
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        for reference in object.references() {
            let entry = self.ctx.registry.lookup(&reference.kind)?;
            match entry.conditions(&namespace, &reference.name).await? {
                None => return Ok(ReferenceGate::Pending(format!("{reference} not found"))),
                Some(conditions) if !is_condition_true(&conditions, CONDITION_RUNNING) => {
                    return Ok(ReferenceGate::Pending(format!("{reference} is not ready")));
                }
                Some(_) => {}
            }
        }
        Ok(ReferenceGate::Ready)
    }

    /// Drive the remote resource toward the spec. On success `bookkeeping`
    /// carries the processed generation, committed once the object is persisted.
    async fn converge(
        &self,
        handler: &dyn ResourceHandler<K>,
        object: &mut K,
        bookkeeping: &mut StatusUpdate,
    ) -> Result<Action, ControllerError> {
        let config = &self.ctx.config;
        let key = object_key(object);

        let observation = match handler.observe(object).await {
            Ok(observation) => observation,
            Err(e) => {
                return self
                    .apply_error_policy(object, e, actions::RECONCILE, reasons::OBSERVE_FAILED)
                    .await;
            }
        };

        let details = if !observation.resource_exists {
            match handler.create(object).await {
                Ok(created) => {
                    info!("Created {} {}", Self::kind(), key);
                    self.event(object, EventType::Normal, reasons::CREATED, actions::RECONCILE, "Remote resource created".to_string())
                        .await;
                    set_condition(
                        object.conditions_mut(),
                        initialized_condition(reasons::CREATED, "Successfully created"),
                    );
                    if find_condition(object.conditions(), CONDITION_RUNNING).is_none() {
                        set_condition(
                            object.conditions_mut(),
                            running_condition(ConditionStatus::Unknown, reasons::CHECK_RUNNING, "Instance is not yet running"),
                        );
                    }
                    created.secret_details
                }
                Err(e) => {
                    self.mark_error(object, reasons::CREATE_FAILED, &e).await;
                    return Err(e);
                }
            }
        } else if !observation.resource_up_to_date {
            match handler.update(object).await {
                Ok(updated) => {
                    info!("Updated {} {}", Self::kind(), key);
                    self.event(object, EventType::Normal, reasons::UPDATED, actions::RECONCILE, "Remote resource updated".to_string())
                        .await;
                    set_condition(
                        object.conditions_mut(),
                        initialized_condition(reasons::UPDATED, "Successfully updated"),
                    );
                    updated.secret_details
                }
                Err(e) if e.is_not_found() => {
                    info!("{} {} vanished during update, requeueing: {}", Self::kind(), key, e);
                    return Ok(Action::requeue(config.requeue_timeout));
                }
                Err(e) => {
                    self.mark_error(object, reasons::UPDATE_FAILED, &e).await;
                    return Err(e);
                }
            }
        } else {
            observation.secret_details
        };

        if let Err(e) =
            publish_secret_details(self.ctx.secrets.as_ref(), object, &details, self.attempts()).await
        {
            self.mark_error(object, reasons::SECRET_SYNC_FAILED, &e).await;
            return Err(e);
        }

        remove_condition(object.conditions_mut(), CONDITION_ERROR);
        bookkeeping.set_processed_generation(object.meta().generation.unwrap_or_default());
        Ok(Action::requeue(config.poll_interval))
    }

    /// Turn an observe/delete error into a requeue or a hard error.
    pub(crate) async fn apply_error_policy(
        &self,
        object: &mut K,
        err: ControllerError,
        action: &str,
        failure_reason: &str,
    ) -> Result<Action, ControllerError> {
        let config = &self.ctx.config;
        let key = object_key(object);
        match classify(&err) {
            ErrorClass::PoweredOff => {
                info!("{} {}: {}", Self::kind(), key, err);
                set_condition(object.conditions_mut(), error_condition(reasons::POWERED_OFF, err.to_string()));
                self.event(object, EventType::Warning, reasons::POWERED_OFF, action, err.to_string())
                    .await;
                Ok(Action::requeue(config.poll_interval))
            }
            ErrorClass::PreconditionPending => {
                debug!("{} {}: {}", Self::kind(), key, err);
                self.event(object, EventType::Normal, reasons::PRECONDITION_PENDING, action, err.to_string())
                    .await;
                Ok(Action::requeue(config.requeue_timeout))
            }
            ErrorClass::Retryable => {
                warn!("{} {}: retryable error: {}", Self::kind(), key, err);
                self.event(object, EventType::Warning, reasons::RETRYING, action, err.to_string())
                    .await;
                Ok(Action::requeue(config.requeue_timeout))
            }
            ErrorClass::DependencyExists => {
                info!("{} {}: dependents still exist: {}", Self::kind(), key, err);
                self.event(object, EventType::Normal, reasons::DEPENDENCY_EXISTS, action, err.to_string())
                    .await;
                Ok(Action::requeue(config.requeue_timeout))
            }
            ErrorClass::Fatal => {
                self.mark_error(object, failure_reason, &err).await;
                Err(err)
            }
        }
    }

    /// Error condition in memory plus a warning event.
    async fn mark_error(&self, object: &mut K, reason: &str, err: &ControllerError) {
        error!("{} {}: {}: {}", Self::kind(), object_key(object), reason, err);
        set_condition(object.conditions_mut(), error_condition(reason, err.to_string()));
        self.event(object, EventType::Warning, reason, actions::RECONCILE, err.to_string())
            .await;
    }

    /// Error condition committed directly, for failures before the snapshot.
    async fn record_failure(&self, object: &K, reason: &str, err: &ControllerError) {
        error!("{} {}: {}: {}", Self::kind(), object_key(object), reason, err);
        let mut update = StatusUpdate::new();
        update.set_condition(error_condition(reason, err.to_string()));
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        if let Err(commit_err) =
            commit_status(self.api.as_ref(), &namespace, &name, &update, self.attempts()).await
        {
            warn!("Failed to record error condition on {}/{}: {}", namespace, name, commit_err);
        }
        self.event(object, EventType::Warning, reason, actions::RECONCILE, err.to_string())
            .await;
    }

    pub(crate) async fn event(&self, object: &K, type_: EventType, reason: &str, action: &str, note: String) {
        self.ctx
            .events
            .publish(&object.object_ref(&()), type_, reason, action, Some(note))
            .await;
    }

    /// Write `object` back if it differs from `snapshot`: the main resource
    /// first, then the status subresource. On conflict the in-memory changes
    /// are rebased onto the latest version and retried.
    pub(crate) async fn persist(&self, snapshot: &K, object: &mut K) -> Result<(), ControllerError> {
        let before = serde_json::to_value(snapshot)?;
        let after = serde_json::to_value(&*object)?;
        if before == after {
            return Ok(());
        }
        let metadata_changed = before.get("metadata") != after.get("metadata");
        let status_changed = before.get("status") != after.get("status");
        let annotation_changes = annotation_diff(snapshot, object);
        let status = after.get("status").cloned();
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();

        let mut attempt = 1;
        loop {
            match self
                .write_object(&namespace, &name, object, metadata_changed, status_changed)
                .await
            {
                Err(e) if e.is_conflict() && attempt < self.attempts() => {
                    debug!("Conflict persisting {}/{} (attempt {}): {}", namespace, name, attempt, e);
                    attempt += 1;
                    let latest = self
                        .api
                        .get(&namespace, &name)
                        .await?
                        .ok_or_else(|| ControllerError::ObjectNotFound(format!("{}/{}", namespace, name)))?;
                    *object = rebase(latest, &annotation_changes, status.as_ref())?;
                }
                other => return other,
            }
        }
    }

    async fn write_object(
        &self,
        namespace: &str,
        name: &str,
        object: &mut K,
        metadata_changed: bool,
        status_changed: bool,
    ) -> Result<(), ControllerError> {
        if metadata_changed {
            let written = self.api.replace(namespace, name, object).await?;
            object.meta_mut().resource_version = written.meta().resource_version.clone();
        }
        if status_changed {
            let written = self.api.replace_status(namespace, name, object).await?;
            object.meta_mut().resource_version = written.meta().resource_version.clone();
        }
        Ok(())
    }
}

/// Annotations set (`Some`) or removed (`None`) between two versions.
fn annotation_diff<K: ManagedResource>(before: &K, after: &K) -> BTreeMap<String, Option<String>> {
    let empty = BTreeMap::new();
    let old = before.meta().annotations.as_ref().unwrap_or(&empty);
    let new = after.meta().annotations.as_ref().unwrap_or(&empty);
    let mut diff: BTreeMap<String, Option<String>> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), Some(v.clone())))
        .collect();
    for key in old.keys().filter(|k| !new.contains_key(*k)) {
        diff.insert(key.clone(), None);
    }
    diff
}

/// Reapply this pass's annotation and status changes on top of `latest`.
fn rebase<K: ManagedResource>(
    latest: K,
    annotation_changes: &BTreeMap<String, Option<String>>,
    status: Option<&Value>,
) -> Result<K, ControllerError> {
    let mut rebased = latest;
    for (key, value) in annotation_changes {
        match value {
            Some(value) => set_annotation(&mut rebased, key, value.clone()),
            None => {
                if let Some(annotations) = rebased.meta_mut().annotations.as_mut() {
                    annotations.remove(key);
                }
            }
        }
    }
    let Some(status) = status else {
        return Ok(rebased);
    };
    let mut value = serde_json::to_value(&rebased)?;
    if let Value::Object(root) = &mut value {
        root.insert("status".to_string(), status.clone());
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod reconciler_test;
