//! Accumulate-then-commit status updates.
//!
//! A [`StatusUpdate`] collects condition replacements and the processed
//! generation during one pass. [`commit_status`] applies it to the latest
//! object in two conflict-retried writes: the status subresource first, then
//! a merge patch of the annotations that also strips the force-reconcile
//! trigger. The two writes are not atomic. Type-specific status fields live
//! on each kind's typed status and are written by the reconciler's persist.

use crate::conditions::set_condition;
use crate::constants::{FORCE_RECONCILE_ANNOTATION, PROCESSED_GENERATION_ANNOTATION};
use crate::error::ControllerError;
use crate::k8s::{ObjectApi, retry_on_conflict};
use crds::{Condition, ManagedResource};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// A batch of status and annotation mutations for one object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    conditions: Vec<Condition>,
    processed_generation: Option<i64>,
}

impl StatusUpdate {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace-by-type within the batch.
    pub fn set_condition(&mut self, condition: Condition) -> &mut Self {
        set_condition(&mut self.conditions, condition);
        self
    }

    /// Stamp the processed-generation annotation.
    pub fn set_processed_generation(&mut self, generation: i64) -> &mut Self {
        self.processed_generation = Some(generation);
        self
    }

    /// Nothing accumulated.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.processed_generation.is_none()
    }

    /// Annotation changes as merge-patch values (`null` deletes): the
    /// processed generation, plus removal of the force-reconcile trigger
    /// when `current` carries it. Keys already at their target are dropped.
    fn annotation_changes(&self, current: &BTreeMap<String, String>) -> Map<String, Value> {
        let mut changes = Map::new();
        if let Some(generation) = self.processed_generation {
            let generation = generation.to_string();
            if current.get(PROCESSED_GENERATION_ANNOTATION) != Some(&generation) {
                changes.insert(PROCESSED_GENERATION_ANNOTATION.to_string(), Value::String(generation));
            }
        }
        if current.contains_key(FORCE_RECONCILE_ANNOTATION) {
            changes.insert(FORCE_RECONCILE_ANNOTATION.to_string(), Value::Null);
        }
        changes
    }
}

/// Apply `update` to the latest version of `namespace/name`.
pub async fn commit_status<K: ManagedResource>(
    api: &dyn ObjectApi<K>,
    namespace: &str,
    name: &str,
    update: &StatusUpdate,
    attempts: u32,
) -> Result<(), ControllerError> {
    if update.is_empty() {
        return Ok(());
    }
    if !update.conditions.is_empty() {
        retry_on_conflict(attempts, || write_status(api, namespace, name, update)).await?;
    }
    retry_on_conflict(attempts, || write_annotations(api, namespace, name, update)).await
}

async fn fetch_latest<K: ManagedResource>(
    api: &dyn ObjectApi<K>,
    namespace: &str,
    name: &str,
) -> Result<K, ControllerError> {
    api.get(namespace, name)
        .await?
        .ok_or_else(|| ControllerError::ObjectNotFound(format!("{}/{}", namespace, name)))
}

async fn write_status<K: ManagedResource>(
    api: &dyn ObjectApi<K>,
    namespace: &str,
    name: &str,
    update: &StatusUpdate,
) -> Result<(), ControllerError> {
    let mut latest = fetch_latest(api, namespace, name).await?;
    for condition in &update.conditions {
        set_condition(latest.conditions_mut(), condition.clone());
    }
    api.replace_status(namespace, name, &latest).await?;
    debug!("Committed status for {}/{}", namespace, name);
    Ok(())
}

async fn write_annotations<K: ManagedResource>(
    api: &dyn ObjectApi<K>,
    namespace: &str,
    name: &str,
    update: &StatusUpdate,
) -> Result<(), ControllerError> {
    let latest = fetch_latest(api, namespace, name).await?;
    let changes = update.annotation_changes(latest.meta().annotations.as_ref().unwrap_or(&BTreeMap::new()));
    if changes.is_empty() {
        return Ok(());
    }
    let patch = serde_json::json!({
        "metadata": {
            "resourceVersion": latest.meta().resource_version,
            "annotations": changes,
        }
    });
    api.patch_merge(namespace, name, &patch).await?;
    debug!("Committed annotations for {}/{}", namespace, name);
    Ok(())
}

#[cfg(test)]
#[path = "status_test.rs"]
mod status_test;
