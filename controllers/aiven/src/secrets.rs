//! Connection secret publication.
//!
//! Details returned by a handler are written to the object's connection
//! secret with a create-or-merge: keys already present but absent from the
//! new details are kept. The secret is owned by the managed object so it is
//! garbage-collected with it.

use crate::error::ControllerError;
use crate::k8s::{ObjectApi, retry_on_conflict};
use crds::ManagedResource;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the connection secret for `object`.
pub fn secret_name<K: ManagedResource>(object: &K) -> String {
    object
        .conn_info_secret_target()
        .map(|target| target.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| object.meta().name.clone().unwrap_or_default())
}

/// Keys as they are written: prefixed, plus the bare keys for kinds that
/// still publish them.
pub fn secret_data<K: ManagedResource>(
    object: &K,
    details: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let prefix = object
        .conn_info_secret_target()
        .and_then(|target| target.prefix.clone())
        .unwrap_or_else(|| K::SECRET_PREFIX.to_string());
    let mut data = BTreeMap::new();
    for (key, value) in details {
        data.insert(format!("{prefix}{key}"), value.clone());
        if K::LEGACY_SECRET_KEYS {
            data.insert(key.clone(), value.clone());
        }
    }
    data
}

fn desired_secret<K: ManagedResource>(object: &K, details: &BTreeMap<String, String>) -> Secret {
    let target = object.conn_info_secret_target();
    Secret {
        metadata: ObjectMeta {
            name: Some(secret_name(object)),
            namespace: object.meta().namespace.clone(),
            labels: target.and_then(|t| t.labels.clone()),
            annotations: target.and_then(|t| t.annotations.clone()),
            owner_references: object.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        data: Some(
            secret_data(object, details)
                .into_iter()
                .map(|(k, v)| (k, ByteString(v.into_bytes())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Write `details` to the object's connection secret.
///
/// No-op when `details` is empty or the object opted out.
pub async fn publish_secret_details<K: ManagedResource>(
    secrets: &dyn ObjectApi<Secret>,
    object: &K,
    details: &BTreeMap<String, String>,
    attempts: u32,
) -> Result<(), ControllerError> {
    if details.is_empty() || object.conn_info_secret_target_disabled() {
        return Ok(());
    }
    let desired = desired_secret(object, details);
    let namespace = desired.metadata.namespace.clone().unwrap_or_default();
    retry_on_conflict(attempts, || create_or_merge(secrets, &namespace, &desired))
        .await
        .map_err(|e| {
            ControllerError::SecretSync(format!(
                "{}/{}: {}",
                namespace,
                desired.metadata.name.as_deref().unwrap_or_default(),
                e
            ))
        })
}

async fn create_or_merge(
    secrets: &dyn ObjectApi<Secret>,
    namespace: &str,
    desired: &Secret,
) -> Result<(), ControllerError> {
    let name = desired.metadata.name.clone().unwrap_or_default();
    let Some(existing) = secrets.get(namespace, &name).await? else {
        secrets.create(namespace, desired).await?;
        debug!("Created connection secret {}/{}", namespace, name);
        return Ok(());
    };

    let mut merged = existing.clone();
    merge_map(&mut merged.data, desired.data.as_ref());
    merge_map(&mut merged.metadata.labels, desired.metadata.labels.as_ref());
    merge_map(&mut merged.metadata.annotations, desired.metadata.annotations.as_ref());
    for owner in desired.metadata.owner_references.iter().flatten() {
        let owners = merged.metadata.owner_references.get_or_insert_with(Vec::new);
        if !owners.iter().any(|o| o.uid == owner.uid) {
            owners.push(owner.clone());
        }
    }
    if merged == existing {
        return Ok(());
    }
    secrets.replace(namespace, &name, &merged).await?;
    debug!("Updated connection secret {}/{}", namespace, name);
    Ok(())
}

fn merge_map<V: Clone>(target: &mut Option<BTreeMap<String, V>>, source: Option<&BTreeMap<String, V>>) {
    if let Some(source) = source {
        let target = target.get_or_insert_with(BTreeMap::new);
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
}
