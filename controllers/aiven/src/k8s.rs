//! Kubernetes access seam.
//!
//! The reconciler, status committer and secret controllers read and write
//! objects only through [`ObjectApi`], so tests can substitute an in-memory
//! store that enforces `resourceVersion` optimistic concurrency.

use crate::error::ControllerError;
use async_trait::async_trait;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use tracing::debug;

/// Typed get/list/create/replace/status/patch over one namespaced kind.
#[async_trait]
pub trait ObjectApi<K: Send + Sync>: Send + Sync {
    /// Fetch an object; `None` when it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ControllerError>;

    /// List objects in one namespace, or cluster-wide with `None`.
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>, ControllerError>;

    /// Create an object.
    async fn create(&self, namespace: &str, object: &K) -> Result<K, ControllerError>;

    /// Replace the whole object; fails with `Conflict` on a stale `resourceVersion`.
    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, ControllerError>;

    /// Write the status subresource; fails with `Conflict` on a stale `resourceVersion`.
    async fn replace_status(&self, namespace: &str, name: &str, object: &K) -> Result<K, ControllerError>;

    /// JSON merge patch of the main resource.
    async fn patch_merge(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, ControllerError>;
}

/// [`ObjectApi`] backed by the API server.
pub struct KubeObjectApi<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeObjectApi<K> {
    /// Creates an accessor sharing the given client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> std::fmt::Debug for KubeObjectApi<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectApi").finish_non_exhaustive()
    }
}

/// Map 409/404 onto the variants the controller branches on.
pub fn map_kube_error(err: kube::Error, what: &str) -> ControllerError {
    match err {
        kube::Error::Api(ref api_err) if api_err.code == 409 => {
            ControllerError::Conflict(format!("{what}: {}", api_err.message))
        }
        kube::Error::Api(ref api_err) if api_err.code == 404 => {
            ControllerError::ObjectNotFound(what.to_string())
        }
        other => ControllerError::Kube(other),
    }
}

#[async_trait]
impl<K> ObjectApi<K> for KubeObjectApi<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ControllerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| map_kube_error(e, &format!("{}/{}", namespace, name)))
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>, ControllerError> {
        let api: Api<K> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, namespace.unwrap_or("all namespaces")))?;
        Ok(list.items)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, ControllerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), object)
            .await
            .map_err(|e| map_kube_error(e, &format!("{}/{}", namespace, object.meta().name.as_deref().unwrap_or_default())))
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, ControllerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), object)
            .await
            .map_err(|e| map_kube_error(e, &format!("{}/{}", namespace, name)))
    }

    async fn replace_status(&self, namespace: &str, name: &str, object: &K) -> Result<K, ControllerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        // resourceVersion in a merge patch is a precondition: stale writes get a 409.
        let value = serde_json::to_value(object)?;
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": object.meta().resource_version },
            "status": value.get("status").cloned().unwrap_or(serde_json::Value::Null),
        });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_error(e, &format!("{}/{} status", namespace, name)))
    }

    async fn patch_merge(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, ControllerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_kube_error(e, &format!("{}/{}", namespace, name)))
    }
}

/// Run `op` until it succeeds or fails with something other than a conflict,
/// at most `attempts` times.
pub async fn retry_on_conflict<T, F, Fut>(attempts: u32, mut op: F) -> Result<T, ControllerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ControllerError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < attempts => {
                debug!("Conflict on attempt {}/{}: {}, retrying", attempt, attempts, e);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Add (`present`) or remove a finalizer on the latest version of an object.
///
/// Returns the written object, or `None` when the object no longer exists.
pub async fn set_finalizer<K>(
    api: &dyn ObjectApi<K>,
    namespace: &str,
    name: &str,
    finalizer: &str,
    present: bool,
    attempts: u32,
) -> Result<Option<K>, ControllerError>
where
    K: Resource + Send + Sync,
{
    retry_on_conflict(attempts, || patch_finalizer(api, namespace, name, finalizer, present)).await
}

async fn patch_finalizer<K>(
    api: &dyn ObjectApi<K>,
    namespace: &str,
    name: &str,
    finalizer: &str,
    present: bool,
) -> Result<Option<K>, ControllerError>
where
    K: Resource + Send + Sync,
{
    let Some(latest) = api.get(namespace, name).await? else {
        return Ok(None);
    };
    let mut finalizers = latest.meta().finalizers.clone().unwrap_or_default();
    if finalizers.iter().any(|f| f == finalizer) == present {
        return Ok(Some(latest));
    }
    if present {
        finalizers.push(finalizer.to_string());
    } else {
        finalizers.retain(|f| f != finalizer);
    }
    // resourceVersion makes the list replacement conditional on what we read.
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": latest.meta().resource_version,
        }
    });
    match api.patch_merge(namespace, name, &patch).await {
        Ok(updated) => Ok(Some(updated)),
        Err(ControllerError::ObjectNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether the object carries `finalizer`.
pub fn has_finalizer<K: Resource>(object: &K, finalizer: &str) -> bool {
    object
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Value of an annotation.
pub fn annotation<'a, K: Resource>(object: &'a K, key: &str) -> Option<&'a str> {
    object.meta().annotations.as_ref()?.get(key).map(String::as_str)
}

/// Upsert an annotation in memory.
pub fn set_annotation<K: Resource>(object: &mut K, key: &str, value: impl Into<String>) {
    object
        .meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.into());
}

/// `namespace/name` of an object, for logs and errors.
pub fn object_key<K: Resource>(object: &K) -> String {
    format!(
        "{}/{}",
        object.meta().namespace.as_deref().unwrap_or_default(),
        object.meta().name.as_deref().unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::PostgreSql;
    use kube::client::Body;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Client whose API server answers every request with a `Status` error.
    fn client_failing_with(code: u16, reason: &'static str) -> Client {
        let service = tower::service_fn(move |_request: http::Request<Body>| async move {
            let status = serde_json::json!({
                "kind": "Status",
                "apiVersion": "v1",
                "status": "Failure",
                "message": format!("{reason} ({code})"),
                "reason": reason,
                "code": code,
            });
            http::Response::builder()
                .status(code)
                .body(Body::from(status.to_string().into_bytes()))
        });
        Client::new(service, "default")
    }

    #[tokio::test]
    async fn test_list_maps_not_found() {
        let api = KubeObjectApi::<PostgreSql>::new(client_failing_with(404, "NotFound"));
        let err = api.list(Some("default")).await.unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
        let err = api.list(None).await.unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
    }

    #[tokio::test]
    async fn test_list_maps_conflict_like_get() {
        let api = KubeObjectApi::<PostgreSql>::new(client_failing_with(409, "Conflict"));
        assert!(api.list(Some("default")).await.unwrap_err().is_conflict());
        assert!(api.get("default", "pg").await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_list_keeps_other_api_errors() {
        let api = KubeObjectApi::<PostgreSql>::new(client_failing_with(500, "InternalError"));
        let err = api.list(None).await.unwrap_err();
        assert!(matches!(err, ControllerError::Kube(kube::Error::Api(ref e)) if e.code == 500), "{err:?}");
    }

    #[tokio::test]
    async fn test_retry_on_conflict_retries_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_on_conflict(3, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ControllerError::Conflict("x".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_on_conflict_is_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_on_conflict(3, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ControllerError::Conflict("x".to_string()))
        })
        .await;
        assert!(result.is_err_and(|e| e.is_conflict()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_on_conflict_does_not_retry_other_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_on_conflict(3, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ControllerError::ObjectNotFound("x".to_string()))
        })
        .await;
        assert!(result.is_err_and(|e| e.is_not_found()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
