//! Kubernetes watches.
//!
//! Each managed kind runs its own `kube_runtime::Controller` with the
//! configured debounce and concurrency, so reconciles of one key are
//! serialized while different objects proceed in parallel. The secret GC
//! runs as a controller over secrets re-triggered by managed-object events;
//! the secret-source watch consumes the raw secret event stream.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::secret_gc::SecretGc;
use crate::secret_watch::SecretWatch;
use crds::ManagedResource;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, Resource};
use kube::core::NamespaceResourceScope;
use kube_runtime::reflector::{Lookup, ObjectRef, Store};
use kube_runtime::{
    Controller, WatchStreamExt,
    controller::{Action, Config as RuntimeConfig},
    watcher,
};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// `Api` over the watched namespace, or every namespace.
pub fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn runtime_config(config: &ControllerConfig) -> RuntimeConfig {
    RuntimeConfig::default()
        .debounce(config.debounce)
        .concurrency(config.max_concurrent_reconciles)
}

async fn reconcile_kind<K: ManagedResource>(
    object: Arc<K>,
    reconciler: Arc<Reconciler<K>>,
) -> Result<Action, ControllerError> {
    reconciler.reconcile_object(&object).await
}

fn kind_error_policy<K: ManagedResource>(
    object: Arc<K>,
    err: &ControllerError,
    reconciler: Arc<Reconciler<K>>,
) -> Action {
    reconciler.error_action(&object, err)
}

/// Signal `started` once the controller's cache holds the initial listing.
async fn report_synced<K>(store: Store<K>, started: oneshot::Sender<()>, what: String)
where
    K: Lookup + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    if store.wait_until_ready().await.is_ok() {
        info!("{} watcher synced", what);
        let _ = started.send(());
    }
}

/// Drive one managed kind until shutdown. `started` fires after the initial sync.
pub async fn watch_kind<K: ManagedResource>(
    api: Api<K>,
    reconciler: Arc<Reconciler<K>>,
    config: &ControllerConfig,
    started: oneshot::Sender<()>,
) -> Result<(), ControllerError> {
    let kind = K::kind(&()).into_owned();
    info!("Starting {} watcher", kind);
    let controller = Controller::new(api, watcher::Config::default())
        .with_config(runtime_config(config))
        .shutdown_on_signal();
    let synced = report_synced(controller.store(), started, kind.clone());
    let drive = controller
        .run(reconcile_kind::<K>, kind_error_policy::<K>, reconciler)
        .for_each(|result| {
            let kind = kind.clone();
            async move {
                match result {
                    Ok((object, _)) => debug!("Reconciled {} {}", kind, object),
                    Err(e) => warn!("{} controller error: {}", kind, e),
                }
            }
        });
    tokio::join!(synced, drive);
    info!("{} watcher stopped", kind);
    Ok(())
}

/// Auth secret a managed object depends on, as a GC trigger.
pub fn auth_secret_of<K: ManagedResource>(object: K) -> Option<ObjectRef<Secret>> {
    let namespace = object.meta().namespace.clone()?;
    let auth = object.auth_secret_ref()?;
    Some(ObjectRef::new(&auth.name).within(&namespace))
}

async fn reconcile_secret(secret: Arc<Secret>, gc: Arc<SecretGc>) -> Result<Action, ControllerError> {
    let namespace = secret.meta().namespace.clone().unwrap_or_default();
    let name = secret.meta().name.clone().unwrap_or_default();
    gc.reconcile(&namespace, &name).await
}

/// Run the secret GC controller until shutdown. `controller` already carries
/// one `.watches` per managed kind.
pub async fn watch_secret_gc(
    controller: Controller<Secret>,
    gc: Arc<SecretGc>,
    config: &ControllerConfig,
    started: oneshot::Sender<()>,
) -> Result<(), ControllerError> {
    info!("Starting auth secret GC watcher");
    let retry_after = config.requeue_timeout;
    let controller = controller.with_config(runtime_config(config)).shutdown_on_signal();
    let synced = report_synced(controller.store(), started, "Auth secret GC".to_string());
    let drive = controller
        .run(
            reconcile_secret,
            move |secret: Arc<Secret>, err: &ControllerError, _gc: Arc<SecretGc>| {
                warn!(
                    "Secret GC failed for {}/{}: {}",
                    secret.meta().namespace.as_deref().unwrap_or_default(),
                    secret.meta().name.as_deref().unwrap_or_default(),
                    err
                );
                Action::requeue(retry_after)
            },
            gc,
        )
        .for_each(|result| async move {
            if let Err(e) = result {
                debug!("Secret GC controller error: {}", e);
            }
        });
    tokio::join!(synced, drive);
    info!("Auth secret GC watcher stopped");
    Ok(())
}

/// Feed every secret event to the source watch. Returns when the stream ends.
/// `started` fires once the initial listing has been seen.
pub async fn watch_secret_sources(
    api: Api<Secret>,
    watch: Arc<SecretWatch>,
    started: oneshot::Sender<()>,
) -> Result<(), ControllerError> {
    info!("Starting connInfoSecretSource watcher");
    let mut started = Some(started);
    let mut events = watcher(api, watcher::Config::default()).default_backoff().boxed();
    while let Some(event) = events.next().await {
        match event {
            Ok(watcher::Event::InitDone) => {
                if let Some(started) = started.take() {
                    info!("connInfoSecretSource watcher synced");
                    let _ = started.send(());
                }
            }
            Ok(watcher::Event::Apply(secret) | watcher::Event::InitApply(secret)) => {
                if let Err(e) = watch.on_secret(&secret).await {
                    warn!("Failed to propagate change of secret {}: {}", secret.meta().name.as_deref().unwrap_or_default(), e);
                }
            }
            Ok(watcher::Event::Delete(secret)) => watch.forget(&secret),
            Ok(_) => {}
            Err(e) => warn!("Secret watch error: {}", e),
        }
    }
    Err(ControllerError::Watch("secret event stream ended".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_auth_secret_of() {
        let pg = create_test_postgresql("pg");
        let reference = auth_secret_of(pg).unwrap();
        assert_eq!(reference.name, "aiven-token");
        assert_eq!(reference.namespace.as_deref(), Some(NAMESPACE));
    }

    #[test]
    fn test_auth_secret_of_without_ref() {
        let mut pg = create_test_postgresql("pg");
        pg.spec.auth_secret_ref = None;
        assert!(auth_secret_of(pg).is_none());
    }
}
