//! Re-triggers reconciles when a `connInfoSecretSource` secret changes.
//!
//! Only data changes count; metadata churn is ignored. Every dependent
//! object gets its processed-generation annotation cleared and a
//! secret-source-updated timestamp stamped, which takes it off the
//! steady-state fast path on its next reconcile. A fan-out that fails for
//! any dependent leaves the previous fingerprint in place so the next
//! delivery of the secret retries it.

use crate::constants::{PROCESSED_GENERATION_ANNOTATION, SECRET_SOURCE_UPDATED_ANNOTATION};
use crate::error::ControllerError;
use crate::k8s::retry_on_conflict;
use crate::metrics::Metrics;
use crate::registry::{KindEntry, KindRegistry, ResourceSummary};
use k8s_openapi::api::core::v1::Secret;
use kube::Resource;
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Tracks secret data fingerprints and fans changes out to dependents.
pub struct SecretWatch {
    registry: Arc<KindRegistry>,
    metrics: Arc<Metrics>,
    fingerprints: Mutex<HashMap<(String, String), u64>>,
    attempts: u32,
}

fn fingerprint(secret: &Secret) -> u64 {
    let mut hasher = DefaultHasher::new();
    if let Some(data) = &secret.data {
        for (key, value) in data {
            key.hash(&mut hasher);
            value.0.hash(&mut hasher);
        }
    }
    if let Some(data) = &secret.string_data {
        data.hash(&mut hasher);
    }
    hasher.finish()
}

fn secret_key(secret: &Secret) -> (String, String) {
    (
        secret.meta().namespace.clone().unwrap_or_default(),
        secret.meta().name.clone().unwrap_or_default(),
    )
}

fn depends_on(summary: &ResourceSummary, namespace: &str, name: &str) -> bool {
    summary
        .conn_info_source
        .as_ref()
        .is_some_and(|source| source.name == name && source.namespace_or(&summary.namespace) == namespace)
}

impl SecretWatch {
    /// Watch over every kind in `registry`; retrigger patches retry conflicts up to `attempts` times.
    pub fn new(registry: Arc<KindRegistry>, metrics: Arc<Metrics>, attempts: u32) -> Self {
        Self {
            registry,
            metrics,
            fingerprints: Mutex::new(HashMap::new()),
            attempts,
        }
    }

    /// Record a secret's data. Returns the previous fingerprint when the data
    /// changed since last seen; the first sighting only records.
    fn record_fingerprint(&self, secret: &Secret) -> Option<u64> {
        let current = fingerprint(secret);
        let mut fingerprints = self.fingerprints.lock().unwrap_or_else(PoisonError::into_inner);
        fingerprints
            .insert(secret_key(secret), current)
            .filter(|previous| *previous != current)
    }

    fn restore_fingerprint(&self, secret: &Secret, previous: u64) {
        self.fingerprints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(secret_key(secret), previous);
    }

    /// Forget a deleted secret.
    pub fn forget(&self, secret: &Secret) {
        self.fingerprints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&secret_key(secret));
    }

    /// Handle an applied secret. Returns how many objects were re-triggered.
    pub async fn on_secret(&self, secret: &Secret) -> Result<usize, ControllerError> {
        let Some(previous) = self.record_fingerprint(secret) else {
            return Ok(0);
        };
        let (namespace, name) = secret_key(secret);
        match self.retrigger_dependents(&namespace, &name).await {
            Ok(triggered) => Ok(triggered),
            Err(e) => {
                self.restore_fingerprint(secret, previous);
                Err(e)
            }
        }
    }

    /// Patch every dependent of `namespace/name`. Keeps going past failures
    /// and returns the first one once all dependents were attempted.
    async fn retrigger_dependents(&self, namespace: &str, name: &str) -> Result<usize, ControllerError> {
        let mut triggered = 0;
        let mut failures = Vec::new();
        for entry in self.registry.entries() {
            // Sources may live in another namespace, so search cluster-wide.
            let summaries = match entry.summaries(None).await {
                Ok(summaries) => summaries,
                Err(e) => {
                    warn!("Failed to list {} dependents of secret {}/{}: {}", entry.kind(), namespace, name, e);
                    failures.push(e);
                    continue;
                }
            };
            for summary in summaries.iter().filter(|s| depends_on(s, namespace, name)) {
                match self.retrigger(entry.as_ref(), summary).await {
                    Ok(()) => {
                        info!(
                            "Secret {}/{} changed, re-triggering {} {}/{}",
                            namespace, name, summary.kind, summary.namespace, summary.name
                        );
                        triggered += 1;
                    }
                    Err(e) if e.is_not_found() => {
                        debug!("{} {}/{} is gone: {}", summary.kind, summary.namespace, summary.name, e);
                    }
                    // The owning reconciler is writing the object right now.
                    Err(e) if e.is_conflict() => {
                        debug!("{} {}/{} is busy: {}", summary.kind, summary.namespace, summary.name, e);
                    }
                    Err(e) => {
                        warn!("Failed to re-trigger {} {}/{}: {}", summary.kind, summary.namespace, summary.name, e);
                        failures.push(e);
                    }
                }
            }
        }
        self.metrics.inc_secret_source_triggers(triggered as u64);
        match failures.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(triggered),
        }
    }

    async fn retrigger(&self, entry: &dyn KindEntry, summary: &ResourceSummary) -> Result<(), ControllerError> {
        let updated_at = chrono::Utc::now().timestamp().to_string();
        retry_on_conflict(self.attempts, || {
            let mut annotations = Map::new();
            annotations.insert(PROCESSED_GENERATION_ANNOTATION.to_string(), Value::Null);
            annotations.insert(
                SECRET_SOURCE_UPDATED_ANNOTATION.to_string(),
                Value::String(updated_at.clone()),
            );
            entry.patch_annotations(&summary.namespace, &summary.name, annotations)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FORCE_RECONCILE_ANNOTATION;
    use crate::test_utils::*;
    use crds::ConnInfoSecretSource;

    fn pg_with_source(name: &str, source_namespace: Option<&str>) -> crds::PostgreSql {
        let mut pg = create_test_postgresql(name);
        pg.spec.conn_info_secret_source = Some(ConnInfoSecretSource {
            name: "pg-password".to_string(),
            namespace: source_namespace.map(str::to_string),
            password_key: "PASSWORD".to_string(),
        });
        annotate(&mut pg, PROCESSED_GENERATION_ANNOTATION, "1");
        annotate(&mut pg, FORCE_RECONCILE_ANNOTATION, "keep");
        pg
    }

    fn secret_watch(env: &TestEnv) -> SecretWatch {
        SecretWatch::new(Arc::clone(&env.registry), Arc::clone(&env.context.metrics), 3)
    }

    fn processed(env: &TestEnv, name: &str) -> Option<String> {
        let pg = env.postgresqls.object(NAMESPACE, name).unwrap();
        annotation(&pg, PROCESSED_GENERATION_ANNOTATION)
    }

    #[tokio::test]
    async fn test_password_change_retriggers_dependents() {
        let env = TestEnv::new();
        env.postgresqls.insert(pg_with_source("pg", None));
        env.postgresqls.insert(create_test_postgresql("unrelated"));
        let watch = secret_watch(&env);

        let original = create_test_secret("pg-password", &[("PASSWORD", "one")]);
        assert_eq!(watch.on_secret(&original).await.unwrap(), 0);
        let changed = create_test_secret("pg-password", &[("PASSWORD", "two")]);
        assert_eq!(watch.on_secret(&changed).await.unwrap(), 1);

        let pg = env.postgresqls.object(NAMESPACE, "pg").unwrap();
        assert_eq!(annotation(&pg, PROCESSED_GENERATION_ANNOTATION), None);
        assert!(annotation(&pg, SECRET_SOURCE_UPDATED_ANNOTATION).is_some());
        assert_eq!(annotation(&pg, FORCE_RECONCILE_ANNOTATION).as_deref(), Some("keep"));
        let unrelated = env.postgresqls.object(NAMESPACE, "unrelated").unwrap();
        assert_eq!(annotation(&unrelated, SECRET_SOURCE_UPDATED_ANNOTATION), None);
    }

    #[tokio::test]
    async fn test_metadata_only_change_is_ignored() {
        let env = TestEnv::new();
        env.postgresqls.insert(pg_with_source("pg", None));
        let watch = secret_watch(&env);

        let secret = create_test_secret("pg-password", &[("PASSWORD", "one")]);
        watch.on_secret(&secret).await.unwrap();
        let mut relabelled = secret.clone();
        relabelled.metadata.labels = Some([("team".to_string(), "db".to_string())].into());

        assert_eq!(watch.on_secret(&relabelled).await.unwrap(), 0);
        assert_eq!(env.postgresqls.call_count("patch_merge"), 0);
    }

    #[tokio::test]
    async fn test_cross_namespace_source() {
        let env = TestEnv::new();
        env.postgresqls.insert(pg_with_source("pg", Some("shared")));
        let watch = secret_watch(&env);

        let mut secret = create_test_secret("pg-password", &[("PASSWORD", "one")]);
        secret.metadata.namespace = Some("shared".to_string());
        watch.on_secret(&secret).await.unwrap();
        let mut changed = create_test_secret("pg-password", &[("PASSWORD", "two")]);
        changed.metadata.namespace = Some("shared".to_string());

        assert_eq!(watch.on_secret(&changed).await.unwrap(), 1);
        // Same name in the object's own namespace is a different secret.
        let local = create_test_secret("pg-password", &[("PASSWORD", "x")]);
        watch.on_secret(&local).await.unwrap();
        let local_changed = create_test_secret("pg-password", &[("PASSWORD", "y")]);
        assert_eq!(watch.on_secret(&local_changed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let env = TestEnv::new();
        env.postgresqls.insert(pg_with_source("pg", None));
        env.postgresqls.inject_conflicts("patch_merge", 1);
        let watch = secret_watch(&env);

        watch
            .on_secret(&create_test_secret("pg-password", &[("PASSWORD", "one")]))
            .await
            .unwrap();
        let triggered = watch
            .on_secret(&create_test_secret("pg-password", &[("PASSWORD", "two")]))
            .await
            .unwrap();
        assert_eq!(triggered, 1);
        assert_eq!(env.postgresqls.call_count("patch_merge"), 2);
        assert_eq!(processed(&env, "pg"), None);
    }

    #[tokio::test]
    async fn test_vanished_dependent_does_not_stop_fan_out() {
        let env = TestEnv::new();
        env.postgresqls.insert(pg_with_source("a", None));
        env.postgresqls.insert(pg_with_source("b", None));
        env.postgresqls.inject_failure(
            "patch_merge",
            "a",
            ControllerError::ObjectNotFound(format!("{NAMESPACE}/a")),
        );
        let watch = secret_watch(&env);

        watch
            .on_secret(&create_test_secret("pg-password", &[("PASSWORD", "one")]))
            .await
            .unwrap();
        let triggered = watch
            .on_secret(&create_test_secret("pg-password", &[("PASSWORD", "two")]))
            .await
            .unwrap();

        assert_eq!(triggered, 1);
        assert_eq!(processed(&env, "b"), None);
    }

    #[tokio::test]
    async fn test_failed_fan_out_is_retried_on_redelivery() {
        let env = TestEnv::new();
        env.postgresqls.insert(pg_with_source("a", None));
        env.postgresqls.insert(pg_with_source("b", None));
        env.postgresqls.inject_failure(
            "patch_merge",
            "a",
            ControllerError::Watch("api server unavailable".to_string()),
        );
        let watch = secret_watch(&env);
        watch
            .on_secret(&create_test_secret("pg-password", &[("PASSWORD", "one")]))
            .await
            .unwrap();
        let changed = create_test_secret("pg-password", &[("PASSWORD", "two")]);

        let err = watch.on_secret(&changed).await.unwrap_err();
        assert!(matches!(err, ControllerError::Watch(_)));
        // The failure on `a` did not keep `b` from being re-triggered.
        assert_eq!(processed(&env, "a").as_deref(), Some("1"));
        assert_eq!(processed(&env, "b"), None);

        // Same data delivered again still counts as a change.
        assert_eq!(watch.on_secret(&changed).await.unwrap(), 2);
        assert_eq!(processed(&env, "a"), None);
        // Fully propagated now.
        assert_eq!(watch.on_secret(&changed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persistent_conflict_is_benign() {
        let env = TestEnv::new();
        env.postgresqls.insert(pg_with_source("a", None));
        env.postgresqls.insert(pg_with_source("b", None));
        let watch = secret_watch(&env);
        watch
            .on_secret(&create_test_secret("pg-password", &[("PASSWORD", "one")]))
            .await
            .unwrap();
        for _ in 0..3 {
            env.postgresqls.inject_failure(
                "patch_merge",
                "a",
                ControllerError::Conflict(format!("{NAMESPACE}/a")),
            );
        }

        let changed = create_test_secret("pg-password", &[("PASSWORD", "two")]);
        assert_eq!(watch.on_secret(&changed).await.unwrap(), 1);
        assert_eq!(processed(&env, "a").as_deref(), Some("1"));
        assert_eq!(processed(&env, "b"), None);
        assert_eq!(env.postgresqls.call_count("patch_merge"), 4);
        assert_eq!(watch.on_secret(&changed).await.unwrap(), 0);
    }
}
