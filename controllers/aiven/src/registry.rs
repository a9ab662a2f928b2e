//! Static registry of every managed kind.
//!
//! Built once at startup. Reference resolution looks kinds up by name; the
//! secret controllers walk every entry to find objects that depend on a
//! secret.

use crate::error::ControllerError;
use crate::k8s::ObjectApi;
use async_trait::async_trait;
use crds::{Condition, ConnInfoSecretSource, ManagedResource};
use std::sync::Arc;

/// The fields of a managed object the secret controllers index on.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSummary {
    /// Object kind
    pub kind: String,
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
    /// `authSecretRef.name`
    pub auth_secret_name: Option<String>,
    /// `connInfoSecretSource`
    pub conn_info_source: Option<ConnInfoSecretSource>,
}

/// Type-erased access to one managed kind.
#[async_trait]
pub trait KindEntry: Send + Sync {
    /// Kind name as used in references (e.g. "ProjectVpc").
    fn kind(&self) -> &str;

    /// Conditions of `namespace/name`; `None` when the object does not exist.
    async fn conditions(&self, namespace: &str, name: &str) -> Result<Option<Vec<Condition>>, ControllerError>;

    /// Summaries of all objects in a namespace, or cluster-wide with `None`.
    async fn summaries(&self, namespace: Option<&str>) -> Result<Vec<ResourceSummary>, ControllerError>;

    /// Merge-patch annotations (`null` deletes). Unguarded: only the named keys change.
    async fn patch_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ControllerError>;
}

struct TypedKindEntry<K> {
    kind: String,
    api: Arc<dyn ObjectApi<K>>,
}

#[async_trait]
impl<K: ManagedResource> KindEntry for TypedKindEntry<K> {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn conditions(&self, namespace: &str, name: &str) -> Result<Option<Vec<Condition>>, ControllerError> {
        Ok(self
            .api
            .get(namespace, name)
            .await?
            .map(|object| object.conditions().to_vec()))
    }

    async fn summaries(&self, namespace: Option<&str>) -> Result<Vec<ResourceSummary>, ControllerError> {
        let objects = self.api.list(namespace).await?;
        Ok(objects
            .iter()
            .map(|object| ResourceSummary {
                kind: self.kind.clone(),
                namespace: object.meta().namespace.clone().unwrap_or_default(),
                name: object.meta().name.clone().unwrap_or_default(),
                auth_secret_name: object.auth_secret_ref().map(|r| r.name.clone()),
                conn_info_source: object.conn_info_secret_source().cloned(),
            })
            .collect())
    }

    async fn patch_annotations(
        &self,
        namespace: &str,
        name: &str,
        annotations: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ControllerError> {
        let patch = serde_json::json!({ "metadata": { "annotations": annotations } });
        self.api.patch_merge(namespace, name, &patch).await?;
        Ok(())
    }
}

/// Every managed kind the controller knows about.
#[derive(Default)]
pub struct KindRegistry {
    entries: Vec<Arc<dyn KindEntry>>,
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.kind().to_string()))
            .finish()
    }
}

impl KindRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kind backed by `api`.
    pub fn register<K: ManagedResource>(&mut self, api: Arc<dyn ObjectApi<K>>) -> &mut Self {
        self.entries.push(Arc::new(TypedKindEntry {
            kind: K::kind(&()).into_owned(),
            api,
        }));
        self
    }

    /// Entry for `kind`, or `UnknownReferenceKind`.
    pub fn lookup(&self, kind: &str) -> Result<&Arc<dyn KindEntry>, ControllerError> {
        self.entries
            .iter()
            .find(|e| e.kind() == kind)
            .ok_or_else(|| ControllerError::UnknownReferenceKind(kind.to_string()))
    }

    /// All registered kinds.
    pub fn entries(&self) -> &[Arc<dyn KindEntry>] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_lookup_unknown_kind() {
        let env = TestEnv::new();
        let err = env.registry.lookup("KafkaTopic").err().unwrap();
        assert!(matches!(err, ControllerError::UnknownReferenceKind(ref k) if k == "KafkaTopic"));
        assert_eq!(env.registry.lookup("ProjectVpc").unwrap().kind(), "ProjectVpc");
    }

    #[tokio::test]
    async fn test_summaries_and_conditions() {
        let env = TestEnv::new();
        let mut pg = create_test_postgresql("pg");
        pg.spec.conn_info_secret_source = Some(ConnInfoSecretSource {
            name: "pg-password".to_string(),
            namespace: None,
            password_key: "PASSWORD".to_string(),
        });
        env.postgresqls.insert(pg);

        let entry = env.registry.lookup("PostgreSql").unwrap();
        let summaries = entry.summaries(Some(NAMESPACE)).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].auth_secret_name.as_deref(), Some("aiven-token"));
        assert_eq!(summaries[0].conn_info_source.as_ref().unwrap().name, "pg-password");

        assert!(entry.summaries(Some("other")).await.unwrap().is_empty());
        assert_eq!(entry.conditions(NAMESPACE, "pg").await.unwrap(), Some(vec![]));
        assert_eq!(entry.conditions(NAMESPACE, "missing").await.unwrap(), None);
    }
}
