//! Test utilities: an in-memory object store with `resourceVersion`
//! optimistic concurrency, a recording event publisher, object builders and a
//! fully wired reconciler over the mock Aiven client.

use crate::client::ClientFactory;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::EventPublisher;
use crate::handler::HandlerBuilder;
use crate::k8s::ObjectApi;
use crate::metrics::Metrics;
use crate::reconciler::{Context, Reconciler};
use crate::registry::KindRegistry;
use aiven_client::{AivenClientTrait, AivenError, MockAivenClient};
use async_trait::async_trait;
use crds::*;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ObjectReference, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kube::runtime::events::EventType;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub const NAMESPACE: &str = "default";
pub const TOKEN: &str = "test-token";

#[derive(Debug)]
struct StoreState<K> {
    objects: BTreeMap<(String, String), K>,
    next_version: u64,
    injected_conflicts: HashMap<String, u32>,
    injected_failures: HashMap<(String, String), Vec<ControllerError>>,
    calls: Vec<String>,
}

/// In-memory [`ObjectApi`] behaving like the API server for one kind.
#[derive(Debug)]
pub struct InMemoryApi<K> {
    state: Mutex<StoreState<K>>,
}

impl<K> Default for InMemoryApi<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(StoreState {
                objects: BTreeMap::new(),
                next_version: 1,
                injected_conflicts: HashMap::new(),
                injected_failures: HashMap::new(),
                calls: Vec::new(),
            }),
        }
    }
}

impl<K> InMemoryApi<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, StoreState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object, assigning uid, generation and resourceVersion when unset.
    pub fn insert(&self, mut object: K) {
        let mut state = self.state();
        let meta = object.meta_mut();
        let key = (
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        );
        meta.uid.get_or_insert_with(|| format!("uid-{}", key.1));
        meta.generation.get_or_insert(1);
        meta.resource_version = Some(state.next_version.to_string());
        state.next_version += 1;
        state.objects.insert(key, object);
    }

    /// Current stored copy.
    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.state()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Make the next `count` calls of `operation` fail with a conflict.
    pub fn inject_conflicts(&self, operation: &str, count: u32) {
        self.state()
            .injected_conflicts
            .insert(operation.to_string(), count);
    }

    /// Make the next `operation` on object `name` fail with `err`.
    pub fn inject_failure(&self, operation: &str, name: &str, err: ControllerError) {
        self.state()
            .injected_failures
            .entry((operation.to_string(), name.to_string()))
            .or_default()
            .insert(0, err);
    }

    /// Number of create/replace/replace_status/patch_merge calls.
    pub fn write_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| *c != "get" && *c != "list")
            .count()
    }

    /// Number of calls of one operation.
    pub fn call_count(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == operation).count()
    }

    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, StoreState<K>>, ControllerError> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        if let Some(remaining) = state.injected_conflicts.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ControllerError::Conflict(format!("injected {operation} conflict")));
            }
        }
        Ok(state)
    }

    fn enter_object(&self, operation: &str, name: &str) -> Result<MutexGuard<'_, StoreState<K>>, ControllerError> {
        let mut state = self.enter(operation)?;
        let key = (operation.to_string(), name.to_string());
        if let Some(err) = state.injected_failures.get_mut(&key).and_then(Vec::pop) {
            return Err(err);
        }
        Ok(state)
    }
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(fields) = target {
        for (key, value) in patch_fields {
            if value.is_null() {
                fields.remove(key);
            } else {
                merge_patch(fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Apply a JSON write to the stored object the way the API server would:
/// reject stale versions, bump resourceVersion and generation, and drop the
/// object once it is being deleted with no finalizers left.
fn store_write<K>(
    state: &mut StoreState<K>,
    namespace: &str,
    name: &str,
    expected_version: Option<String>,
    apply: impl FnOnce(&mut Value),
) -> Result<K, ControllerError>
where
    K: Resource + Clone + Serialize + DeserializeOwned,
{
    let key = (namespace.to_string(), name.to_string());
    let stored = state
        .objects
        .get(&key)
        .ok_or_else(|| ControllerError::ObjectNotFound(format!("{namespace}/{name}")))?;
    if let Some(expected) = expected_version {
        if stored.meta().resource_version.as_deref() != Some(expected.as_str()) {
            return Err(ControllerError::Conflict(format!("{namespace}/{name}: stale resourceVersion")));
        }
    }
    let before = serde_json::to_value(stored)?;
    let mut value = before.clone();
    apply(&mut value);
    let mut updated: K = serde_json::from_value(value)?;
    let after = serde_json::to_value(&updated)?;
    let meta = updated.meta_mut();
    meta.resource_version = Some(state.next_version.to_string());
    state.next_version += 1;
    if before.get("spec") != after.get("spec") {
        meta.generation = Some(meta.generation.unwrap_or(1) + 1);
    }
    let finished = meta.deletion_timestamp.is_some()
        && meta.finalizers.as_ref().is_none_or(Vec::is_empty);
    if finished {
        state.objects.remove(&key);
    } else {
        state.objects.insert(key, updated.clone());
    }
    Ok(updated)
}

#[async_trait]
impl<K> ObjectApi<K> for InMemoryApi<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ControllerError> {
        let state = self.enter("get")?;
        Ok(state
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>, ControllerError> {
        let state = self.enter("list")?;
        Ok(state
            .objects
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns.as_str()))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, ControllerError> {
        let mut state = self.enter("create")?;
        let name = object.meta().name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(ControllerError::Conflict(format!("{namespace}/{name} already exists")));
        }
        let mut created = object.clone();
        let meta = created.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.uid.get_or_insert_with(|| format!("uid-{name}"));
        meta.generation = Some(1);
        meta.resource_version = Some(state.next_version.to_string());
        state.next_version += 1;
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, ControllerError> {
        let mut state = self.enter_object("replace", name)?;
        let mut incoming = serde_json::to_value(object)?;
        store_write(
            &mut state,
            namespace,
            name,
            object.meta().resource_version.clone(),
            |stored| {
                // The status subresource is not writable through the main resource.
                let status = stored.get("status").cloned();
                if let Value::Object(fields) = &mut incoming {
                    match status {
                        Some(status) => fields.insert("status".to_string(), status),
                        None => fields.remove("status"),
                    };
                }
                *stored = incoming;
            },
        )
    }

    async fn replace_status(&self, namespace: &str, name: &str, object: &K) -> Result<K, ControllerError> {
        let mut state = self.enter_object("replace_status", name)?;
        let status = serde_json::to_value(object)?
            .get("status")
            .cloned()
            .unwrap_or(Value::Null);
        store_write(
            &mut state,
            namespace,
            name,
            object.meta().resource_version.clone(),
            |stored| {
                if let Value::Object(fields) = stored {
                    fields.insert("status".to_string(), status);
                }
            },
        )
    }

    async fn patch_merge(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, ControllerError> {
        let mut state = self.enter_object("patch_merge", name)?;
        let expected = patch
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            .map(str::to_string);
        store_write(&mut state, namespace, name, expected, |stored| merge_patch(stored, patch))
    }
}

/// One recorded event.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub note: Option<String>,
}

/// Event publisher that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.events().iter().any(|e| e.reason == reason)
    }

    pub fn warnings(&self) -> Vec<RecordedEvent> {
        self.events().into_iter().filter(|e| e.warning).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        object: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent {
                object: object.name.clone().unwrap_or_default(),
                warning: matches!(type_, EventType::Warning),
                reason: reason.to_string(),
                note,
            });
    }
}

fn test_meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        uid: Some(format!("uid-{name}")),
        generation: Some(1),
        ..Default::default()
    }
}

fn auth_ref() -> Option<AuthSecretReference> {
    Some(AuthSecretReference {
        name: "aiven-token".to_string(),
        key: "token".to_string(),
    })
}

/// PostgreSql without status.
pub fn create_test_postgresql(name: &str) -> PostgreSql {
    PostgreSql {
        metadata: test_meta(name),
        spec: PostgreSqlSpec {
            project: "test-project".to_string(),
            plan: "startup-4".to_string(),
            cloud_name: Some("google-europe-west1".to_string()),
            auth_secret_ref: auth_ref(),
            ..Default::default()
        },
        status: None,
    }
}

/// ProjectVpc without status.
pub fn create_test_project_vpc(name: &str) -> ProjectVpc {
    ProjectVpc {
        metadata: test_meta(name),
        spec: ProjectVpcSpec {
            project: "test-project".to_string(),
            cloud_name: "google-europe-west1".to_string(),
            network_cidr: "10.0.0.0/24".to_string(),
            auth_secret_ref: auth_ref(),
        },
        status: None,
    }
}

/// Database on service `pg` without status.
pub fn create_test_database(name: &str) -> crds::Database {
    crds::Database {
        metadata: test_meta(name),
        spec: DatabaseSpec {
            project: "test-project".to_string(),
            service_name: "pg".to_string(),
            auth_secret_ref: auth_ref(),
            ..Default::default()
        },
        status: None,
    }
}

/// ServiceUser on service `pg` without status.
pub fn create_test_service_user(name: &str) -> crds::ServiceUser {
    crds::ServiceUser {
        metadata: test_meta(name),
        spec: ServiceUserSpec {
            project: "test-project".to_string(),
            service_name: "pg".to_string(),
            auth_secret_ref: auth_ref(),
            ..Default::default()
        },
        status: None,
    }
}

/// Opaque secret with string data.
pub fn create_test_secret(name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Decoded secret data.
pub fn secret_string_data(secret: &Secret) -> BTreeMap<String, String> {
    secret
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), String::from_utf8_lossy(&v.0).into_owned()))
        .collect()
}

/// Mark an object as being deleted.
pub fn mark_deleted<K: Resource>(object: &mut K) {
    let timestamp = serde_json::from_value(Value::String("2024-01-01T00:00:00Z".to_string())).unwrap();
    object.meta_mut().deletion_timestamp = Some(timestamp);
}

/// Add an annotation.
pub fn annotate<K: Resource>(object: &mut K, key: &str, value: &str) {
    object
        .meta_mut()
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}

/// Read an annotation.
pub fn annotation<K: Resource>(object: &K, key: &str) -> Option<String> {
    object.meta().annotations.as_ref()?.get(key).cloned()
}

/// Stores, mocks and shared context wired the way `main` wires the real ones.
pub struct TestEnv {
    pub aiven: MockAivenClient,
    pub secrets: Arc<InMemoryApi<Secret>>,
    pub postgresqls: Arc<InMemoryApi<PostgreSql>>,
    pub project_vpcs: Arc<InMemoryApi<ProjectVpc>>,
    pub databases: Arc<InMemoryApi<crds::Database>>,
    pub service_users: Arc<InMemoryApi<crds::ServiceUser>>,
    pub events: Arc<RecordingEventPublisher>,
    pub registry: Arc<KindRegistry>,
    pub context: Arc<Context>,
}

impl TestEnv {
    pub fn new() -> Self {
        let config = ControllerConfig {
            poll_interval: Duration::from_secs(60),
            requeue_timeout: Duration::from_secs(10),
            ..ControllerConfig::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let aiven = MockAivenClient::new("http://mock-aiven");
        let secrets = InMemoryApi::<Secret>::new();
        secrets.insert(create_test_secret("aiven-token", &[("token", TOKEN)]));
        let postgresqls = InMemoryApi::<PostgreSql>::new();
        let project_vpcs = InMemoryApi::<ProjectVpc>::new();
        let databases = InMemoryApi::<crds::Database>::new();
        let service_users = InMemoryApi::<crds::ServiceUser>::new();

        let mut registry = KindRegistry::new();
        registry
            .register::<PostgreSql>(postgresqls.clone())
            .register::<ProjectVpc>(project_vpcs.clone())
            .register::<crds::Database>(databases.clone())
            .register::<crds::ServiceUser>(service_users.clone());
        let registry = Arc::new(registry);

        let mock = aiven.clone();
        let clients = ClientFactory::with_connector(
            config.default_token.clone(),
            secrets.clone(),
            Arc::new(move |_token: &str| {
                Ok::<_, AivenError>(Arc::new(mock.clone()) as Arc<dyn AivenClientTrait>)
            }),
        );
        let events = Arc::new(RecordingEventPublisher::default());
        let context = Arc::new(Context {
            registry: Arc::clone(&registry),
            clients: Arc::new(clients),
            secrets: secrets.clone(),
            events: events.clone(),
            metrics: Arc::new(Metrics::new().unwrap()),
            config,
        });

        Self {
            aiven,
            secrets,
            postgresqls,
            project_vpcs,
            databases,
            service_users,
            events,
            registry,
            context,
        }
    }

    /// Reconciler for one kind over the given store and handler.
    pub fn reconciler<K: ManagedResource>(
        &self,
        api: Arc<InMemoryApi<K>>,
        handlers: HandlerBuilder<K>,
    ) -> Reconciler<K> {
        Reconciler::new(Arc::clone(&self.context), api, handlers)
    }
}
