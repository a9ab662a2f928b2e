//! Main controller implementation.
//!
//! Wires the Kubernetes and Aiven clients, the kind registry and the shared
//! reconcile context, then runs one watcher per managed kind plus the two
//! secret controllers and the HTTP server until one of them exits.

use crate::client::ClientFactory;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::KubeEventPublisher;
use crate::handler::{HandlerBuilder, HandlerContext, ResourceHandler};
use crate::handlers::{DatabaseHandler, PostgreSqlHandler, ProjectVpcHandler, ServiceUserHandler};
use crate::k8s::{KubeObjectApi, ObjectApi};
use crate::metrics::Metrics;
use crate::reconciler::{Context, Reconciler};
use crate::registry::KindRegistry;
use crate::secret_gc::SecretGc;
use crate::secret_watch::SecretWatch;
use crate::server::{ServerState, mark_ready, start_server};
use crate::watcher::{auth_secret_of, scoped_api, watch_kind, watch_secret_gc, watch_secret_sources};
use crds::{Database, PostgreSql, ProjectVpc, ServiceUser};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use kube_runtime::{Controller as RuntimeController, watcher};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

type Task = JoinHandle<Result<(), ControllerError>>;

/// Main controller for Aiven resource management.
pub struct Controller {
    project_vpc_watcher: Task,
    postgresql_watcher: Task,
    database_watcher: Task,
    service_user_watcher: Task,
    secret_gc_watcher: Task,
    secret_source_watcher: Task,
    server: JoinHandle<Result<(), anyhow::Error>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

fn spawn_kind<K: crds::ManagedResource>(
    client: &Client,
    api: Arc<dyn ObjectApi<K>>,
    context: &Arc<Context>,
    handlers: HandlerBuilder<K>,
    started: &mut Vec<oneshot::Receiver<()>>,
) -> Task {
    let (synced, synced_rx) = oneshot::channel();
    started.push(synced_rx);
    let reconciler = Arc::new(Reconciler::new(Arc::clone(context), api, handlers));
    let watched = scoped_api::<K>(client.clone(), context.config.watch_namespace.as_deref());
    let config = context.config.clone();
    tokio::spawn(async move { watch_kind(watched, reconciler, &config, synced).await })
}

impl Controller {
    /// Connects to the cluster and starts every watcher.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Aiven Controller");

        let client = Client::try_default().await?;
        let metrics = Arc::new(
            Metrics::new().map_err(|e| ControllerError::InvalidConfig(format!("metrics registry: {e}")))?,
        );

        let secrets: Arc<dyn ObjectApi<Secret>> = Arc::new(KubeObjectApi::<Secret>::new(client.clone()));
        let project_vpcs: Arc<dyn ObjectApi<ProjectVpc>> = Arc::new(KubeObjectApi::new(client.clone()));
        let postgresqls: Arc<dyn ObjectApi<PostgreSql>> = Arc::new(KubeObjectApi::new(client.clone()));
        let databases: Arc<dyn ObjectApi<Database>> = Arc::new(KubeObjectApi::new(client.clone()));
        let service_users: Arc<dyn ObjectApi<ServiceUser>> = Arc::new(KubeObjectApi::new(client.clone()));

        let mut registry = KindRegistry::new();
        registry
            .register(Arc::clone(&project_vpcs))
            .register(Arc::clone(&postgresqls))
            .register(Arc::clone(&databases))
            .register(Arc::clone(&service_users));
        let registry = Arc::new(registry);
        info!("Registered kinds: {:?}", registry);

        let context = Arc::new(Context {
            registry: Arc::clone(&registry),
            clients: Arc::new(ClientFactory::new(&config, Arc::clone(&secrets))),
            secrets: Arc::clone(&secrets),
            events: Arc::new(KubeEventPublisher::new(client.clone(), &config.controller_name)),
            metrics: Arc::clone(&metrics),
            config: config.clone(),
        });

        let mut started = Vec::new();
        let project_vpc_watcher = spawn_kind(
            &client,
            Arc::clone(&project_vpcs),
            &context,
            Arc::new(|ctx: HandlerContext| {
                Box::new(ProjectVpcHandler::new(ctx)) as Box<dyn ResourceHandler<ProjectVpc>>
            }),
            &mut started,
        );
        let vpcs_for_pg = Arc::clone(&project_vpcs);
        let postgresql_watcher = spawn_kind(
            &client,
            Arc::clone(&postgresqls),
            &context,
            Arc::new(move |ctx: HandlerContext| {
                Box::new(PostgreSqlHandler::new(ctx, Arc::clone(&vpcs_for_pg)))
                    as Box<dyn ResourceHandler<PostgreSql>>
            }),
            &mut started,
        );
        let database_watcher = spawn_kind(
            &client,
            Arc::clone(&databases),
            &context,
            Arc::new(|ctx: HandlerContext| {
                Box::new(DatabaseHandler::new(ctx)) as Box<dyn ResourceHandler<Database>>
            }),
            &mut started,
        );
        let service_user_watcher = spawn_kind(
            &client,
            Arc::clone(&service_users),
            &context,
            Arc::new(|ctx: HandlerContext| {
                Box::new(ServiceUserHandler::new(ctx)) as Box<dyn ResourceHandler<ServiceUser>>
            }),
            &mut started,
        );

        let namespace = config.watch_namespace.as_deref();
        let secret_api = scoped_api::<Secret>(client.clone(), namespace);
        let gc_controller = RuntimeController::new(secret_api, watcher::Config::default())
            .watches(scoped_api::<ProjectVpc>(client.clone(), namespace), watcher::Config::default(), auth_secret_of::<ProjectVpc>)
            .watches(scoped_api::<PostgreSql>(client.clone(), namespace), watcher::Config::default(), auth_secret_of::<PostgreSql>)
            .watches(scoped_api::<Database>(client.clone(), namespace), watcher::Config::default(), auth_secret_of::<Database>)
            .watches(scoped_api::<ServiceUser>(client.clone(), namespace), watcher::Config::default(), auth_secret_of::<ServiceUser>);
        let gc = Arc::new(SecretGc::new(
            Arc::clone(&secrets),
            Arc::clone(&registry),
            Arc::clone(&metrics),
            config.conflict_retry_attempts,
        ));
        let gc_config = config.clone();
        let (gc_synced, gc_synced_rx) = oneshot::channel();
        started.push(gc_synced_rx);
        let secret_gc_watcher =
            tokio::spawn(async move { watch_secret_gc(gc_controller, gc, &gc_config, gc_synced).await });

        // Sources may live outside the watched namespace.
        let source_api: Api<Secret> = Api::all(client.clone());
        let source_watch = Arc::new(SecretWatch::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            config.conflict_retry_attempts,
        ));
        let (source_synced, source_synced_rx) = oneshot::channel();
        started.push(source_synced_rx);
        let secret_source_watcher =
            tokio::spawn(async move { watch_secret_sources(source_api, source_watch, source_synced).await });

        let state = Arc::new(ServerState {
            is_ready: AtomicBool::new(false),
            metrics,
        });
        tokio::spawn(mark_ready(Arc::clone(&state), started));
        let server = tokio::spawn(start_server(config.metrics_port, state));

        Ok(Self {
            project_vpc_watcher,
            postgresql_watcher,
            database_watcher,
            service_user_watcher,
            secret_gc_watcher,
            secret_source_watcher,
            server,
        })
    }

    /// Runs until shutdown or until any watcher exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Aiven Controller running");

        tokio::select! {
            result = &mut self.project_vpc_watcher => finished("ProjectVpc", result)?,
            result = &mut self.postgresql_watcher => finished("PostgreSql", result)?,
            result = &mut self.database_watcher => finished("Database", result)?,
            result = &mut self.service_user_watcher => finished("ServiceUser", result)?,
            result = &mut self.secret_gc_watcher => finished("secret GC", result)?,
            result = &mut self.secret_source_watcher => finished("secret source", result)?,
            result = &mut self.server => {
                result
                    .map_err(|e| ControllerError::Watch(format!("HTTP server panicked: {e}")))?
                    .map_err(|e| ControllerError::Watch(format!("HTTP server error: {e}")))?;
            }
        }

        info!("Aiven Controller stopped");
        Ok(())
    }
}

fn finished(
    name: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    match result {
        Ok(Ok(())) => {
            info!("{} watcher exited", name);
            Ok(())
        }
        Ok(Err(e)) => {
            error!("{} watcher failed: {}", name, e);
            Err(e)
        }
        Err(e) => Err(ControllerError::Watch(format!("{name} watcher panicked: {e}"))),
    }
}
