//! Mock AivenClient for unit testing
//!
//! Stores resources in memory, records every call, and can be told to fail
//! the next call of a given operation with a specific error.

use crate::aiven_trait::AivenClientTrait;
use crate::error::AivenError;
use crate::models::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockState {
    services: HashMap<(String, String), Service>,
    databases: HashMap<(String, String), Vec<Database>>,
    users: HashMap<(String, String, String), ServiceUser>,
    vpcs: HashMap<(String, String), ProjectVpc>,
    calls: Vec<String>,
    failures: HashMap<String, VecDeque<AivenError>>,
    next_id: u64,
}

/// Mock AivenClient for testing
#[derive(Debug, Clone)]
pub struct MockAivenClient {
    base_url: String,
    state: Arc<Mutex<MockState>>,
}

impl MockAivenClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and pops a queued failure for it, if any.
    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, MockState>, AivenError> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        if let Some(err) = state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state)
    }

    /// Fail the next call of `operation` (e.g. "delete_service") with `error`
    pub fn fail_next(&self, operation: &str, error: AivenError) {
        self.state()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// Every operation invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of times `operation` was invoked
    pub fn call_count(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == operation).count()
    }

    /// Add a service to the mock store (for test setup)
    pub fn add_service(&self, project: &str, service: Service) {
        self.state()
            .services
            .insert((project.to_string(), service.service_name.clone()), service);
    }

    /// Change the state of a stored service (RUNNING, POWEROFF, ...)
    pub fn set_service_state(&self, project: &str, service: &str, new_state: &str) {
        if let Some(s) = self.state().services.get_mut(&(project.to_string(), service.to_string())) {
            s.state = new_state.to_string();
        }
    }

    /// Add a database to the mock store (for test setup)
    pub fn add_database(&self, project: &str, service: &str, database: Database) {
        self.state()
            .databases
            .entry((project.to_string(), service.to_string()))
            .or_default()
            .push(database);
    }

    /// Add a project VPC to the mock store (for test setup)
    pub fn add_project_vpc(&self, project: &str, vpc: ProjectVpc) {
        self.state()
            .vpcs
            .insert((project.to_string(), vpc.project_vpc_id.clone()), vpc);
    }

    /// Stored service user, if any
    pub fn service_user(&self, project: &str, service: &str, username: &str) -> Option<ServiceUser> {
        self.state()
            .users
            .get(&(project.to_string(), service.to_string(), username.to_string()))
            .cloned()
    }

    /// Build a service with connection parameters filled in
    pub fn sample_service(name: &str, state: &str) -> Service {
        let params = [
            ("host", format!("{name}.aivencloud.com")),
            ("port", "12691".to_string()),
            ("user", "avnadmin".to_string()),
            ("password", "s3cr3t".to_string()),
            ("dbname", "defaultdb".to_string()),
            ("sslmode", "require".to_string()),
        ];
        Service {
            service_name: name.to_string(),
            service_type: "pg".to_string(),
            plan: "startup-4".to_string(),
            cloud_name: "google-europe-west1".to_string(),
            state: state.to_string(),
            service_uri: Some(format!(
                "postgres://avnadmin:s3cr3t@{name}.aivencloud.com:12691/defaultdb?sslmode=require"
            )),
            service_uri_params: params.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            project_vpc_id: None,
            termination_protection: false,
        }
    }
}

fn not_found(what: &str) -> AivenError {
    AivenError::NotFound(format!("{what} does not exist"))
}

#[async_trait::async_trait]
impl AivenClientTrait for MockAivenClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_service(&self, project: &str, service: &str) -> Result<Service, AivenError> {
        let state = self.enter("get_service")?;
        state
            .services
            .get(&(project.to_string(), service.to_string()))
            .cloned()
            .ok_or_else(|| not_found("Service"))
    }

    async fn create_service(&self, project: &str, request: &CreateServiceRequest) -> Result<Service, AivenError> {
        let mut state = self.enter("create_service")?;
        let key = (project.to_string(), request.service_name.clone());
        if state.services.contains_key(&key) {
            return Err(AivenError::AlreadyExists(format!("Service {} already exists", request.service_name)));
        }
        let mut service = Self::sample_service(&request.service_name, "REBUILDING");
        service.service_type = request.service_type.clone();
        service.plan = request.plan.clone();
        service.project_vpc_id = request.project_vpc_id.clone();
        service.termination_protection = request.termination_protection;
        if let Some(cloud) = &request.cloud {
            service.cloud_name = cloud.clone();
        }
        state.services.insert(key, service.clone());
        Ok(service)
    }

    async fn update_service(&self, project: &str, service: &str, request: &UpdateServiceRequest) -> Result<Service, AivenError> {
        let mut state = self.enter("update_service")?;
        let stored = state
            .services
            .get_mut(&(project.to_string(), service.to_string()))
            .ok_or_else(|| not_found("Service"))?;
        stored.plan = request.plan.clone();
        stored.termination_protection = request.termination_protection;
        stored.project_vpc_id = request.project_vpc_id.clone();
        if let Some(cloud) = &request.cloud {
            stored.cloud_name = cloud.clone();
        }
        Ok(stored.clone())
    }

    async fn delete_service(&self, project: &str, service: &str) -> Result<(), AivenError> {
        let mut state = self.enter("delete_service")?;
        state
            .services
            .remove(&(project.to_string(), service.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("Service"))
    }

    async fn list_databases(&self, project: &str, service: &str) -> Result<Vec<Database>, AivenError> {
        let state = self.enter("list_databases")?;
        if !state.services.contains_key(&(project.to_string(), service.to_string())) {
            return Err(not_found("Service"));
        }
        Ok(state
            .databases
            .get(&(project.to_string(), service.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_database(&self, project: &str, service: &str, request: &CreateDatabaseRequest) -> Result<(), AivenError> {
        let mut state = self.enter("create_database")?;
        state
            .databases
            .entry((project.to_string(), service.to_string()))
            .or_default()
            .push(Database {
                database_name: request.database.clone(),
                lc_collate: request.lc_collate.clone(),
                lc_ctype: request.lc_ctype.clone(),
            });
        Ok(())
    }

    async fn delete_database(&self, project: &str, service: &str, database: &str) -> Result<(), AivenError> {
        let mut state = self.enter("delete_database")?;
        let dbs = state
            .databases
            .get_mut(&(project.to_string(), service.to_string()))
            .ok_or_else(|| not_found("Database"))?;
        let before = dbs.len();
        dbs.retain(|d| d.database_name != database);
        if dbs.len() == before {
            return Err(not_found("Database"));
        }
        Ok(())
    }

    async fn get_service_user(&self, project: &str, service: &str, username: &str) -> Result<ServiceUser, AivenError> {
        let state = self.enter("get_service_user")?;
        state
            .users
            .get(&(project.to_string(), service.to_string(), username.to_string()))
            .cloned()
            .ok_or_else(|| not_found("Service user"))
    }

    async fn create_service_user(&self, project: &str, service: &str, request: &CreateServiceUserRequest) -> Result<ServiceUser, AivenError> {
        let mut state = self.enter("create_service_user")?;
        state.next_id += 1;
        let user = ServiceUser {
            username: request.username.clone(),
            password: Some(format!("generated-{}", state.next_id)),
            user_type: Some("normal".to_string()),
            authentication: request.authentication.clone(),
        };
        state.users.insert(
            (project.to_string(), service.to_string(), request.username.clone()),
            user.clone(),
        );
        Ok(user)
    }

    async fn reset_service_user_password(&self, project: &str, service: &str, username: &str, password: &str) -> Result<(), AivenError> {
        let mut state = self.enter("reset_service_user_password")?;
        let user = state
            .users
            .entry((project.to_string(), service.to_string(), username.to_string()))
            .or_insert_with(|| ServiceUser {
                username: username.to_string(),
                password: None,
                user_type: Some("primary".to_string()),
                authentication: None,
            });
        user.password = Some(password.to_string());
        Ok(())
    }

    async fn delete_service_user(&self, project: &str, service: &str, username: &str) -> Result<(), AivenError> {
        let mut state = self.enter("delete_service_user")?;
        state
            .users
            .remove(&(project.to_string(), service.to_string(), username.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("Service user"))
    }

    async fn get_project_vpc(&self, project: &str, vpc_id: &str) -> Result<ProjectVpc, AivenError> {
        let state = self.enter("get_project_vpc")?;
        state
            .vpcs
            .get(&(project.to_string(), vpc_id.to_string()))
            .cloned()
            .ok_or_else(|| not_found("Project VPC"))
    }

    async fn create_project_vpc(&self, project: &str, request: &CreateProjectVpcRequest) -> Result<ProjectVpc, AivenError> {
        let mut state = self.enter("create_project_vpc")?;
        state.next_id += 1;
        let vpc = ProjectVpc {
            project_vpc_id: format!("vpc-{}", state.next_id),
            cloud_name: request.cloud_name.clone(),
            network_cidr: request.network_cidr.clone(),
            state: "APPROVED".to_string(),
        };
        state
            .vpcs
            .insert((project.to_string(), vpc.project_vpc_id.clone()), vpc.clone());
        Ok(vpc)
    }

    async fn delete_project_vpc(&self, project: &str, vpc_id: &str) -> Result<(), AivenError> {
        let mut state = self.enter("delete_project_vpc")?;
        state
            .vpcs
            .remove(&(project.to_string(), vpc_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("Project VPC"))
    }
}
