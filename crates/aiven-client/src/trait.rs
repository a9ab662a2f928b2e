//! AivenClient trait for mocking
//!
//! This trait abstracts the AivenClient so that handlers can be exercised in
//! unit tests against an in-memory implementation.

use crate::error::AivenError;
use crate::models::*;

/// Trait for Aiven API client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait AivenClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    // Services
    async fn get_service(&self, project: &str, service: &str) -> Result<Service, AivenError>;
    async fn create_service(&self, project: &str, request: &CreateServiceRequest) -> Result<Service, AivenError>;
    async fn update_service(&self, project: &str, service: &str, request: &UpdateServiceRequest) -> Result<Service, AivenError>;
    async fn delete_service(&self, project: &str, service: &str) -> Result<(), AivenError>;

    // Databases
    async fn list_databases(&self, project: &str, service: &str) -> Result<Vec<Database>, AivenError>;
    async fn create_database(&self, project: &str, service: &str, request: &CreateDatabaseRequest) -> Result<(), AivenError>;
    async fn delete_database(&self, project: &str, service: &str, database: &str) -> Result<(), AivenError>;

    // Service users
    async fn get_service_user(&self, project: &str, service: &str, username: &str) -> Result<ServiceUser, AivenError>;
    async fn create_service_user(&self, project: &str, service: &str, request: &CreateServiceUserRequest) -> Result<ServiceUser, AivenError>;
    async fn reset_service_user_password(&self, project: &str, service: &str, username: &str, password: &str) -> Result<(), AivenError>;
    async fn delete_service_user(&self, project: &str, service: &str, username: &str) -> Result<(), AivenError>;

    // Project VPCs
    async fn get_project_vpc(&self, project: &str, vpc_id: &str) -> Result<ProjectVpc, AivenError>;
    async fn create_project_vpc(&self, project: &str, request: &CreateProjectVpcRequest) -> Result<ProjectVpc, AivenError>;
    async fn delete_project_vpc(&self, project: &str, vpc_id: &str) -> Result<(), AivenError>;
}
