//! Aiven API client
//!
//! Implements [`AivenClientTrait`] over the Aiven REST API (`/v1/project/...`).

use crate::aiven_trait::AivenClientTrait;
use crate::common::{HttpClient, segment};
use crate::error::AivenError;
use crate::models::*;
use reqwest::Client;
use std::time::Duration;

/// Aiven API client
#[derive(Debug, Clone)]
pub struct AivenClient {
    http: HttpClient,
}

impl AivenClient {
    /// Create a new Aiven client
    ///
    /// # Arguments
    /// * `base_url` - Aiven API base URL (e.g., "https://api.aiven.io")
    /// * `token` - API token for authentication
    /// * `timeout` - per-request timeout
    pub fn new(base_url: String, token: String, timeout: Duration) -> Result<Self, AivenError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aiven-operator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token),
        })
    }

    fn service_path(project: &str, service: &str) -> String {
        format!("/v1/project/{}/service/{}", segment(project), segment(service))
    }
}

#[async_trait::async_trait]
impl AivenClientTrait for AivenClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn get_service(&self, project: &str, service: &str) -> Result<Service, AivenError> {
        let envelope: ServiceEnvelope = self.http.get(&Self::service_path(project, service)).await?;
        Ok(envelope.service)
    }

    async fn create_service(&self, project: &str, request: &CreateServiceRequest) -> Result<Service, AivenError> {
        let path = format!("/v1/project/{}/service", segment(project));
        let envelope: ServiceEnvelope = self.http.post(&path, request).await?;
        Ok(envelope.service)
    }

    async fn update_service(&self, project: &str, service: &str, request: &UpdateServiceRequest) -> Result<Service, AivenError> {
        let envelope: ServiceEnvelope = self.http.put(&Self::service_path(project, service), request).await?;
        Ok(envelope.service)
    }

    async fn delete_service(&self, project: &str, service: &str) -> Result<(), AivenError> {
        self.http.delete(&Self::service_path(project, service)).await
    }

    async fn list_databases(&self, project: &str, service: &str) -> Result<Vec<Database>, AivenError> {
        let path = format!("{}/db", Self::service_path(project, service));
        let envelope: DatabaseListEnvelope = self.http.get(&path).await?;
        Ok(envelope.databases)
    }

    async fn create_database(&self, project: &str, service: &str, request: &CreateDatabaseRequest) -> Result<(), AivenError> {
        let path = format!("{}/db", Self::service_path(project, service));
        let _: serde_json::Value = self.http.post(&path, request).await?;
        Ok(())
    }

    async fn delete_database(&self, project: &str, service: &str, database: &str) -> Result<(), AivenError> {
        let path = format!("{}/db/{}", Self::service_path(project, service), segment(database));
        self.http.delete(&path).await
    }

    async fn get_service_user(&self, project: &str, service: &str, username: &str) -> Result<ServiceUser, AivenError> {
        let path = format!("{}/user/{}", Self::service_path(project, service), segment(username));
        let envelope: ServiceUserEnvelope = self.http.get(&path).await?;
        Ok(envelope.user)
    }

    async fn create_service_user(&self, project: &str, service: &str, request: &CreateServiceUserRequest) -> Result<ServiceUser, AivenError> {
        let path = format!("{}/user", Self::service_path(project, service));
        let envelope: ServiceUserEnvelope = self.http.post(&path, request).await?;
        Ok(envelope.user)
    }

    async fn reset_service_user_password(&self, project: &str, service: &str, username: &str, password: &str) -> Result<(), AivenError> {
        let path = format!("{}/user/{}", Self::service_path(project, service), segment(username));
        let body = serde_json::json!({
            "operation": "reset-credentials",
            "new_password": password,
        });
        let _: serde_json::Value = self.http.put(&path, &body).await?;
        Ok(())
    }

    async fn delete_service_user(&self, project: &str, service: &str, username: &str) -> Result<(), AivenError> {
        let path = format!("{}/user/{}", Self::service_path(project, service), segment(username));
        self.http.delete(&path).await
    }

    async fn get_project_vpc(&self, project: &str, vpc_id: &str) -> Result<ProjectVpc, AivenError> {
        let path = format!("/v1/project/{}/vpcs/{}", segment(project), segment(vpc_id));
        self.http.get(&path).await
    }

    async fn create_project_vpc(&self, project: &str, request: &CreateProjectVpcRequest) -> Result<ProjectVpc, AivenError> {
        let path = format!("/v1/project/{}/vpcs", segment(project));
        self.http.post(&path, request).await
    }

    async fn delete_project_vpc(&self, project: &str, vpc_id: &str) -> Result<(), AivenError> {
        let path = format!("/v1/project/{}/vpcs/{}", segment(project), segment(vpc_id));
        self.http.delete(&path).await
    }
}
