//! Aiven API data models

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Service state reported while the service is operational
pub const SERVICE_STATE_RUNNING: &str = "RUNNING";

/// Service state reported while the service is powered off
pub const SERVICE_STATE_POWEROFF: &str = "POWEROFF";

/// Project VPC state once provisioning finished
pub const VPC_STATE_ACTIVE: &str = "ACTIVE";

/// An Aiven service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub service_name: String,
    pub service_type: String,
    pub plan: String,
    pub cloud_name: String,
    pub state: String,
    #[serde(default)]
    pub service_uri: Option<String>,
    #[serde(default)]
    pub service_uri_params: HashMap<String, String>,
    #[serde(default)]
    pub project_vpc_id: Option<String>,
    #[serde(default)]
    pub termination_protection: bool,
}

impl Service {
    /// Whether the service accepts connections.
    pub fn is_running(&self) -> bool {
        self.state == SERVICE_STATE_RUNNING
    }

    /// Whether the service has been powered off.
    pub fn is_powered_off(&self) -> bool {
        self.state == SERVICE_STATE_POWEROFF
    }

    /// Looks up a connection parameter (host, port, dbname, sslmode, ...).
    pub fn uri_param(&self, key: &str) -> Option<&str> {
        self.service_uri_params.get(key).map(String::as_str)
    }
}

/// Request body for creating a service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateServiceRequest {
    pub service_name: String,
    pub service_type: String,
    pub plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_vpc_id: Option<String>,
    pub termination_protection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_config: Option<serde_json::Value>,
}

/// Request body for updating a service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateServiceRequest {
    pub plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_vpc_id: Option<String>,
    pub termination_protection: bool,
    pub powered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_config: Option<serde_json::Value>,
}

/// A logical database inside a service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Database {
    pub database_name: String,
    #[serde(default)]
    pub lc_collate: Option<String>,
    #[serde(default)]
    pub lc_ctype: Option<String>,
}

/// Request body for creating a database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateDatabaseRequest {
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lc_collate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lc_ctype: Option<String>,
}

/// A service user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceUser {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "type", default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub authentication: Option<String>,
}

/// Request body for creating a service user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateServiceUserRequest {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
}

/// A project VPC
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectVpc {
    pub project_vpc_id: String,
    pub cloud_name: String,
    pub network_cidr: String,
    pub state: String,
}

/// Request body for creating a project VPC
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateProjectVpcRequest {
    pub cloud_name: String,
    pub network_cidr: String,
}

/// `{"service": {...}}` envelope
#[derive(Debug, Deserialize)]
pub(crate) struct ServiceEnvelope {
    pub service: Service,
}

/// `{"databases": [...]}` envelope
#[derive(Debug, Deserialize)]
pub(crate) struct DatabaseListEnvelope {
    #[serde(default)]
    pub databases: Vec<Database>,
}

/// `{"user": {...}}` envelope
#[derive(Debug, Deserialize)]
pub(crate) struct ServiceUserEnvelope {
    pub user: ServiceUser,
}

/// Error body returned by the API
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
