//! Database Custom Resource Definition
//!
//! A logical database inside an Aiven PostgreSQL service.

use crate::common::{AuthSecretReference, Condition};
use crate::managed::ManagedResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// DatabaseSpec defines the desired state of a database
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "aiven.microscaler.io",
    version = "v1alpha1",
    kind = "Database",
    namespaced,
    status = "DatabaseStatus",
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.serviceName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Aiven project
    pub project: String,

    /// Name of the service the database lives in
    pub service_name: String,

    /// Database name, defaults to the object name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,

    /// Default string sort order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lc_collate: Option<String>,

    /// Default character classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lc_ctype: Option<String>,

    /// Secret holding the Aiven API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret_ref: Option<AuthSecretReference>,
}

/// DatabaseStatus defines the observed state of a database
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    /// Status conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ManagedResource for Database {
    const SECRET_PREFIX: &'static str = "DATABASE_";

    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }

    fn auth_secret_ref(&self) -> Option<&AuthSecretReference> {
        self.spec.auth_secret_ref.as_ref()
    }
}
