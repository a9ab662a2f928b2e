//! PostgreSql Custom Resource Definition
//!
//! Defines a Kubernetes CRD for managing Aiven for PostgreSQL services.

use crate::common::{
    AuthSecretReference, Condition, ConnInfoSecretSource, ConnInfoSecretTarget,
};
use crate::managed::ManagedResource;
use crate::references::ResourceReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// PostgreSqlSpec defines the desired state of a PostgreSQL service
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "aiven.microscaler.io",
    version = "v1alpha1",
    kind = "PostgreSql",
    namespaced,
    status = "PostgreSqlStatus",
    shortname = "pg",
    printcolumn = r#"{"name":"Project","type":"string","jsonPath":".spec.project"}"#,
    printcolumn = r#"{"name":"Plan","type":"string","jsonPath":".spec.plan"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgreSqlSpec {
    /// Aiven project the service belongs to
    pub project: String,

    /// Subscription plan (e.g., "startup-4")
    pub plan: String,

    /// Cloud the service runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_name: Option<String>,

    /// Reference to a ProjectVpc the service is placed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_vpc_ref: Option<ResourceReference>,

    /// Prevent the service from being deleted remotely
    #[serde(default)]
    pub termination_protection: bool,

    /// Secret holding the Aiven API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret_ref: Option<AuthSecretReference>,

    /// Where connection details are published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_info_secret_target: Option<ConnInfoSecretTarget>,

    /// Do not publish connection details
    #[serde(default)]
    pub conn_info_secret_target_disabled: bool,

    /// Secret the admin password is read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_info_secret_source: Option<ConnInfoSecretSource>,

    /// Free-form PostgreSQL user configuration passed through to Aiven
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_config: Option<BTreeMap<String, serde_json::Value>>,
}

/// PostgreSqlStatus defines the observed state of a PostgreSQL service
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostgreSqlStatus {
    /// Remote service state (REBUILDING, RUNNING, POWEROFF, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Status conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ManagedResource for PostgreSql {
    const SECRET_PREFIX: &'static str = "POSTGRESQL_";
    const LEGACY_SECRET_KEYS: bool = true;

    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }

    fn auth_secret_ref(&self) -> Option<&AuthSecretReference> {
        self.spec.auth_secret_ref.as_ref()
    }

    fn references(&self) -> Vec<ResourceReference> {
        self.spec.project_vpc_ref.iter().cloned().collect()
    }

    fn conn_info_secret_target(&self) -> Option<&ConnInfoSecretTarget> {
        self.spec.conn_info_secret_target.as_ref()
    }

    fn conn_info_secret_target_disabled(&self) -> bool {
        self.spec.conn_info_secret_target_disabled
    }

    fn conn_info_secret_source(&self) -> Option<&ConnInfoSecretSource> {
        self.spec.conn_info_secret_source.as_ref()
    }
}
