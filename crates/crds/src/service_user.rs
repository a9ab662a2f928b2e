//! ServiceUser Custom Resource Definition
//!
//! A user of an Aiven service; its credentials are published as a secret.

use crate::common::{AuthSecretReference, Condition, ConnInfoSecretTarget};
use crate::managed::ManagedResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ServiceUserSpec defines the desired state of a service user
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "aiven.microscaler.io",
    version = "v1alpha1",
    kind = "ServiceUser",
    namespaced,
    status = "ServiceUserStatus",
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.serviceName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUserSpec {
    /// Aiven project
    pub project: String,

    /// Name of the service the user belongs to
    pub service_name: String,

    /// Authentication plugin (e.g., "caching_sha2_password" for MySQL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,

    /// Secret holding the Aiven API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret_ref: Option<AuthSecretReference>,

    /// Where credentials are published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_info_secret_target: Option<ConnInfoSecretTarget>,

    /// Do not publish credentials
    #[serde(default)]
    pub conn_info_secret_target_disabled: bool,
}

/// ServiceUserStatus defines the observed state of a service user
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUserStatus {
    /// User type reported by Aiven (primary, normal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,

    /// Status conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ManagedResource for ServiceUser {
    const SECRET_PREFIX: &'static str = "SERVICEUSER_";

    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }

    fn auth_secret_ref(&self) -> Option<&AuthSecretReference> {
        self.spec.auth_secret_ref.as_ref()
    }

    fn conn_info_secret_target(&self) -> Option<&ConnInfoSecretTarget> {
        self.spec.conn_info_secret_target.as_ref()
    }

    fn conn_info_secret_target_disabled(&self) -> bool {
        self.spec.conn_info_secret_target_disabled
    }
}
