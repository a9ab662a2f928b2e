//! ProjectVpc Custom Resource Definition
//!
//! Defines a Kubernetes CRD for managing Aiven project VPCs.

use crate::common::{AuthSecretReference, Condition};
use crate::managed::ManagedResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ProjectVpcSpec defines the desired state of an Aiven project VPC
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "aiven.microscaler.io",
    version = "v1alpha1",
    kind = "ProjectVpc",
    namespaced,
    status = "ProjectVpcStatus",
    printcolumn = r#"{"name":"Cloud","type":"string","jsonPath":".spec.cloudName"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectVpcSpec {
    /// Aiven project the VPC belongs to
    pub project: String,

    /// Cloud the VPC is created in (e.g., "aws-eu-west-1")
    pub cloud_name: String,

    /// IPv4 network range CIDR
    pub network_cidr: String,

    /// Secret holding the Aiven API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret_ref: Option<AuthSecretReference>,
}

/// ProjectVpcStatus defines the observed state of a project VPC
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectVpcStatus {
    /// Remote VPC id, set after creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Remote state (APPROVED, ACTIVE, DELETING, DELETED)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Status conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ManagedResource for ProjectVpc {
    const SECRET_PREFIX: &'static str = "PROJECTVPC_";

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
