//! Kubernetes object references between managed kinds
//!
//! Follows the Kubernetes `TypedLocalObjectReference` pattern: the referent is
//! identified by kind and name and always lives in the referencing object's
//! namespace.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to another managed object in the same namespace
///
/// The controller will not act on the referencing object until the referent
/// exists and reports a `Running=True` condition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    /// Kind of the referenced resource (e.g., "ProjectVpc", "PostgreSql")
    pub kind: String,

    /// Name of the referenced resource
    pub name: String,
}

impl ResourceReference {
    /// Create a new reference with kind and name
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}
