//! Status types shared by every managed kind.
//!
//! Conditions follow the Kubernetes convention: one entry per `type`, with the
//! transition time only moving when the status flips.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set once the remote resource has been created or updated.
pub const CONDITION_INITIALIZED: &str = "Initialized";

/// Condition type reflecting whether the remote resource is operational.
pub const CONDITION_RUNNING: &str = "Running";

/// Condition type describing the last observed obstruction.
pub const CONDITION_ERROR: &str = "Error";

/// Tri-state condition status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// Not yet determined
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// Maps a boolean onto `True`/`False`.
    pub fn from_bool(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// A typed, timestamped status flag.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (`Initialized`, `Running`, `Error`)
    #[serde(rename = "type")]
    pub type_: String,

    /// Condition status
    pub status: ConditionStatus,

    /// Machine-readable reason in CamelCase
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status changed
    pub last_transition_time: DateTime<Utc>,

    /// Generation observed when the condition was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Creates a condition stamped with the current time.
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
            observed_generation: None,
        }
    }

    /// Whether this condition has status `True`.
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Returns the condition of the given type, if present.
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Whether the condition of the given type is present with status `True`.
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(Condition::is_true)
}

/// Secret holding the API token a managed object authenticates with.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthSecretReference {
    /// Secret name (same namespace as the referencing object)
    pub name: String,

    /// Key within the secret data holding the token
    pub key: String,
}

/// Where connection details are published.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnInfoSecretTarget {
    /// Secret name, defaults to the object name
    #[serde(default)]
    pub name: String,

    /// Key prefix, defaults to the kind-specific prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Extra annotations to put on the secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<std::collections::BTreeMap<String, String>>,

    /// Extra labels to put on the secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<std::collections::BTreeMap<String, String>>,
}

/// An externally supplied secret the password is read from.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnInfoSecretSource {
    /// Secret name
    pub name: String,

    /// Secret namespace, defaults to the referencing object's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Key within the secret holding the password
    pub password_key: String,
}

impl ConnInfoSecretSource {
    /// Namespace the source secret lives in, given the referencing object's namespace.
    pub fn namespace_or<'a>(&'a self, object_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(object_namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_status_serializes_pascal_case() {
        let json = serde_json::to_string(&ConditionStatus::True).unwrap();
        assert_eq!(json, "\"True\"");
        let parsed: ConditionStatus = serde_json::from_str("\"Unknown\"").unwrap();
        assert_eq!(parsed, ConditionStatus::Unknown);
    }

    #[test]
    fn test_condition_type_field_renamed() {
        let condition = Condition::new(CONDITION_RUNNING, ConditionStatus::True, "CheckRunning", "ok");
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(value["type"], "Running");
        assert!(value.get("lastTransitionTime").is_some());
        assert!(value.get("observedGeneration").is_none());
    }

    #[test]
    fn test_is_condition_true() {
        let conditions = vec![
            Condition::new(CONDITION_INITIALIZED, ConditionStatus::True, "Created", ""),
            Condition::new(CONDITION_RUNNING, ConditionStatus::False, "CheckRunning", ""),
        ];
        assert!(is_condition_true(&conditions, CONDITION_INITIALIZED));
        assert!(!is_condition_true(&conditions, CONDITION_RUNNING));
        assert!(!is_condition_true(&conditions, CONDITION_ERROR));
    }

    #[test]
    fn test_conn_info_source_namespace_defaults_to_object() {
        let source = ConnInfoSecretSource {
            name: "pg-password".to_string(),
            namespace: None,
            password_key: "PASSWORD".to_string(),
        };
        assert_eq!(source.namespace_or("team-a"), "team-a");
    }
}
