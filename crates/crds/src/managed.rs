//! The accessor surface every managed kind exposes to the controller.

use crate::common::{AuthSecretReference, Condition, ConnInfoSecretSource, ConnInfoSecretTarget};
use crate::references::ResourceReference;
use kube::Resource;
use kube::core::NamespaceResourceScope;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A namespaced custom resource backed by a remote Aiven resource.
///
/// Implemented once per kind. The generic reconciler, the status committer
/// and the secret controllers only ever see objects through this trait.
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Prefix applied to connection secret keys when the target sets none.
    const SECRET_PREFIX: &'static str;

    /// Also publish the unprefixed keys alongside the prefixed ones.
    const LEGACY_SECRET_KEYS: bool = false;

    /// Current status conditions.
    fn conditions(&self) -> &[Condition];

    /// Mutable conditions, creating an empty status if needed.
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    /// Secret holding the API token, if any.
    fn auth_secret_ref(&self) -> Option<&AuthSecretReference>;

    /// Same-namespace objects that must be ready before this one is acted on.
    fn references(&self) -> Vec<ResourceReference> {
        Vec::new()
    }

    /// Where connection details are published.
    fn conn_info_secret_target(&self) -> Option<&ConnInfoSecretTarget> {
        None
    }

    /// Opt-out of connection secret publication.
    fn conn_info_secret_target_disabled(&self) -> bool {
        false
    }

    /// Externally supplied password secret.
    fn conn_info_secret_source(&self) -> Option<&ConnInfoSecretSource> {
        None
    }
}
