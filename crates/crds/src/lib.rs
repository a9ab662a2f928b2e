//! Aiven operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the managed-service kinds the
//! Aiven controller reconciles, plus the status and reference types they share.

pub mod common;
pub mod database;
pub mod managed;
pub mod postgresql;
pub mod project_vpc;
pub mod references;
pub mod service_user;

pub use common::*;
pub use database::*;
pub use managed::ManagedResource;
pub use postgresql::*;
pub use project_vpc::*;
pub use references::*;
pub use service_user::*;

/// API group shared by every managed kind.
pub const API_GROUP: &str = "aiven.microscaler.io";

/// API version shared by every managed kind.
pub const API_VERSION: &str = "v1alpha1";
