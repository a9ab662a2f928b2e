//! Per-kind handlers.
//!
//! Each handler translates one kind's spec into Aiven API calls; the
//! lifecycle around them is owned by the generic reconciler.

pub mod database;
pub mod postgresql;
pub mod project_vpc;
pub mod service_user;

pub use database::DatabaseHandler;
pub use postgresql::PostgreSqlHandler;
pub use project_vpc::ProjectVpcHandler;
pub use service_user::ServiceUserHandler;

use crate::conditions::{running_condition, set_condition};
use crate::constants::reasons;
use crate::error::ControllerError;
use aiven_client::{AivenClientTrait, Service};
use crds::{ConditionStatus, ManagedResource};

/// Parent service of a dependent kind, which must be running.
pub(crate) async fn running_service(
    client: &dyn AivenClientTrait,
    project: &str,
    service: &str,
) -> Result<Service, ControllerError> {
    let found = match client.get_service(project, service).await {
        Ok(found) => found,
        Err(e) if e.is_not_found() => {
            return Err(ControllerError::PreconditionNotMet(format!(
                "service {}/{} does not exist",
                project, service
            )));
        }
        Err(e) => return Err(e.into()),
    };
    if found.is_powered_off() {
        return Err(ControllerError::ServicePoweredOff(format!("{}/{}", project, service)));
    }
    if !found.is_running() {
        return Err(ControllerError::PreconditionNotMet(format!(
            "service {}/{} is {}",
            project, service, found.state
        )));
    }
    Ok(found)
}

/// Reflect remote readiness in the `Running` condition.
pub(crate) fn set_running<K: ManagedResource>(object: &mut K, running: bool, state: &str) {
    let message = if running {
        "Instance is running on Aiven side".to_string()
    } else {
        format!("Instance state is {}", state)
    };
    set_condition(
        object.conditions_mut(),
        running_condition(ConditionStatus::from_bool(running), reasons::CHECK_RUNNING, message),
    );
}

/// Name of a remote child resource: the explicit name, else the object name.
pub(crate) fn remote_name<K: ManagedResource>(object: &K, explicit: Option<&str>) -> String {
    explicit
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| object.meta().name.clone().unwrap_or_default())
}
