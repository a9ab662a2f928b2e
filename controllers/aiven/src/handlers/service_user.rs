//! ServiceUser handler.

use super::{running_service, set_running};
use crate::error::ControllerError;
use crate::handler::{CreateResult, HandlerContext, Observation, ResourceHandler, UpdateResult};
use aiven_client::{AivenClientTrait, CreateServiceUserRequest, Service, ServiceUser as RemoteUser};
use async_trait::async_trait;
use crds::ServiceUser;
use kube::Resource;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Users of a running service; credentials are published as a secret.
pub struct ServiceUserHandler {
    client: Arc<dyn AivenClientTrait>,
}

impl ServiceUserHandler {
    /// Handler for one `ServiceUser` reconcile.
    pub fn new(ctx: HandlerContext) -> Self {
        Self { client: ctx.client }
    }

    fn username(object: &ServiceUser) -> String {
        object.meta().name.clone().unwrap_or_default()
    }

    fn record_user(object: &mut ServiceUser, user: &RemoteUser) {
        object.status.get_or_insert_with(Default::default).user_type = user.user_type.clone();
        set_running(object, true, "RUNNING");
    }

    fn connection_details(service: &Service, user: &RemoteUser) -> BTreeMap<String, String> {
        let mut details = BTreeMap::new();
        for (key, param) in [("HOST", "host"), ("PORT", "port")] {
            if let Some(value) = service.uri_param(param) {
                details.insert(key.to_string(), value.to_string());
            }
        }
        details.insert("USERNAME".to_string(), user.username.clone());
        if let Some(password) = &user.password {
            details.insert("PASSWORD".to_string(), password.clone());
        }
        details
    }
}

#[async_trait]
impl ResourceHandler<ServiceUser> for ServiceUserHandler {
    async fn observe(&self, object: &mut ServiceUser) -> Result<Observation, ControllerError> {
        let service =
            running_service(self.client.as_ref(), &object.spec.project, &object.spec.service_name).await?;
        let user = match self
            .client
            .get_service_user(&object.spec.project, &object.spec.service_name, &Self::username(object))
            .await
        {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Ok(Observation::missing()),
            Err(e) => return Err(e.into()),
        };
        Self::record_user(object, &user);
        Ok(Observation::exists(true).with_secret(Self::connection_details(&service, &user)))
    }

    async fn create(&self, object: &mut ServiceUser) -> Result<CreateResult, ControllerError> {
        let service =
            running_service(self.client.as_ref(), &object.spec.project, &object.spec.service_name).await?;
        let request = CreateServiceUserRequest {
            username: Self::username(object),
            authentication: object.spec.authentication.clone(),
        };
        let user = self
            .client
            .create_service_user(&object.spec.project, &object.spec.service_name, &request)
            .await?;
        Self::record_user(object, &user);
        Ok(Observation::exists(true).with_secret(Self::connection_details(&service, &user)))
    }

    async fn update(&self, _object: &mut ServiceUser) -> Result<UpdateResult, ControllerError> {
        Ok(Observation::exists(true))
    }

    async fn delete(&self, object: &ServiceUser) -> Result<(), ControllerError> {
        self.client
            .delete_service_user(&object.spec.project, &object.spec.service_name, &Self::username(object))
            .await?;
        Ok(())
    }
}
