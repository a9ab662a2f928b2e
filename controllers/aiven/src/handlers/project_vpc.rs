//! ProjectVpc handler.

use super::set_running;
use crate::error::ControllerError;
use crate::handler::{CreateResult, HandlerContext, Observation, ResourceHandler, UpdateResult};
use aiven_client::{AivenClientTrait, CreateProjectVpcRequest, VPC_STATE_ACTIVE};
use async_trait::async_trait;
use crds::ProjectVpc;
use std::sync::Arc;
use tracing::debug;

/// Project VPCs are immutable; the remote id lives in `status.id`.
pub struct ProjectVpcHandler {
    client: Arc<dyn AivenClientTrait>,
}

impl ProjectVpcHandler {
    /// Handler for one `ProjectVPC` reconcile.
    pub fn new(ctx: HandlerContext) -> Self {
        Self { client: ctx.client }
    }

    fn record_state(object: &mut ProjectVpc, id: &str, state: &str) {
        let status = object.status.get_or_insert_with(Default::default);
        status.id = Some(id.to_string());
        status.state = Some(state.to_string());
        set_running(object, state == VPC_STATE_ACTIVE, state);
    }
}

#[async_trait]
impl ResourceHandler<ProjectVpc> for ProjectVpcHandler {
    async fn observe(&self, object: &mut ProjectVpc) -> Result<Observation, ControllerError> {
        let Some(id) = object.status.as_ref().and_then(|s| s.id.clone()) else {
            return Ok(Observation::missing());
        };
        match self.client.get_project_vpc(&object.spec.project, &id).await {
            Ok(vpc) => {
                Self::record_state(object, &vpc.project_vpc_id, &vpc.state);
                Ok(Observation::exists(true))
            }
            Err(e) if e.is_not_found() => {
                debug!("Project VPC {} is gone remotely", id);
                Ok(Observation::missing())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, object: &mut ProjectVpc) -> Result<CreateResult, ControllerError> {
        let request = CreateProjectVpcRequest {
            cloud_name: object.spec.cloud_name.clone(),
            network_cidr: object.spec.network_cidr.clone(),
        };
        let vpc = self.client.create_project_vpc(&object.spec.project, &request).await?;
        Self::record_state(object, &vpc.project_vpc_id, &vpc.state);
        Ok(Observation::exists(true))
    }

    async fn update(&self, _object: &mut ProjectVpc) -> Result<UpdateResult, ControllerError> {
        Ok(Observation::exists(true))
    }

    async fn delete(&self, object: &ProjectVpc) -> Result<(), ControllerError> {
        let Some(id) = object.status.as_ref().and_then(|s| s.id.as_deref()) else {
            return Ok(());
        };
        self.client.delete_project_vpc(&object.spec.project, id).await?;
        Ok(())
    }
}
