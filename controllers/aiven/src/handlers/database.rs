//! Database handler.

use super::{remote_name, running_service, set_running};
use crate::error::ControllerError;
use crate::handler::{CreateResult, HandlerContext, Observation, ResourceHandler, UpdateResult};
use aiven_client::{AivenClientTrait, CreateDatabaseRequest};
use async_trait::async_trait;
use crds::Database;
use std::sync::Arc;

/// Logical databases inside a running service. Immutable once created.
pub struct DatabaseHandler {
    client: Arc<dyn AivenClientTrait>,
}

impl DatabaseHandler {
    /// Handler for one `Database` reconcile.
    pub fn new(ctx: HandlerContext) -> Self {
        Self { client: ctx.client }
    }

    fn database_name(object: &Database) -> String {
        remote_name(object, object.spec.database_name.as_deref())
    }
}

#[async_trait]
impl ResourceHandler<Database> for DatabaseHandler {
    async fn observe(&self, object: &mut Database) -> Result<Observation, ControllerError> {
        running_service(self.client.as_ref(), &object.spec.project, &object.spec.service_name).await?;
        let name = Self::database_name(object);
        let exists = self
            .client
            .list_databases(&object.spec.project, &object.spec.service_name)
            .await?
            .iter()
            .any(|db| db.database_name == name);
        if !exists {
            return Ok(Observation::missing());
        }
        set_running(object, true, "RUNNING");
        Ok(Observation::exists(true))
    }

    async fn create(&self, object: &mut Database) -> Result<CreateResult, ControllerError> {
        let request = CreateDatabaseRequest {
            database: Self::database_name(object),
            lc_collate: object.spec.lc_collate.clone(),
            lc_ctype: object.spec.lc_ctype.clone(),
        };
        self.client
            .create_database(&object.spec.project, &object.spec.service_name, &request)
            .await?;
        set_running(object, true, "RUNNING");
        Ok(Observation::exists(true))
    }

    async fn update(&self, _object: &mut Database) -> Result<UpdateResult, ControllerError> {
        Ok(Observation::exists(true))
    }

    async fn delete(&self, object: &Database) -> Result<(), ControllerError> {
        self.client
            .delete_database(
                &object.spec.project,
                &object.spec.service_name,
                &Self::database_name(object),
            )
            .await?;
        Ok(())
    }
}
