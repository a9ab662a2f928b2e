//! PostgreSql handler.

use super::set_running;
use crate::constants::INSTANCE_IS_RUNNING_ANNOTATION;
use crate::error::ControllerError;
use crate::handler::{CreateResult, HandlerContext, Observation, ResourceHandler, UpdateResult};
use crate::k8s::{ObjectApi, set_annotation};
use crate::reconciler::is_already_processed;
use aiven_client::{AivenClientTrait, CreateServiceRequest, Service, UpdateServiceRequest};
use async_trait::async_trait;
use crds::{PostgreSql, ProjectVpc};
use k8s_openapi::api::core::v1::Secret;
use kube::Resource;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const SERVICE_TYPE: &str = "pg";
const ADMIN_USER: &str = "avnadmin";

/// Aiven for PostgreSQL services.
pub struct PostgreSqlHandler {
    client: Arc<dyn AivenClientTrait>,
    secrets: Arc<dyn ObjectApi<Secret>>,
    project_vpcs: Arc<dyn ObjectApi<ProjectVpc>>,
}

impl PostgreSqlHandler {
    /// `project_vpcs` resolves `projectVpcRef` to the remote VPC id.
    pub fn new(ctx: HandlerContext, project_vpcs: Arc<dyn ObjectApi<ProjectVpc>>) -> Self {
        Self {
            client: ctx.client,
            secrets: ctx.secrets,
            project_vpcs,
        }
    }

    fn service_name(object: &PostgreSql) -> String {
        object.meta().name.clone().unwrap_or_default()
    }

    async fn project_vpc_id(&self, object: &PostgreSql) -> Result<Option<String>, ControllerError> {
        let Some(reference) = &object.spec.project_vpc_ref else {
            return Ok(None);
        };
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let vpc = self
            .project_vpcs
            .get(&namespace, &reference.name)
            .await?
            .ok_or_else(|| ControllerError::PreconditionNotMet(format!("{} not found", reference)))?;
        vpc.status
            .and_then(|s| s.id)
            .map(Some)
            .ok_or_else(|| ControllerError::PreconditionNotMet(format!("{} has no id yet", reference)))
    }

    fn user_config(object: &PostgreSql) -> Result<Option<serde_json::Value>, ControllerError> {
        object
            .spec
            .user_config
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(ControllerError::from)
    }

    /// Password from `connInfoSecretSource`, if configured.
    async fn source_password(&self, object: &PostgreSql) -> Result<Option<String>, ControllerError> {
        let Some(source) = &object.spec.conn_info_secret_source else {
            return Ok(None);
        };
        let object_namespace = object.meta().namespace.clone().unwrap_or_default();
        let namespace = source.namespace_or(&object_namespace);
        let secret = self.secrets.get(namespace, &source.name).await?.ok_or_else(|| {
            ControllerError::PreconditionNotMet(format!(
                "password secret {}/{} not found",
                namespace, source.name
            ))
        })?;
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(&source.password_key))
            .map(|value| Some(String::from_utf8_lossy(&value.0).into_owned()))
            .ok_or_else(|| {
                ControllerError::PreconditionNotMet(format!(
                    "password secret {}/{} has no key {}",
                    namespace, source.name, source.password_key
                ))
            })
    }

    async fn apply_password(&self, object: &PostgreSql, password: Option<String>) -> Result<(), ControllerError> {
        if let Some(password) = password {
            self.client
                .reset_service_user_password(
                    &object.spec.project,
                    &Self::service_name(object),
                    ADMIN_USER,
                    &password,
                )
                .await?;
            info!("Applied admin password from source secret to {}", Self::service_name(object));
        }
        Ok(())
    }

    fn record_state(object: &mut PostgreSql, service: &Service) {
        object.status.get_or_insert_with(Default::default).state = Some(service.state.clone());
        set_running(object, service.is_running(), &service.state);
        set_annotation(object, INSTANCE_IS_RUNNING_ANNOTATION, service.is_running().to_string());
    }

    fn connection_details(service: &Service) -> BTreeMap<String, String> {
        if !service.is_running() {
            return BTreeMap::new();
        }
        let mut details = BTreeMap::new();
        let params = [
            ("HOST", "host"),
            ("PORT", "port"),
            ("DATABASE_NAME", "dbname"),
            ("USER", "user"),
            ("PASSWORD", "password"),
            ("SSLMODE", "sslmode"),
        ];
        for (key, param) in params {
            if let Some(value) = service.uri_param(param) {
                details.insert(key.to_string(), value.to_string());
            }
        }
        if let Some(uri) = &service.service_uri {
            details.insert("DATABASE_URI".to_string(), uri.clone());
        }
        details
    }
}

#[async_trait]
impl ResourceHandler<PostgreSql> for PostgreSqlHandler {
    async fn observe(&self, object: &mut PostgreSql) -> Result<Observation, ControllerError> {
        let service = match self
            .client
            .get_service(&object.spec.project, &Self::service_name(object))
            .await
        {
            Ok(service) => service,
            Err(e) if e.is_not_found() => return Ok(Observation::missing()),
            Err(e) => return Err(e.into()),
        };
        Self::record_state(object, &service);
        Ok(Observation::exists(is_already_processed(object))
            .with_secret(Self::connection_details(&service)))
    }

    async fn create(&self, object: &mut PostgreSql) -> Result<CreateResult, ControllerError> {
        let request = CreateServiceRequest {
            service_name: Self::service_name(object),
            service_type: SERVICE_TYPE.to_string(),
            plan: object.spec.plan.clone(),
            cloud: object.spec.cloud_name.clone(),
            project_vpc_id: self.project_vpc_id(object).await?,
            termination_protection: object.spec.termination_protection,
            user_config: Self::user_config(object)?,
        };
        let password = self.source_password(object).await?;
        let service = self.client.create_service(&object.spec.project, &request).await?;
        self.apply_password(object, password).await?;
        Self::record_state(object, &service);
        Ok(Observation::exists(true).with_secret(Self::connection_details(&service)))
    }

    async fn update(&self, object: &mut PostgreSql) -> Result<UpdateResult, ControllerError> {
        let request = UpdateServiceRequest {
            plan: object.spec.plan.clone(),
            cloud: object.spec.cloud_name.clone(),
            project_vpc_id: self.project_vpc_id(object).await?,
            termination_protection: object.spec.termination_protection,
            powered: true,
            user_config: Self::user_config(object)?,
        };
        let password = self.source_password(object).await?;
        let service = self
            .client
            .update_service(&object.spec.project, &Self::service_name(object), &request)
            .await?;
        self.apply_password(object, password).await?;
        debug!("Service {} is {}", service.service_name, service.state);
        Self::record_state(object, &service);
        Ok(Observation::exists(true).with_secret(Self::connection_details(&service)))
    }

    async fn delete(&self, object: &PostgreSql) -> Result<(), ControllerError> {
        self.client
            .delete_service(&object.spec.project, &Self::service_name(object))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use aiven_client::MockAivenClient;
    use crds::{CONDITION_RUNNING, ConnInfoSecretSource, ResourceReference, is_condition_true};

    fn handler(env: &TestEnv) -> PostgreSqlHandler {
        PostgreSqlHandler::new(
            HandlerContext {
                client: Arc::new(env.aiven.clone()),
                secrets: env.secrets.clone(),
            },
            env.project_vpcs.clone(),
        )
    }

    #[tokio::test]
    async fn test_observe_running_service_publishes_details() {
        let env = TestEnv::new();
        env.aiven
            .add_service("test-project", MockAivenClient::sample_service("pg", "RUNNING"));
        let mut pg = create_test_postgresql("pg");

        let observation = handler(&env).observe(&mut pg).await.unwrap();

        assert!(observation.resource_exists);
        assert!(!observation.resource_up_to_date);
        assert_eq!(observation.secret_details["PORT"], "12691");
        assert_eq!(observation.secret_details["PASSWORD"], "s3cr3t");
        assert!(observation.secret_details.contains_key("DATABASE_URI"));
        assert!(is_condition_true(pg.status.as_ref().unwrap().conditions.as_slice(), CONDITION_RUNNING));
        assert_eq!(annotation(&pg, INSTANCE_IS_RUNNING_ANNOTATION).as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_running_annotation_follows_power_state() {
        let env = TestEnv::new();
        env.aiven
            .add_service("test-project", MockAivenClient::sample_service("pg", "RUNNING"));
        let mut pg = create_test_postgresql("pg");
        handler(&env).observe(&mut pg).await.unwrap();
        assert_eq!(annotation(&pg, INSTANCE_IS_RUNNING_ANNOTATION).as_deref(), Some("true"));

        env.aiven.set_service_state("test-project", "pg", "POWEROFF");
        handler(&env).observe(&mut pg).await.unwrap();

        assert_eq!(annotation(&pg, INSTANCE_IS_RUNNING_ANNOTATION).as_deref(), Some("false"));
        assert!(!is_condition_true(pg.status.as_ref().unwrap().conditions.as_slice(), CONDITION_RUNNING));
        assert_eq!(pg.status.unwrap().state.as_deref(), Some("POWEROFF"));
    }

    #[tokio::test]
    async fn test_observe_rebuilding_service_has_no_details() {
        let env = TestEnv::new();
        env.aiven
            .add_service("test-project", MockAivenClient::sample_service("pg", "REBUILDING"));
        let mut pg = create_test_postgresql("pg");

        let observation = handler(&env).observe(&mut pg).await.unwrap();

        assert!(observation.secret_details.is_empty());
        assert_eq!(pg.status.unwrap().state.as_deref(), Some("REBUILDING"));
    }

    #[tokio::test]
    async fn test_create_resolves_project_vpc_id() {
        let env = TestEnv::new();
        let mut vpc = create_test_project_vpc("vpc");
        vpc.status.get_or_insert_with(Default::default).id = Some("vpc-42".to_string());
        env.project_vpcs.insert(vpc);
        let mut pg = create_test_postgresql("pg");
        pg.spec.project_vpc_ref = Some(ResourceReference::new("ProjectVpc", "vpc"));

        handler(&env).create(&mut pg).await.unwrap();

        let service = env.aiven.get_service("test-project", "pg").await.unwrap();
        assert_eq!(service.project_vpc_id.as_deref(), Some("vpc-42"));
        assert_eq!(pg.status.unwrap().state.as_deref(), Some("REBUILDING"));
    }

    #[tokio::test]
    async fn test_create_applies_source_password() {
        let env = TestEnv::new();
        env.secrets
            .insert(create_test_secret("pg-password", &[("PASSWORD", "from-source")]));
        let mut pg = create_test_postgresql("pg");
        pg.spec.conn_info_secret_source = Some(ConnInfoSecretSource {
            name: "pg-password".to_string(),
            namespace: None,
            password_key: "PASSWORD".to_string(),
        });

        handler(&env).create(&mut pg).await.unwrap();

        let admin = env.aiven.service_user("test-project", "pg", "avnadmin").unwrap();
        assert_eq!(admin.password.as_deref(), Some("from-source"));
    }

    #[tokio::test]
    async fn test_missing_source_secret_is_precondition() {
        let env = TestEnv::new();
        env.aiven
            .add_service("test-project", MockAivenClient::sample_service("pg", "RUNNING"));
        let mut pg = create_test_postgresql("pg");
        pg.spec.conn_info_secret_source = Some(ConnInfoSecretSource {
            name: "absent".to_string(),
            namespace: None,
            password_key: "PASSWORD".to_string(),
        });

        let err = handler(&env).update(&mut pg).await.unwrap_err();
        assert!(err.is_precondition_not_met());
        assert_eq!(env.aiven.call_count("update_service"), 0);
    }
}
