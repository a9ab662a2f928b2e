//! Aiven client acquisition.
//!
//! Resolves the API token for a managed object (the pre-shared default token
//! first, otherwise its `authSecretRef`) and hands out one shared client per
//! token. Reading a token from a secret puts the protection finalizer on that
//! secret so it outlives the objects that depend on it.

use crate::config::ControllerConfig;
use crate::constants::SECRET_PROTECTION_FINALIZER;
use crate::error::ControllerError;
use crate::k8s::{ObjectApi, has_finalizer, set_finalizer};
use aiven_client::{AivenClient, AivenClientTrait, AivenError};
use crds::ManagedResource;
use k8s_openapi::api::core::v1::Secret;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Builds a client for a token.
pub type ClientConnector =
    Arc<dyn Fn(&str) -> Result<Arc<dyn AivenClientTrait>, AivenError> + Send + Sync>;

/// Hands out Aiven clients per managed object.
pub struct ClientFactory {
    default_token: Option<String>,
    secrets: Arc<dyn ObjectApi<Secret>>,
    connect: ClientConnector,
    cache: Mutex<HashMap<String, Arc<dyn AivenClientTrait>>>,
    conflict_retry_attempts: u32,
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("default_token", &self.default_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl ClientFactory {
    /// Factory producing real `AivenClient`s for the configured endpoint.
    pub fn new(config: &ControllerConfig, secrets: Arc<dyn ObjectApi<Secret>>) -> Self {
        let base_url = config.aiven_api_url.clone();
        let timeout = config.request_timeout;
        let connect: ClientConnector = Arc::new(move |token: &str| {
            let client = AivenClient::new(base_url.clone(), token.to_string(), timeout)?;
            Ok(Arc::new(client) as Arc<dyn AivenClientTrait>)
        });
        let mut factory = Self::with_connector(config.default_token.clone(), secrets, connect);
        factory.conflict_retry_attempts = config.conflict_retry_attempts;
        factory
    }

    /// Factory with a custom connector (tests inject the mock client here).
    pub fn with_connector(
        default_token: Option<String>,
        secrets: Arc<dyn ObjectApi<Secret>>,
        connect: ClientConnector,
    ) -> Self {
        Self {
            default_token,
            secrets,
            connect,
            cache: Mutex::new(HashMap::new()),
            conflict_retry_attempts: 5,
        }
    }

    /// Client authenticated for `object`.
    pub async fn client_for<K: ManagedResource>(
        &self,
        object: &K,
    ) -> Result<Arc<dyn AivenClientTrait>, ControllerError> {
        let token = self.resolve_token(object).await?;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = cache.get(&token) {
            return Ok(Arc::clone(client));
        }
        let client = (self.connect)(&token)?;
        cache.insert(token, Arc::clone(&client));
        Ok(client)
    }

    async fn resolve_token<K: ManagedResource>(&self, object: &K) -> Result<String, ControllerError> {
        if let Some(token) = &self.default_token {
            return Ok(token.clone());
        }
        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let auth = object.auth_secret_ref().ok_or_else(|| {
            ControllerError::AuthSecret(
                "authSecretRef is not set and no default token is configured".to_string(),
            )
        })?;

        let secret = self
            .secrets
            .get(&namespace, &auth.name)
            .await?
            .ok_or_else(|| {
                ControllerError::AuthSecret(format!("secret {}/{} not found", namespace, auth.name))
            })?;
        let token = secret
            .data
            .as_ref()
            .and_then(|data| data.get(&auth.key))
            .map(|value| String::from_utf8_lossy(&value.0).trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ControllerError::AuthSecret(format!(
                    "secret {}/{} has no key {}",
                    namespace, auth.name, auth.key
                ))
            })?;

        if !has_finalizer(&secret, SECRET_PROTECTION_FINALIZER) {
            set_finalizer(
                self.secrets.as_ref(),
                &namespace,
                &auth.name,
                SECRET_PROTECTION_FINALIZER,
                true,
                self.conflict_retry_attempts,
            )
            .await?;
            info!("Protected auth secret {}/{}", namespace, auth.name);
        }
        Ok(token)
    }
}
