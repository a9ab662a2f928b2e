//! Deletion path of the reconciler.

use crate::constants::{
    DELETE_REMOTE_FINALIZER, DELETION_POLICY_ANNOTATION, DELETION_POLICY_ORPHAN, actions, reasons,
};
use crate::error::ControllerError;
use crate::handler::ResourceHandler;
use crate::k8s::{annotation, has_finalizer, object_key, set_finalizer};
use crate::reconciler::{Reconciler, is_already_processed};
use crds::ManagedResource;
use kube::runtime::events::EventType;
use kube_runtime::controller::Action;
use tracing::{info, warn};

impl<K: ManagedResource> Reconciler<K> {
    /// Delete the remote resource (unless orphaned) and release the finalizer.
    pub(crate) async fn finalize(
        &self,
        handler: &dyn ResourceHandler<K>,
        mut object: K,
    ) -> Result<Action, ControllerError> {
        let key = object_key(&object);
        if !has_finalizer(&object, DELETE_REMOTE_FINALIZER) {
            return Ok(Action::await_change());
        }

        if annotation(&object, DELETION_POLICY_ANNOTATION) == Some(DELETION_POLICY_ORPHAN) {
            info!("Orphaning remote resource of {} {}", K::kind(&()), key);
        } else {
            match handler.delete(&object).await {
                Ok(()) => {
                    info!("Deleted remote resource of {} {}", K::kind(&()), key);
                    self.event(&object, EventType::Normal, reasons::DELETED, actions::DELETE, "Remote resource deleted".to_string())
                        .await;
                }
                // A token that never worked cannot have created anything.
                Err(e) if e.is_invalid_token() && !is_already_processed(&object) => {
                    warn!("Ignoring invalid token while deleting unprocessed {} {}: {}", K::kind(&()), key, e);
                    self.event(&object, EventType::Warning, reasons::INVALID_TOKEN_IGNORED, actions::DELETE, e.to_string())
                        .await;
                }
                Err(e) if e.is_not_found() => {
                    warn!("Remote resource of {} {} already gone: {}", K::kind(&()), key, e);
                    self.event(&object, EventType::Warning, reasons::ALREADY_DELETED, actions::DELETE, e.to_string())
                        .await;
                }
                Err(e) => {
                    let snapshot = object.clone();
                    let outcome = self
                        .apply_error_policy(&mut object, e, actions::DELETE, reasons::DELETE_FAILED)
                        .await;
                    if let Err(persist_err) = self.persist(&snapshot, &mut object).await {
                        warn!("Failed to record deletion failure on {}: {}", key, persist_err);
                    }
                    return outcome;
                }
            }
        }

        let namespace = object.meta().namespace.clone().unwrap_or_default();
        let name = object.meta().name.clone().unwrap_or_default();
        set_finalizer(
            self.api.as_ref(),
            &namespace,
            &name,
            DELETE_REMOTE_FINALIZER,
            false,
            self.ctx.config.conflict_retry_attempts,
        )
        .await?;
        info!("Released finalizer on {} {}", K::kind(&()), key);
        Ok(Action::await_change())
    }
}
