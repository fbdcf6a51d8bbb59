use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::identity::{Actor, Credential};
use crate::errors::CoreError;
use crate::ports::{CredentialStore, RemoteBoardClient, RemoteError};

/// Single choke point for remote calls: supplies the actor's credential and
/// turns a rejected credential into a local invalidation.
#[derive(Clone)]
pub struct RemoteGuard {
    remote: Arc<dyn RemoteBoardClient>,
    credentials: Arc<dyn CredentialStore>,
}

impl RemoteGuard {
    pub fn new(remote: Arc<dyn RemoteBoardClient>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { remote, credentials }
    }

    pub fn remote(&self) -> &dyn RemoteBoardClient {
        self.remote.as_ref()
    }

    pub fn credential<'a>(&self, actor: &'a Actor) -> Result<&'a Credential, CoreError> {
        actor.credential.as_ref().ok_or(CoreError::CredentialMissing(actor.user_id))
    }

    pub async fn settle<T>(
        &self,
        actor: &Actor,
        operation: &'static str,
        result: Result<T, RemoteError>,
    ) -> Result<T, CoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(RemoteError::CredentialInvalid) => {
                warn!(
                    event_name = "remote.credential_invalidated",
                    user_id = actor.user_id.0,
                    operation,
                    "remote rejected credential, invalidating it locally"
                );
                if let Err(error) = self.credentials.invalidate(actor.user_id).await {
                    warn!(
                        event_name = "remote.credential_invalidation_failed",
                        user_id = actor.user_id.0,
                        error = %error,
                        "could not invalidate credential"
                    );
                }
                Err(CoreError::CredentialInvalid(actor.user_id))
            }
            Err(error) => {
                debug!(
                    event_name = "remote.call_failed",
                    user_id = actor.user_id.0,
                    operation,
                    retryable = error.is_retryable(),
                    error = %error,
                    "remote call failed"
                );
                Err(CoreError::Remote(error))
            }
        }
    }
}
