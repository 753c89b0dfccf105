//! Session lifecycle operations behind the HTTP handlers.
//!
//! Create and delete both talk to the provisioning backend; the store is
//! only written once the backend call succeeds (create) or the teardown
//! attempt is underway (delete).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info};

use sandgate_provision::{ProvisionSpec, Provisioner};
use sandgate_state::{Session, SessionStatus, StateStore};

use crate::error::ApiError;

/// Knobs for session creation.
#[derive(Debug, Clone, Default)]
pub struct SessionServiceConfig {
    /// Local mode has no provisioning backend; session creation is
    /// rejected outright.
    pub local_mode: bool,
    /// Container image for new sandboxes.
    pub sandbox_image: String,
    /// Environment injected into each sandbox.
    pub sandbox_env: HashMap<String, String>,
}

/// Session CRUD plus the provisioning calls that back it.
#[derive(Clone)]
pub struct SessionService {
    store: StateStore,
    provisioner: Arc<dyn Provisioner>,
    config: SessionServiceConfig,
}

impl SessionService {
    pub fn new(
        store: StateStore,
        provisioner: Arc<dyn Provisioner>,
        config: SessionServiceConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            config,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn list(&self) -> Result<Vec<Session>, ApiError> {
        Ok(self.store.list_sessions()?)
    }

    pub fn get(&self, id: &str) -> Result<Session, ApiError> {
        self.store
            .get_session(id)?
            .ok_or(ApiError::NotFound)
    }

    /// Provision a sandbox and record it as `starting`. The name
    /// defaults to a timestamped `sandbox-*` when the caller gives none.
    pub async fn create(&self, name: Option<String>) -> Result<Session, ApiError> {
        if self.config.local_mode {
            return Err(ApiError::Forbidden(
                "Session creation disabled in local mode".to_string(),
            ));
        }

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(generated_name);

        let spec = ProvisionSpec {
            name: name.clone(),
            image: self.config.sandbox_image.clone(),
            env: self.config.sandbox_env.clone(),
        };
        let resource_id = self.provisioner.create(&spec).await?;

        let now = epoch_secs();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            status: SessionStatus::Starting,
            resource_id,
            created_at: now,
            updated_at: now,
        };
        self.store.put_session(&session)?;

        info!(id = %session.id, name = %session.name, "session created");
        Ok(session)
    }

    /// Tear down a session. Idempotent once deleted. The record moves to
    /// `terminating` for the duration of the destroy call; a failed
    /// destroy rolls the status back so the delete can be retried.
    pub async fn delete(&self, id: &str) -> Result<Session, ApiError> {
        let session = self.get(id)?;
        if session.status == SessionStatus::Deleted {
            return Ok(session);
        }

        let prior = session.status;
        self.store.update_status(id, SessionStatus::Terminating)?;

        if let Err(err) = self.provisioner.destroy(&session.resource_id).await {
            if let Err(rollback) = self.store.update_status(id, prior) {
                error!(%id, error = %rollback, "status rollback failed after destroy error");
            }
            return Err(err.into());
        }

        let deleted = self.store.update_status(id, SessionStatus::Deleted)?;
        info!(%id, name = %deleted.name, "session deleted");
        Ok(deleted)
    }
}

fn generated_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("sandbox-{millis}")
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
