//! sandgate-provision — the external provisioning backend collaborator.
//!
//! Sandgate never creates compute itself; it asks the platform's GraphQL
//! API to create or destroy a sandbox service. Both operations are
//! fallible, and callers must treat a failed `destroy` as retryable: the
//! session record rolls back to its pre-attempt status.

pub mod client;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{GraphqlProvisioner, ProvisionerSettings};

/// What to provision for a new sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSpec {
    /// Session name; becomes the service name on the platform, which in
    /// turn anchors internal DNS resolution.
    pub name: String,
    /// Container image to run.
    pub image: String,
    /// Environment variables injected into the sandbox.
    pub env: HashMap<String, String>,
}

/// Errors from the provisioning backend.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The backend answered, but with an error (non-2xx, GraphQL errors,
    /// or a malformed payload).
    #[error("provisioning API error: {0}")]
    Api(String),

    /// The request never completed.
    #[error("provisioning request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Collaborator interface to the provisioning backend.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create a compute resource; returns its opaque handle.
    async fn create(&self, spec: &ProvisionSpec) -> Result<String, ProvisionError>;

    /// Destroy a previously created resource.
    async fn destroy(&self, resource_id: &str) -> Result<(), ProvisionError>;
}
