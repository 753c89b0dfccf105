//! Domain types for the Sandgate session store.
//!
//! A [`Session`] tracks one ephemeral sandbox instance: its routing name,
//! lifecycle status, and the handle of the externally provisioned compute
//! resource backing it. All types are serializable to/from JSON for
//! storage in redb.

use serde::{Deserialize, Serialize};

/// Unique identifier for a session.
pub type SessionId = String;

/// Durable record of one sandbox session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    /// Routing key: embedded in sandbox-scoped tokens and used for
    /// DNS-style target resolution.
    pub name: String,
    pub status: SessionStatus,
    /// Handle to the externally provisioned compute resource; opaque here.
    pub resource_id: String,
    /// Unix timestamp (seconds) when the session was created. Anchor for
    /// the startup-deadline computation.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last status change.
    pub updated_at: u64,
}

/// Lifecycle status of a sandbox session.
///
/// Transitions are monotonic: `deleted` and `failed` are absorbing, and
/// only `starting` sessions may move to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Active,
    Terminating,
    Deleted,
    Failed,
}

impl SessionStatus {
    /// Whether this status is absorbing (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted | Self::Failed)
    }

    /// Stable string form, matching the serialized representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Terminating => "terminating",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
