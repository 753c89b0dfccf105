//! sandgate-resolver — session name to sandbox address resolution.
//!
//! A [`ProxyTarget`] is derived, never stored: given a session name, the
//! resolver produces a network authority (`host:port`) and a health-check
//! URL, deterministically from configuration alone.
//!
//! Two resolution modes:
//!
//! - **Internal domain** (default): `{name}.{internal_domain}:{port}`,
//!   the DNS-style pattern of the provisioning platform's private network.
//! - **Local override** (development): a static `name → authority` table
//!   with an optional fallback authority for unmapped names.

use std::collections::HashMap;

use tracing::debug;

/// Fixed, well-known health-check path every sandbox exposes.
pub const HEALTH_PATH: &str = "/healthz";

/// Resolved sandbox address. Derived, not stored.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProxyTarget {
    /// `host:port` authority of the sandbox.
    pub authority: String,
}

impl ProxyTarget {
    /// Base URL for plain-HTTP forwarding.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority)
    }

    /// Health-check URL derived from the target address.
    pub fn health_url(&self) -> String {
        format!("http://{}{}", self.authority, HEALTH_PATH)
    }
}

/// Resolver configuration. Immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Internal DNS suffix, e.g. `sandbox.internal`.
    pub internal_domain: String,
    /// Port every sandbox listens on inside the internal network.
    pub sandbox_port: u16,
    /// When set, the override table takes precedence over DNS-style
    /// resolution.
    pub local_mode: bool,
    /// Development override table: session name → authority.
    pub local_targets: HashMap<String, String>,
    /// Fallback authority for names missing from the override table.
    pub local_fallback: Option<String>,
}

/// Maps session names to sandbox addresses. Stateless beyond its config.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    config: ResolverConfig,
}

impl TargetResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolve a session name to its sandbox address.
    pub fn resolve(&self, session_name: &str) -> ProxyTarget {
        if self.config.local_mode {
            let local = self
                .config
                .local_targets
                .get(session_name)
                .or(self.config.local_fallback.as_ref());
            if let Some(authority) = local {
                debug!(session = session_name, %authority, "resolved via local override");
                return ProxyTarget {
                    authority: authority.clone(),
                };
            }
        }

        ProxyTarget {
            authority: format!(
                "{}.{}:{}",
                session_name, self.config.internal_domain, self.config.sandbox_port
            ),
        }
    }

    /// Health-check URL for a session, derived from its resolved target.
    pub fn health_url(&self, session_name: &str) -> String {
        self.resolve(session_name).health_url()
    }
}
