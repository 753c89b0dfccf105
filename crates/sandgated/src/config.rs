//! Environment-driven daemon configuration.
//!
//! Deployment-shaped settings come from the environment; runtime knobs
//! (port, data dir, poll interval) are CLI flags in `main.rs`. The
//! resulting [`Config`] is immutable and handed to components at
//! assembly time, never read ambiently.

use std::collections::HashMap;
use std::env;

use thiserror::Error;

use sandgate_provision::ProvisionerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Complete daemon configuration as read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC secret for token signing.
    pub auth_token_secret: String,
    /// Password accepted at `POST /auth/login`.
    pub admin_password: String,
    /// Hostname served by the admin surface.
    pub admin_host: String,
    /// Hostname served by the sandbox proxy surface.
    pub proxy_host: String,
    /// Internal DNS suffix for sandbox resolution.
    pub internal_domain: String,
    /// Port sandboxes listen on inside the internal network.
    pub sandbox_port: u16,
    /// Disables session creation and enables local target overrides.
    pub local_mode: bool,
    /// Development override table: session name → authority.
    pub local_targets: HashMap<String, String>,
    /// Fallback authority for names missing from the override table.
    pub local_fallback: Option<String>,
    /// Container image for provisioned sandboxes.
    pub sandbox_image: String,
    /// Environment injected into each sandbox.
    pub sandbox_env: HashMap<String, String>,
    /// Provisioning backend; absent in local-only deployments.
    pub provisioner: Option<ProvisionerSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let auth_token_secret = require("AUTH_TOKEN_SECRET")?;
        let admin_password = require("ADMIN_PASSWORD")?;

        let admin_host = lookup("API_ADMIN_HOST").unwrap_or_else(|| "api.localhost".to_string());
        let proxy_host = lookup("API_PROXY_HOST").unwrap_or_else(|| "proxy.localhost".to_string());

        let internal_domain =
            lookup("SANDBOX_INTERNAL_DOMAIN").unwrap_or_else(|| "sandbox.internal".to_string());
        let sandbox_port = match lookup("SANDBOX_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid("SANDBOX_PORT", raw.clone()))?,
            None => 3000,
        };

        let local_targets = parse_local_map(&lookup("SANDBOX_LOCAL_MAP").unwrap_or_default())?;
        let local_fallback = lookup("SANDBOX_LOCAL_TARGET").filter(|v| !v.is_empty());
        let local_mode = lookup("LOCAL_MODE").map(|v| is_truthy(&v)).unwrap_or(false)
            || !local_targets.is_empty()
            || local_fallback.is_some();

        let provisioner = match lookup("PROVISIONER_GRAPHQL_URL") {
            Some(endpoint) => Some(ProvisionerSettings {
                endpoint,
                api_token: require("PROVISIONER_API_TOKEN")?,
                project_id: require("PROVISIONER_PROJECT_ID")?,
                environment_id: require("PROVISIONER_ENVIRONMENT_ID")?,
            }),
            None => None,
        };

        let sandbox_image = lookup("SANDBOX_IMAGE")
            .unwrap_or_else(|| "ghcr.io/sandgate/sandbox:latest".to_string());
        let mut sandbox_env = HashMap::new();
        if let Some(repo_url) = lookup("SANDBOX_REPO_URL") {
            sandbox_env.insert("REPO_URL".to_string(), repo_url);
        }
        // Passed through so sandboxes can clone private repositories.
        if let Some(gh_token) = lookup("SANDBOX_GH_TOKEN") {
            sandbox_env.insert("GH_TOKEN".to_string(), gh_token);
        }

        Ok(Self {
            auth_token_secret,
            admin_password,
            admin_host,
            proxy_host,
            internal_domain,
            sandbox_port,
            local_mode,
            local_targets,
            local_fallback,
            sandbox_image,
            sandbox_env,
            provisioner,
        })
    }
}

/// Parse `name=host:port,name2=host:port` pairs. Empty input yields an
/// empty table; malformed entries are rejected outright.
fn parse_local_map(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut map = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((name, authority)) = entry.split_once('=') else {
            return Err(ConfigError::Invalid("SANDBOX_LOCAL_MAP", entry.to_string()));
        };
        let name = name.trim();
        let authority = authority.trim();
        if name.is_empty() || authority.is_empty() {
            return Err(ConfigError::Invalid("SANDBOX_LOCAL_MAP", entry.to_string()));
        }
        map.insert(name.to_string(), authority.to_string());
    }
    Ok(map)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
