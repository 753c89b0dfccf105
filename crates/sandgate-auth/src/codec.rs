//! Token issuance and verification.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Default token lifetime: 24 hours.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Role carried by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Grants access to the management surface.
    Admin,
    /// Bound to exactly one session's name; grants proxy access to that
    /// session's target only.
    Sandbox,
}

/// Claim set of a verified token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

impl TokenClaims {
    /// Session name this token routes to: the explicit binding for
    /// sandbox-scoped tokens, the subject as fallback.
    pub fn target_session(&self) -> &str {
        self.session_name.as_deref().unwrap_or(&self.sub)
    }
}

/// Issues and verifies signed tokens with a process-wide secret.
///
/// The secret is read-only after construction.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        // Expiry is exact: a token is invalid the second `exp` passes.
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Produce a signed token with `exp = now + ttl`.
    pub fn issue(
        &self,
        subject: &str,
        role: Role,
        session_name: Option<&str>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = epoch_secs();
        let claims = TokenClaims {
            sub: subject.to_string(),
            role,
            session_name: session_name.map(str::to_string),
            iat: now,
            exp: now + ttl.as_secs(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }

    /// Admin token for the management surface.
    pub fn admin_token(&self, ttl: Duration) -> Result<String, AuthError> {
        self.issue("admin", Role::Admin, None, ttl)
    }

    /// Sandbox-scoped token bound to one session name.
    pub fn sandbox_token(&self, session_name: &str, ttl: Duration) -> Result<String, AuthError> {
        self.issue(session_name, Role::Sandbox, Some(session_name), ttl)
    }

    /// Verify a token: signature, shape, and expiry. All failures
    /// collapse into `Unauthenticated`.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::Unauthenticated)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
