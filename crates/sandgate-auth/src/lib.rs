//! sandgate-auth — signed, expiring access tokens.
//!
//! Tokens are self-contained HS256 JWTs carrying a subject, a role
//! (`admin` or `sandbox`), and, for sandbox-scoped tokens, the bound
//! session name. They are never stored server-side: validity is entirely
//! a function of signature and expiry.
//!
//! Token material can arrive through three request sources, checked in
//! strict precedence order (first present wins, no fallback merging):
//!
//! 1. `Authorization: Bearer <token>` header
//! 2. `token` query parameter
//! 3. `sandbox_token` cookie

pub mod codec;
pub mod extract;

use thiserror::Error;

pub use codec::{Role, TokenClaims, TokenCodec, DEFAULT_TOKEN_TTL};
pub use extract::{extract_token, ExtractedToken, TokenSource, SANDBOX_TOKEN_COOKIE};

/// Errors from token issuance and verification.
///
/// Verification is all-or-nothing: malformed, tampered, and expired
/// tokens all collapse into `Unauthenticated`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("token issuance failed: {0}")]
    Issue(String),
}
