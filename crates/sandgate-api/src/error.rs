//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use sandgate_auth::AuthError;
use sandgate_provision::ProvisionError;
use sandgate_state::StateError;

/// Errors surfaced by the admin API. Each variant maps to one HTTP
/// status; the response body is always `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, or expired token, or bad login credentials.
    #[error("Unauthorized")]
    Unauthenticated,

    /// Authenticated but not allowed to perform the operation.
    #[error("{0}")]
    Forbidden(String),

    /// The referenced session does not exist.
    #[error("Session not found")]
    NotFound,

    /// The provisioning backend failed.
    #[error("Provisioning failed: {0}")]
    Upstream(String),

    /// Anything unexpected. The detail is logged, never sent to the
    /// client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                error!(%detail, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StateError> for ApiError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => ApiError::Unauthenticated,
            AuthError::Issue(detail) => ApiError::Internal(detail),
        }
    }
}
