//! HTTP handlers for the admin surface.
//!
//! Success responses wrap their payload in `{"data": ...}`; errors are
//! `{"error": "<message>"}` via [`ApiError`].

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use sandgate_auth::{extract_token, Role, TokenClaims, DEFAULT_TOKEN_TTL};
use sandgate_state::Session;

use crate::error::ApiError;
use crate::ApiState;

/// Uniform success envelope: `{"data": ...}`.
#[derive(Serialize)]
pub struct DataEnvelope<T> {
    data: T,
}

fn data<T: Serialize>(payload: T) -> Json<DataEnvelope<T>> {
    Json(DataEnvelope { data: payload })
}

/// Token middleware for the `/sessions` routes. Verified claims are made
/// available to handlers as a request extension.
pub async fn require_token(
    State(state): State<ApiState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(extracted) = extract_token(&req) else {
        return ApiError::Unauthenticated.into_response();
    };
    match state.tokens.verify(&extracted.value) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(_) => ApiError::Unauthenticated.into_response(),
    }
}

pub async fn health(State(state): State<ApiState>) -> Response {
    match state.sessions.store().ping() {
        Ok(()) => data(serde_json::json!({ "status": "ok" })).into_response(),
        Err(err) => {
            warn!(error = %err, "health check failed to reach store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "Store unavailable" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

pub async fn login(
    State(state): State<ApiState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<DataEnvelope<TokenResponse>>, ApiError> {
    if !safe_equal(&body.password, &state.admin_password) {
        warn!("admin login rejected");
        return Err(ApiError::Unauthenticated);
    }
    let token = state.tokens.admin_token(DEFAULT_TOKEN_TTL)?;
    Ok(data(TokenResponse {
        token,
        expires_in: DEFAULT_TOKEN_TTL.as_secs(),
    }))
}

pub async fn list_sessions(
    State(state): State<ApiState>,
) -> Result<Json<DataEnvelope<Vec<Session>>>, ApiError> {
    Ok(data(state.sessions.list()?))
}

pub async fn get_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<DataEnvelope<Session>>, ApiError> {
    Ok(data(state.sessions.get(&id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub name: Option<String>,
}

pub async fn create_session(
    State(state): State<ApiState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<DataEnvelope<Session>>), ApiError> {
    let name = body.and_then(|Json(b)| b.name);
    let session = state.sessions.create(name).await?;
    Ok((StatusCode::CREATED, data(session)))
}

pub async fn delete_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<DataEnvelope<Session>>, ApiError> {
    Ok(data(state.sessions.delete(&id).await?))
}

#[derive(Serialize)]
pub struct SessionTokenResponse {
    pub token: String,
    pub expires_in: u64,
    pub session_name: String,
}

/// Issue a sandbox-scoped token for one session. Admin only.
pub async fn issue_session_token(
    State(state): State<ApiState>,
    Extension(claims): Extension<TokenClaims>,
    Path(id): Path<String>,
) -> Result<Json<DataEnvelope<SessionTokenResponse>>, ApiError> {
    if claims.role != Role::Admin {
        return Err(ApiError::Forbidden("Forbidden".to_string()));
    }
    let session = state.sessions.get(&id)?;
    let token = state
        .tokens
        .sandbox_token(&session.name, DEFAULT_TOKEN_TTL)?;
    Ok(data(SessionTokenResponse {
        token,
        expires_in: DEFAULT_TOKEN_TTL.as_secs(),
        session_name: session.name,
    }))
}

/// Constant-time string comparison for credential checks.
fn safe_equal(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
