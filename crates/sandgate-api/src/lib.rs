//! sandgate-api — the administrative REST surface.
//!
//! axum route handlers for session management. All `/sessions` routes
//! sit behind the token middleware; token issuance additionally requires
//! the admin role.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Liveness + store reachability |
//! | POST | `/auth/login` | Exchange the admin password for a token |
//! | GET | `/sessions` | List sessions, newest first |
//! | POST | `/sessions` | Provision and record a new session |
//! | GET | `/sessions/{id}` | Get one session |
//! | DELETE | `/sessions/{id}` | Tear down and mark deleted |
//! | POST | `/sessions/{id}/token` | Issue a sandbox-scoped token (admin) |

pub mod error;
pub mod handlers;
pub mod service;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};

use sandgate_auth::TokenCodec;

pub use error::ApiError;
pub use service::{SessionService, SessionServiceConfig};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub sessions: SessionService,
    pub tokens: Arc<TokenCodec>,
    pub admin_password: String,
}

/// Build the complete admin router.
pub fn build_router(state: ApiState) -> Router {
    let session_routes = Router::new()
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/token", post(handlers::issue_session_token))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_token,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/login", post(handlers::login))
        .merge(session_routes)
        .with_state(state)
}
