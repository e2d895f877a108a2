pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::session::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/session",
            get(handlers::handle_get_session).patch(handlers::handle_update),
        )
        .route("/api/v1/session/login", post(handlers::handle_login))
        .route("/api/v1/session/signup", post(handlers::handle_signup))
        .route("/api/v1/session/logout", post(handlers::handle_logout))
        .with_state(state)
}
