use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppJson};
use crate::models::session::{NewAccount, Session, SessionPatch};
use crate::session::effects::{HOME_PATH, LANDING_PATH};
use crate::state::AppState;

#[derive(Serialize)]
pub struct SessionView {
    pub session: Option<Session>,
    pub loading: bool,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Result of an operation that moved the user to another screen.
#[derive(Serialize)]
pub struct TransitionResponse {
    pub session: Option<Session>,
    pub redirect: &'static str,
}

/// GET /api/v1/session
pub async fn handle_get_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(SessionView {
        session: state.sessions.current(),
        loading: state.sessions.is_loading(),
    })
}

/// POST /api/v1/session/login
pub async fn handle_login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let session = state.sessions.login(&req.email, &req.password).await?;
    Ok(Json(TransitionResponse {
        session: Some(session),
        redirect: HOME_PATH,
    }))
}

/// POST /api/v1/session/signup
pub async fn handle_signup(
    State(state): State<AppState>,
    AppJson(account): AppJson<NewAccount>,
) -> Result<Json<TransitionResponse>, AppError> {
    let session = state.sessions.register(account).await?;
    Ok(Json(TransitionResponse {
        session: Some(session),
        redirect: HOME_PATH,
    }))
}

/// POST /api/v1/session/logout
pub async fn handle_logout(State(state): State<AppState>) -> Json<TransitionResponse> {
    state.sessions.logout().await;
    Json(TransitionResponse {
        session: None,
        redirect: LANDING_PATH,
    })
}

/// PATCH /api/v1/session
pub async fn handle_update(
    State(state): State<AppState>,
    AppJson(patch): AppJson<SessionPatch>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.sessions.update(&patch).await?))
}
