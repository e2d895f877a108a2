use std::sync::Arc;

use crate::session::SessionManager;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The single session this process hosts, standing in for one browser context.
    pub sessions: Arc<SessionManager>,
}
