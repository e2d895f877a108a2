mod config;
mod credentials;
mod errors;
mod models;
mod routes;
mod session;
mod state;
mod storage;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::credentials::create_source;
use crate::routes::build_router;
use crate::session::effects::{LoggingNavigator, LoggingNotifier};
use crate::session::{SessionManager, SessionState};
use crate::state::AppState;
use crate::storage::create_store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing backend settings)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting session API v{}", env!("CARGO_PKG_VERSION"));

    let store = create_store(&config).await?;
    let credentials = create_source(&config.credentials_source);

    let sessions = Arc::new(SessionManager::new(
        store,
        credentials,
        Arc::new(LoggingNavigator),
        Arc::new(LoggingNotifier),
        config.storage_key.clone(),
    ));
    spawn_session_watcher(&sessions);

    sessions.initialize().await;
    info!("Session initialized: {}", sessions.state().label());

    let state = AppState { sessions };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web front-end has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Logs the profile of every authenticated state the manager publishes.
fn spawn_session_watcher(sessions: &SessionManager) {
    let mut updates = sessions.subscribe();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            if let SessionState::Authenticated(session) = &*updates.borrow_and_update() {
                debug!(
                    "Session {} now at level {} with {} point(s), {} achievement(s)",
                    session.id,
                    session.level,
                    session.total_points,
                    session.achievements.len()
                );
            }
        }
    });
}
