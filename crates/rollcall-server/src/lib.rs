//! Face-verified attendance service.
//!
//! JSON over HTTP for accounts, dashboards and attendance, plus a WebSocket
//! that streams attendance marks into each faculty member's room as they
//! happen. Face inference runs on a dedicated engine thread.

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod faces;
pub mod gallery;
pub mod rooms;
pub mod routes;
pub mod state;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header::CONTENT_TYPE, Method};
use axum::routing::{get, post};
use axum::Router;
use rollcall_core::OnnxFaceEncoder;
use rollcall_store::{Store, TemplateCipher};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::{AppState, SharedState};

use routes::{accounts, attendance, dashboard, identify, verify, ws};

/// How often expired login sessions are swept from the database.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// How often the identification gallery is reloaded from the database.
const GALLERY_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Every route of the service, wired to `state`.
pub fn router(state: SharedState) -> Router {
    // Base64 inflates images by a third; leave room for the other fields.
    let body_limit = state.config.max_image_bytes / 3 * 4 + 64 * 1024;

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(routes::status))
        .route("/signup", post(accounts::signup))
        .route("/login", post(accounts::login))
        .route("/logout", get(accounts::logout).post(accounts::logout))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/attendance", post(attendance::submit))
        .route("/attendance/qr", post(attendance::qr))
        .route("/verify_face_for_qr", post(verify::verify_face_for_qr))
        .route("/verify_face_for_attendance", post(verify::verify_face_for_attendance))
        .route("/identify", post(identify::identify))
        .route("/ws", get(ws::ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Open the database, load the models, and serve until SIGINT/SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }

    let cipher = config.template_key.as_deref().map(TemplateCipher::from_secret);
    if cipher.is_none() {
        tracing::warn!("ROLLCALL_TEMPLATE_KEY not set; face templates are stored unsealed");
    }
    let store = Store::open(&config.db_path, cipher).await?;

    let detector_path = config.detector_model_path();
    let recognizer_path = config.recognizer_model_path();
    let encoder = OnnxFaceEncoder::load(&detector_path, &recognizer_path)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    tracing::info!(detector = %detector_path, recognizer = %recognizer_path, "face models loaded");
    let engine = engine::spawn_engine(Box::new(encoder))?;

    let bind = config.bind.clone();
    let state = AppState::new(config, store, engine).await?;
    tracing::info!(templates = state.gallery.len().await, "gallery loaded");

    let sweeper = tokio::spawn(sweep_sessions(state.store.clone()));
    let reloader = tokio::spawn(reload_gallery(state.clone()));

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(address = %bind, "rollcalld listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    reloader.abort();
    tracing::info!("rollcalld stopped");
    Ok(())
}

async fn sweep_sessions(store: Store) {
    let mut tick = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    loop {
        tick.tick().await;
        if let Err(e) = store.purge_expired_sessions().await {
            tracing::warn!(error = %e, "session sweep failed");
        }
    }
}

/// Keep the gallery in step with the database. Reloads periodically and,
/// on unix, immediately on SIGHUP.
async fn reload_gallery(state: SharedState) {
    let mut tick = tokio::time::interval(GALLERY_RELOAD_INTERVAL);
    tick.tick().await;

    #[cfg(unix)]
    let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(sig) => Some(sig),
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGHUP");
            None
        }
    };

    loop {
        #[cfg(unix)]
        {
            let hangup_recv = async {
                match hangup.as_mut() {
                    Some(sig) => sig.recv().await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = tick.tick() => {},
                _ = hangup_recv => tracing::info!("received SIGHUP, reloading gallery"),
            }
        }
        #[cfg(not(unix))]
        tick.tick().await;

        match state.reload_gallery().await {
            Ok(templates) => tracing::debug!(templates, "gallery reloaded"),
            Err(e) => tracing::warn!(error = %e, "gallery reload failed"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received SIGTERM, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
