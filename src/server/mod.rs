//! Server side of the WhatsApp voice bridge
//!
//! - Webhooks the platform calls for markup and status updates (`voice`)
//! - REST API for placing calls and managing conferences (`api`)
//! - Call/conference registry shared by both
//! - Platform REST client
#![allow(dead_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod registry;
pub mod twiml;
pub mod voice;

use axum::{
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::AppError;
use platform::{CallPlatform, PlatformClient};
use registry::CallRegistry;

/// Application state shared across all routes
pub struct AppState {
    pub config: ServerConfig,
    pub platform: Arc<dyn CallPlatform>,
    /// Call and conference bookkeeping; the lock serializes mutations
    pub registry: Arc<RwLock<CallRegistry>>,
}

impl AppState {
    pub fn new(config: ServerConfig, platform: Arc<dyn CallPlatform>) -> Self {
        Self {
            config,
            platform,
            registry: Arc::new(RwLock::new(CallRegistry::new())),
        }
    }
}

/// A call-control document, served with the markup content type
#[derive(Debug, Clone, PartialEq)]
pub struct Markup(pub String);

impl IntoResponse for Markup {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, twiml::CONTENT_TYPE)], self.0).into_response()
    }
}

/// Create the Axum router with all webhook and API routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/api/health", get(health_check))

        // Platform webhooks (markup)
        .route("/voice/incoming", post(voice::incoming_call))
        .route("/voice/outbound", post(voice::outbound_answered))
        .route("/voice/conference", post(voice::conference))
        .route("/voice/voicemail", post(voice::voicemail))
        .route("/voice/ivr", post(voice::ivr_menu))
        .route("/voice/ivr/selection", post(voice::ivr_selection))

        // Platform webhooks (events)
        .route("/voice/status", post(voice::call_status))
        .route("/voice/conference/events", post(voice::conference_events))

        // Call routes
        .route("/api/calls", get(api::list_calls).post(api::dial_call))
        .route("/api/calls/{id}", get(api::get_call).delete(api::hangup_call))
        .route("/api/calls/{id}/mute", post(api::mute_call))

        // Conference routes
        .route("/api/conferences", get(api::list_conferences).post(api::create_conference))
        .route("/api/conferences/{id}", get(api::get_conference).delete(api::end_conference))
        .route("/api/conferences/{id}/participants", post(api::add_participant))
        .route("/api/conferences/{id}/participants/{address}", delete(api::remove_participant))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Health check
async fn health_check() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize and start the server
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {}", e);
    }

    let platform = PlatformClient::new(
        config.account_sid.clone(),
        config.auth_token.clone(),
        config.api_base.clone(),
    )
    .with_status_callback(config.callback_url("/voice/status"));

    let port = config.port;
    let state = Arc::new(AppState::new(config, Arc::new(platform)));
    let registry = state.registry.clone();

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Server running on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let mut registry = registry.write().await;
    tracing::info!(
        "Dropping {} call(s) and {} conference(s)",
        registry.call_count(),
        registry.conference_count()
    );
    registry.clear();

    Ok(())
}
