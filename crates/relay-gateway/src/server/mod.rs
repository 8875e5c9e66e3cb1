//! Gateway server setup
//!
//! Provides the WebSocket server configuration and routes.

mod handler;
mod state;

pub use handler::gateway_handler;
pub use state::GatewayState;

use crate::auth::JwtAuthenticator;
use axum::{extract::State, routing::get, Json, Router};
use relay_common::{AppConfig, AppError, AppResult, JwtService};
use relay_core::{EventDispatcher, MessageRouter};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/ws", get(gateway_handler))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Connection, room and listener counts
async fn stats(State(state): State<GatewayState>) -> Json<Value> {
    let router = state.router();
    Json(json!({
        "connections": router.registry().count(),
        "rooms": router.rooms().get_all_rooms().len(),
        "listeners": router.dispatcher().get_listener_count(None),
        "pendingAcks": router.dispatcher().pending_ack_count(),
        "messageFormat": router.message_format(),
    }))
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the router and the state shared by all sockets
pub fn create_gateway_state(config: AppConfig) -> GatewayState {
    let dispatcher = EventDispatcher::from_settings(&config.dispatcher);
    let router = MessageRouter::new(config.router.clone(), dispatcher);

    match &config.auth.jwt_secret {
        Some(secret) => {
            let jwt = JwtService::new(secret, config.auth.token_expiry);
            router.set_authenticator(JwtAuthenticator::new(jwt));
            tracing::info!("JWT authentication enabled");
        }
        None => tracing::warn!("JWT_SECRET not set, every authenticate request will be refused"),
    }

    GatewayState::new(router, config)
}

/// Serve `app` on `listener` until Ctrl-C
pub async fn run_server(app: Router, listener: TcpListener) -> AppResult<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Gateway listening on ws://{}/ws", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Server(e.to_string()))
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> AppResult<()> {
    let addr = config.gateway.address();
    let listener = TcpListener::bind(&addr).await.map_err(|e| AppError::Bind {
        addr: addr.clone(),
        reason: e.to_string(),
    })?;

    let state = create_gateway_state(config);
    let app = create_app(state.clone());

    let result = run_server(app, listener).await;
    state.router().dispatcher().shutdown();
    tracing::info!("Gateway stopped");
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
