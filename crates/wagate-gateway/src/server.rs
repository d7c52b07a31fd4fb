// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state. The health endpoint and
//! the WebSocket upgrade are public; everything under `/api` requires a
//! bearer token.

use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderValue;
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use wagate_config::model::ServerConfig;
use wagate_core::{SessionStore, WagateError};
use wagate_queue::OutboundQueue;
use wagate_session::SessionSupervisor;

use crate::auth::auth_middleware;
use crate::groups;
use crate::handlers;
use crate::ws::{self, WsRooms};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn SessionStore>,
    pub supervisor: Arc<SessionSupervisor>,
    pub queue: Arc<OutboundQueue>,
    pub rooms: Arc<WsRooms>,
    /// Process start for uptime reporting.
    pub start_time: Instant,
}

/// Builds the full application router.
pub fn build_router(state: GatewayState, frontend_url: Option<&str>) -> Router {
    // Public routes: health for load balancers, ws for the dashboard.
    let public_routes = Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/ws", get(ws::ws_handler))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/api/sessions/create", post(handlers::create_session))
        .route("/api/sessions", get(handlers::list_sessions))
        .route("/api/sessions/:id/status", get(handlers::session_status))
        .route(
            "/api/sessions/:id/disconnect",
            post(handlers::disconnect_session),
        )
        .route(
            "/api/messages/:session_id/send",
            post(handlers::send_message),
        )
        .route("/api/usage", get(handlers::get_usage))
        .route("/api/groups/:session_id/groups", get(groups::list_groups))
        .route("/api/groups/:session_id/create", post(groups::create_group))
        .route(
            "/api/groups/:session_id/:jid/metadata",
            get(groups::group_metadata),
        )
        .route(
            "/api/groups/:session_id/:jid/participants",
            get(groups::group_participants),
        )
        .route(
            "/api/groups/:session_id/:jid/add-participants",
            post(groups::add_participants),
        )
        .route(
            "/api/groups/:session_id/:jid/remove-participant",
            post(groups::remove_participant),
        )
        .route("/api/groups/:session_id/:jid/promote", post(groups::promote))
        .route("/api/groups/:session_id/:jid/demote", post(groups::demote))
        .route("/api/groups/:session_id/:jid/leave", post(groups::leave_group))
        .route(
            "/api/groups/:session_id/:jid/broadcast",
            post(groups::broadcast),
        )
        .route(
            "/api/groups/:session_id/:jid/settings",
            post(groups::group_settings),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .fallback(handlers::not_found)
        .layer(cors_layer(frontend_url))
}

/// CORS anchored on the configured dashboard origin; permissive when none
/// is configured (development).
fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    match frontend_url.and_then(|url| url.parse::<HeaderValue>().ok()) {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

/// Binds and serves the gateway until the cancellation token fires.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), WagateError> {
    let app = build_router(state, config.frontend_url.as_deref());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WagateError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| WagateError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
