// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the session service.

pub mod auth;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{any, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all session routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Sign-in and status
        .route("/api/v1/sessions", post(http::sign_in).get(http::list_sessions))
        .route("/api/v1/sessions/{user}", get(http::read_session).delete(http::sign_out))
        .route("/api/v1/sessions/{user}/refresh", post(http::force_refresh))
        // Provider API proxy
        .route("/api/v1/sessions/{user}/proxy/{*path}", any(http::proxy))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
