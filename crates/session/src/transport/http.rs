// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the session service.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::credential::{expiry_after, instant_from_epoch_ms, TokenTriple, DEFAULT_TOKEN_LIFETIME};
use crate::error::ApiError;
use crate::gateway::GatewayError;
use crate::session::controller::SessionController;
use crate::state::AppState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_count: usize,
}

/// Initial sign-in grant as delivered by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignInRequest {
    pub user: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds from now.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Absolute expiry in epoch seconds. Ignored when `expires_in` is set.
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl SignInRequest {
    fn into_triple(self, now: Instant) -> TokenTriple {
        let expires_at = match (self.expires_in, self.expires_at.filter(|&s| s > 0)) {
            (Some(secs), _) => Some(expiry_after(now, Duration::from_secs(secs))),
            (None, Some(epoch_secs)) => instant_from_epoch_ms(epoch_secs.saturating_mul(1000)),
            (None, None) => Some(expiry_after(now, DEFAULT_TOKEN_LIFETIME)),
        };
        TokenTriple::new(self.access_token, self.refresh_token.filter(|t| !t.is_empty()), expires_at)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignOutResponse {
    pub user: String,
    pub removed: bool,
}

/// Headers not forwarded between the caller and the provider API.
const HOP_HEADERS: &[&str] =
    &["host", "authorization", "connection", "content-length", "transfer-encoding", "upgrade"];

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "running".to_owned(), session_count: s.registry.len() })
}

/// `POST /api/v1/sessions`: initial sign-in, or re-authentication of an
/// existing session.
pub async fn sign_in(
    State(s): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> impl IntoResponse {
    if req.user.trim().is_empty() || req.access_token.is_empty() {
        return ApiError::BadRequest
            .to_http_response("user and access_token are required")
            .into_response();
    }

    let user = req.user.clone();
    let controller = s.registry.sign_in(&user, req.into_triple(Instant::now()));
    Json(controller.peek()).into_response()
}

/// `GET /api/v1/sessions`: state of every session, without refreshing.
pub async fn list_sessions(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.registry.status())
}

/// `GET /api/v1/sessions/{user}`: session read. Refreshes when the token is
/// near expiry; a terminal error comes back as data in the view.
pub async fn read_session(
    State(s): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    let controller = match lookup(&s, &user) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    Json(controller.read().await).into_response()
}

/// `POST /api/v1/sessions/{user}/refresh`: explicit forced refresh.
pub async fn force_refresh(
    State(s): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    let controller = match lookup(&s, &user) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(e) = controller.force_refresh().await {
        tracing::debug!(user, error = %e, "forced refresh failed");
    }
    Json(controller.peek()).into_response()
}

/// `DELETE /api/v1/sessions/{user}`: sign-out.
pub async fn sign_out(
    State(s): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    if !s.registry.sign_out(&user) {
        return ApiError::SessionNotFound
            .to_http_response(format!("no session for {user}"))
            .into_response();
    }
    Json(SignOutResponse { user, removed: true }).into_response()
}

/// `ANY /api/v1/sessions/{user}/proxy/{*path}`: forward to the provider API
/// with the session's access token.
pub async fn proxy(
    State(s): State<Arc<AppState>>,
    Path((user, path)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let controller = match lookup(&s, &user) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut url = format!("{}/{}", s.config.api_base.trim_end_matches('/'), path);
    if let Some(query) = query {
        url.push('?');
        url.push_str(&query);
    }

    let mut forwarded = headers;
    for name in HOP_HEADERS {
        forwarded.remove(*name);
    }
    let request =
        match s.gateway.client().request(method, &url).headers(forwarded).body(body).build() {
            Ok(r) => r,
            Err(e) => {
                return ApiError::BadRequest.to_http_response(e.to_string()).into_response();
            }
        };

    match s.gateway.call(&controller, request).await {
        Ok(resp) => forward_response(resp).await,
        Err(e) => gateway_error_response(&user, e),
    }
}

// -- Helpers ------------------------------------------------------------------

fn lookup(s: &AppState, user: &str) -> Result<Arc<SessionController>, Response> {
    s.registry.get(user).ok_or_else(|| {
        ApiError::SessionNotFound.to_http_response(format!("no session for {user}")).into_response()
    })
}

async fn forward_response(resp: reqwest::Response) -> Response {
    let status = resp.status();
    let mut headers = resp.headers().clone();
    for name in HOP_HEADERS {
        headers.remove(*name);
    }
    match resp.bytes().await {
        Ok(body) => (status, headers, body).into_response(),
        Err(e) => ApiError::UpstreamError.to_http_response(e.to_string()).into_response(),
    }
}

fn gateway_error_response(user: &str, e: GatewayError) -> Response {
    let code = match &e {
        GatewayError::Auth(_) => ApiError::TerminalAuth,
        GatewayError::Transport(_) => ApiError::UpstreamError,
        GatewayError::BodyNotCloneable | GatewayError::InvalidCredential => ApiError::Internal,
    };
    tracing::warn!(user, code = %code, "proxied request failed: {e}");
    code.to_http_response(e.to_string()).into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
