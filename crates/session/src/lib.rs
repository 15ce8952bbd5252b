// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mailsession: OAuth token lifecycle for the mail client's signed-in users.
//!
//! Keeps each session's access token fresh, funnels concurrent refreshes
//! into one exchange, and surfaces unrecoverable failures as a terminal
//! error the UI turns into a re-authentication prompt.

pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::credential::endpoint::HttpTokenEndpoint;
use crate::credential::refresh::TokenRefresher;
use crate::gateway::Gateway;
use crate::session::persist;
use crate::session::registry::SessionRegistry;
use crate::state::AppState;
use crate::transport::build_router;

/// Timeout for proxied provider API calls.
const API_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the shared state from config: refresher, registry, and gateway.
///
/// Sessions are restored from the persist path when one is configured.
pub fn build_state(config: SessionConfig, shutdown: CancellationToken) -> anyhow::Result<AppState> {
    // Attempt timeouts are enforced by the refresher, not the client.
    let token_client = reqwest::Client::builder().build()?;
    let endpoint = HttpTokenEndpoint::new(
        token_client,
        config.token_url.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
    );
    tracing::debug!(token_url = endpoint.token_url(), "token endpoint configured");
    let refresher = Arc::new(TokenRefresher::new(Arc::new(endpoint), config.retry_policy()));
    let policy = refresher.policy();
    tracing::debug!(
        max_attempts = policy.max_attempts,
        attempt_timeout_ms = policy.attempt_timeout.as_millis() as u64,
        backoff_base_ms = policy.backoff_base.as_millis() as u64,
        "refresh retry policy"
    );
    let registry = SessionRegistry::new(refresher, config.skew(), config.persist_path.clone());

    if let Some(ref path) = config.persist_path {
        if path.exists() {
            let persisted = persist::load(path)?;
            let restored = registry.load_persisted(&persisted);
            tracing::info!(restored, path = %path.display(), "restored persisted sessions");
        }
    }

    let api_client = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;
    Ok(AppState::new(config, registry, Gateway::new(api_client), shutdown))
}

/// Run the session service until shutdown.
pub async fn run(config: SessionConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(build_state(config, CancellationToken::new())?);
    persist::spawn_persister(
        Arc::clone(&state.registry),
        state.registry.subscribe(),
        state.shutdown.clone(),
    );

    {
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    tracing::info!(
        sessions = state.registry.len(),
        auth = state.service_token.is_enabled(),
        "mailsession listening on {addr}"
    );
    let shutdown = state.shutdown.clone();
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
