// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::gateway::Gateway;
use crate::session::registry::SessionRegistry;
use crate::transport::auth::ServiceToken;

/// Shared service state.
pub struct AppState {
    pub config: SessionConfig,
    pub registry: Arc<SessionRegistry>,
    pub gateway: Gateway,
    pub service_token: ServiceToken,
    /// Cancelled on Ctrl-C. Stops the server and the persister.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: SessionConfig,
        registry: Arc<SessionRegistry>,
        gateway: Gateway,
        shutdown: CancellationToken,
    ) -> Self {
        let service_token = ServiceToken::new(config.auth_token.clone());
        Self { config, registry, gateway, service_token, shutdown }
    }
}
