// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::credential::endpoint::GOOGLE_TOKEN_URL;
use crate::credential::refresh::RetryPolicy;

/// Configuration for the session service.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "MAILSESSION_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8700, env = "MAILSESSION_PORT")]
    pub port: u16,

    /// Bearer token for API auth. If unset, auth is disabled.
    #[arg(long, env = "MAILSESSION_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// OAuth token endpoint used for refresh exchanges.
    #[arg(long, default_value = GOOGLE_TOKEN_URL, env = "MAILSESSION_TOKEN_URL")]
    pub token_url: String,

    /// OAuth client id.
    #[arg(long, default_value = "", env = "MAILSESSION_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret. Omitted from exchanges when unset.
    #[arg(long, env = "MAILSESSION_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Seconds before expiry at which an access token is treated as expired.
    #[arg(long, default_value_t = 300, env = "MAILSESSION_SKEW_SECS")]
    pub skew_secs: u64,

    /// Refresh attempts per refresh, including the first.
    #[arg(long, default_value_t = 3, env = "MAILSESSION_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Per-attempt timeout for the token exchange, in seconds.
    #[arg(long, default_value_t = 30, env = "MAILSESSION_ATTEMPT_TIMEOUT_SECS")]
    pub attempt_timeout_secs: u64,

    /// Backoff after the first failed attempt, in milliseconds. Doubles per attempt.
    #[arg(long, default_value_t = 2000, env = "MAILSESSION_BACKOFF_BASE_MS")]
    pub backoff_base_ms: u64,

    /// Upper bound on the backoff between attempts, in milliseconds.
    #[arg(long, default_value_t = 10000, env = "MAILSESSION_BACKOFF_CAP_MS")]
    pub backoff_cap_ms: u64,

    /// Base URL that proxied requests are forwarded to.
    #[arg(long, default_value = "https://gmail.googleapis.com", env = "MAILSESSION_API_BASE")]
    pub api_base: String,

    /// Path of the JSON file sessions are persisted to. Disabled when unset.
    #[arg(long, env = "MAILSESSION_PERSIST_PATH")]
    pub persist_path: Option<std::path::PathBuf>,
}

impl SessionConfig {
    pub fn skew(&self) -> Duration {
        Duration::from_secs(self.skew_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_cap: Duration::from_millis(self.backoff_cap_ms),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
