// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth token refresh with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::credential::endpoint::{AttemptError, TokenEndpoint, TokenResponse};
use crate::credential::{expiry_after, TokenTriple, DEFAULT_TOKEN_LIFETIME};
use crate::error::AuthError;

/// Retry budget and backoff schedule for one refresh invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total exchange attempts, including the first.
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }
}

/// Bookkeeping for one refresh invocation; dropped when it returns.
struct RefreshAttempt {
    number: u32,
    max_attempts: u32,
    last_error: Option<AttemptError>,
}

impl RefreshAttempt {
    fn new(max_attempts: u32) -> Self {
        Self { number: 0, max_attempts: max_attempts.max(1), last_error: None }
    }

    /// Advance to the next attempt, or `false` once the budget is spent.
    fn next(&mut self) -> bool {
        if self.number >= self.max_attempts {
            return false;
        }
        self.number += 1;
        true
    }

    fn has_remaining(&self) -> bool {
        self.number < self.max_attempts
    }

    fn into_error(self) -> AuthError {
        AuthError::RefreshExhausted {
            attempts: self.number,
            last_error: self.last_error.map(|e| e.to_string()).unwrap_or_default(),
        }
    }
}

/// Exchanges refresh tokens for new token triples.
///
/// Pure with respect to session state: the caller decides what to do with
/// the returned triple.
pub struct TokenRefresher {
    endpoint: Arc<dyn TokenEndpoint>,
    policy: RetryPolicy,
}

impl TokenRefresher {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, policy: RetryPolicy) -> Self {
        Self { endpoint, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Refresh with exponential backoff retries.
    ///
    /// A missing or empty refresh token fails immediately without touching
    /// the network. Every other failure is retried until the attempt budget
    /// runs out, after which the failure is terminal.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenTriple, AuthError> {
        let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) else {
            return Err(AuthError::MissingRefreshCredential);
        };

        let mut attempt = RefreshAttempt::new(self.policy.max_attempts);
        while attempt.next() {
            match self.exchange_once(refresh_token).await {
                Ok(token) => {
                    debug!(attempt = attempt.number, "token refresh succeeded");
                    return Ok(into_triple(token, refresh_token, Instant::now()));
                }
                Err(e) => {
                    warn!(
                        attempt = attempt.number,
                        max = attempt.max_attempts,
                        error = %e,
                        "token refresh attempt failed"
                    );
                    attempt.last_error = Some(e);
                    if attempt.has_remaining() {
                        let delay = self.policy.backoff(attempt.number);
                        debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(attempt.into_error())
    }

    async fn exchange_once(&self, refresh_token: &str) -> Result<TokenResponse, AttemptError> {
        let timeout = self.policy.attempt_timeout;
        match tokio::time::timeout(timeout, self.endpoint.exchange(refresh_token)).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Timeout(timeout)),
        }
    }
}

/// Build the new triple. Providers may omit rotation, in which case the
/// refresh token that was just used stays valid.
fn into_triple(token: TokenResponse, prior_refresh: &str, now: Instant) -> TokenTriple {
    let lifetime = token.expires_in.map(Duration::from_secs).unwrap_or(DEFAULT_TOKEN_LIFETIME);
    let refresh_token = token
        .refresh_token
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| prior_refresh.to_owned());
    TokenTriple::new(token.access_token, Some(refresh_token), Some(expiry_after(now, lifetime)))
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
