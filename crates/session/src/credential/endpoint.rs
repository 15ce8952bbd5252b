// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single refresh-token exchange against the provider's token endpoint.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Google's OAuth token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Standard OAuth2 token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Rotated refresh token, if the provider issued a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// OAuth error response from the provider.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Why one exchange attempt failed. Always retryable within the budget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed token response: {0}")]
    Malformed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// One network exchange of a refresh token for a new access token.
///
/// Implementations perform exactly one request and never retry; retries,
/// timeouts, and backoff belong to [`crate::credential::refresh::TokenRefresher`].
pub trait TokenEndpoint: Send + Sync {
    fn exchange<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse, AttemptError>>;
}

/// Token endpoint reached over HTTP(S) with a form-encoded POST.
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl HttpTokenEndpoint {
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self { client, token_url: token_url.into(), client_id: client_id.into(), client_secret }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    async fn do_exchange(&self, refresh_token: &str) -> Result<TokenResponse, AttemptError> {
        let mut form = vec![("client_id", self.client_id.as_str())];
        if let Some(ref secret) = self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        form.push(("grant_type", "refresh_token"));
        form.push(("refresh_token", refresh_token));

        debug!(url = %self.token_url, "posting refresh token exchange");
        let resp = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AttemptError::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| AttemptError::Http(format!("read body: {e}")))?;

        if !status.is_success() {
            let body = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {desc}", err.error),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(AttemptError::Status { status: status.as_u16(), body });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AttemptError::Malformed(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(AttemptError::Malformed("empty access_token".to_owned()));
        }
        Ok(token)
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn exchange<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse, AttemptError>> {
        self.do_exchange(refresh_token).boxed()
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
