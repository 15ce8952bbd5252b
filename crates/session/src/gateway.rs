// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request gateway: attaches the session's access token to
//! outgoing provider API requests and recovers once from a rejection.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::credential::TokenTriple;
use crate::error::AuthError;
use crate::session::controller::SessionController;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The session cannot authorize requests until the user signs in again.
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("downstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The request body is a stream and could not be kept for a retry.
    #[error("request body cannot be replayed")]
    BodyNotCloneable,
    #[error("access token is not a valid header value")]
    InvalidCredential,
}

/// Sends requests on behalf of a session.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: reqwest::Client,
}

impl Gateway {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send `request` with the session's bearer token.
    ///
    /// A 401 from downstream forces one refresh and one retry of the same
    /// request. A second 401 moves the session to its terminal error.
    /// Responses other than 401 are returned as-is, errors included.
    pub async fn call(
        &self,
        session: &Arc<SessionController>,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, GatewayError> {
        let retry = request.try_clone().ok_or(GatewayError::BodyNotCloneable)?;

        let triple = session.access_token().await?;
        let response = self.send(request, &triple).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!(user = session.user(), url = %retry.url(), "downstream rejected access token, refreshing");
        let fresh = session.refresh_rejected(&triple).await?;
        let response = self.send(retry, &fresh).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            debug!(user = session.user(), "retry after refresh succeeded");
            return Ok(response);
        }

        Err(session.reject(&fresh).into())
    }

    async fn send(
        &self,
        mut request: reqwest::Request,
        triple: &TokenTriple,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", triple.access_token))
            .map_err(|_| GatewayError::InvalidCredential)?;
        bearer.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, bearer);
        Ok(self.client.execute(request).await?)
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
