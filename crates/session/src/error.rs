// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error flag value the browser UI understands for every terminal auth state.
pub const REFRESH_ERROR_CODE: &str = "RefreshAccessTokenError";

/// Terminal authentication failures for a session.
///
/// Any of these ends the session in `TerminalError`; only a fresh sign-in
/// clears it. Transient per-attempt failures never appear here, they stay
/// inside the refresher's retry loop (see [`crate::credential::endpoint::AttemptError`]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No refresh token was available when a refresh was needed.
    #[error("no refresh token available")]
    MissingRefreshCredential,
    /// Every refresh attempt failed.
    #[error("token refresh failed after {attempts} attempts: {last_error}")]
    RefreshExhausted { attempts: u32, last_error: String },
    /// A downstream service rejected the access token again right after a
    /// successful forced refresh.
    #[error("access token rejected again after a forced refresh")]
    RejectedAfterRefresh,
    /// The refresh task died before producing an outcome.
    #[error("refresh task aborted: {0}")]
    RefreshAborted(String),
}

impl AuthError {
    /// Stable code exposed on the session view.
    pub fn code(&self) -> &'static str {
        REFRESH_ERROR_CODE
    }
}

/// Error codes for the session API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    Unauthorized,
    BadRequest,
    SessionNotFound,
    TerminalAuth,
    UpstreamError,
    Internal,
}

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::SessionNotFound => 404,
            Self::TerminalAuth => 401,
            Self::UpstreamError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::TerminalAuth => "TERMINAL_AUTH",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
