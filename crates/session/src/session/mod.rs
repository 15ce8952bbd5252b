// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user session lifecycle: keeps each session's access token fresh and
//! reports terminal failures to every consumer the same way.

pub mod controller;
pub mod persist;
pub mod registry;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a session, derived from its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The stored access token can be used as-is.
    Valid,
    /// A refresh is in flight.
    Refreshing,
    /// Re-authentication is required.
    TerminalError,
}

/// What the UI reads for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub user: String,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Set once the session is in `TerminalError`. The UI may only offer
    /// re-authentication or dismissal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    pub has_refresh_token: bool,
}

/// Events broadcast on session transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user: String },
    Refreshed { user: String },
    TerminalError { user: String, error: String },
    SignedOut { user: String },
}

impl SessionEvent {
    pub fn user(&self) -> &str {
        match self {
            Self::SignedIn { user }
            | Self::Refreshed { user }
            | Self::TerminalError { user, .. }
            | Self::SignedOut { user } => user,
        }
    }
}
