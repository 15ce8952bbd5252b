// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory credential store for a single session. Performs no I/O.

use std::time::Duration;

use tokio::time::Instant;

use crate::credential::TokenTriple;
use crate::error::AuthError;

/// Holds the current token triple and the terminal-error flag.
#[derive(Debug, Default)]
pub struct CredentialStore {
    triple: Option<TokenTriple>,
    error: Option<AuthError>,
}

impl CredentialStore {
    pub fn new(triple: TokenTriple) -> Self {
        Self { triple: Some(triple), error: None }
    }

    pub fn read(&self) -> Option<&TokenTriple> {
        self.triple.as_ref()
    }

    /// Replace the triple wholesale.
    pub fn write(&mut self, triple: TokenTriple) {
        self.triple = Some(triple);
    }

    /// Record a terminal failure. The triple is destroyed so a stale access
    /// token can never be handed out again.
    pub fn mark_terminal_error(&mut self, error: AuthError) {
        self.triple = None;
        self.error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn error(&self) -> Option<&AuthError> {
        self.error.as_ref()
    }

    /// Drop everything (sign-out).
    pub fn clear(&mut self) {
        self.triple = None;
        self.error = None;
    }

    /// `true` iff a triple is present and `now < expires_at - skew`.
    pub fn is_valid(&self, now: Instant, skew: Duration) -> bool {
        let Some(expires_at) = self.triple.as_ref().and_then(|t| t.expires_at) else {
            return false;
        };
        match expires_at.checked_sub(skew) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
