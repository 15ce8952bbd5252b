// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth credentials: the token triple, its in-memory store, and the
//! refresher that exchanges a refresh token at the provider's token endpoint.

pub mod endpoint;
pub mod refresh;
pub mod store;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

/// Access token lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Longest lifetime accepted from a sign-in, a provider response, or a
/// persisted session. Longer values are clamped to it.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 3600);

/// Expiry `lifetime` after `now`, clamped to [`MAX_TOKEN_LIFETIME`].
pub fn expiry_after(now: Instant, lifetime: Duration) -> Instant {
    let lifetime = lifetime.min(MAX_TOKEN_LIFETIME);
    now.checked_add(lifetime).unwrap_or(now)
}

/// The credentials of one signed-in session.
///
/// Always replaced as a whole; nothing mutates a triple in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTriple {
    pub access_token: String,
    /// `None` when the provider never issued one. Such a session cannot
    /// survive its first expiry.
    pub refresh_token: Option<String>,
    /// `None` means the expiry is unknown and the token counts as expired.
    pub expires_at: Option<Instant>,
}

impl TokenTriple {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<Instant>,
    ) -> Self {
        Self { access_token: access_token.into(), refresh_token, expires_at }
    }

    /// Remaining lifetime at `now`, zero once expired.
    pub fn expires_in(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|e| e.saturating_duration_since(now))
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Map a wall-clock expiry (epoch millis) onto the monotonic clock.
///
/// `0` means "no expiry recorded". Expiries in the past map to `now`.
pub fn instant_from_epoch_ms(expires_at_ms: u64) -> Option<Instant> {
    if expires_at_ms == 0 {
        return None;
    }
    let remaining = expires_at_ms.saturating_sub(epoch_ms());
    Some(expiry_after(Instant::now(), Duration::from_millis(remaining)))
}

/// Map a monotonic expiry back to wall-clock epoch millis (`0` for none).
pub fn epoch_ms_from_instant(expires_at: Option<Instant>) -> u64 {
    match expires_at {
        Some(e) => {
            let remaining = e.saturating_duration_since(Instant::now());
            epoch_ms().saturating_add(remaining.as_millis() as u64)
        }
        None => 0,
    }
}
