// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence: load/save to JSON file with atomic writes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::credential::{epoch_ms_from_instant, instant_from_epoch_ms, TokenTriple};
use crate::session::registry::SessionRegistry;
use crate::session::SessionEvent;

/// Persisted credentials for all signed-in sessions, keyed by user.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSessions {
    pub sessions: HashMap<String, PersistedSession>,
}

/// Persisted triple for a single session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as epoch milliseconds, `0` when unknown.
    #[serde(default)]
    pub expires_at_ms: u64,
}

impl PersistedSession {
    pub fn from_triple(triple: &TokenTriple) -> Self {
        Self {
            access_token: triple.access_token.clone(),
            refresh_token: triple.refresh_token.clone(),
            expires_at_ms: epoch_ms_from_instant(triple.expires_at),
        }
    }

    pub fn to_triple(&self) -> TokenTriple {
        TokenTriple::new(
            self.access_token.clone(),
            self.refresh_token.clone(),
            instant_from_epoch_ms(self.expires_at_ms),
        )
    }
}

/// Load persisted sessions from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<PersistedSessions> {
    let contents = std::fs::read_to_string(path)?;
    let sessions: PersistedSessions = serde_json::from_str(&contents)?;
    Ok(sessions)
}

/// Save persisted sessions to a JSON file atomically (write tmp + rename).
///
/// The temp name carries the PID and a counter so concurrent saves never
/// share a temp file.
pub fn save(path: &Path, sessions: &PersistedSessions) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(sessions)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Spawn a task that saves the registry after every session event.
///
/// Does nothing when the registry has no persist path.
pub fn spawn_persister(
    registry: Arc<SessionRegistry>,
    mut event_rx: broadcast::Receiver<SessionEvent>,
    shutdown: CancellationToken,
) {
    if registry.persist_path().is_none() {
        return;
    }
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = event_rx.recv() => event,
            };
            match event {
                Ok(event) => {
                    tracing::debug!(user = event.user(), "persisting sessions");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "persister lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
            registry.persist();
        }
        // Final save so nothing written since the last event is lost.
        registry.persist();
    });
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
