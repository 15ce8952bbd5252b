// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry: one controller per signed-in user.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::credential::refresh::TokenRefresher;
use crate::credential::TokenTriple;
use crate::session::controller::SessionController;
use crate::session::persist::{self, PersistedSession, PersistedSessions};
use crate::session::{SessionEvent, SessionView};

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 64;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionController>>>,
    refresher: Arc<TokenRefresher>,
    skew: Duration,
    event_tx: broadcast::Sender<SessionEvent>,
    persist_path: Option<PathBuf>,
}

impl SessionRegistry {
    pub fn new(
        refresher: Arc<TokenRefresher>,
        skew: Duration,
        persist_path: Option<PathBuf>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            refresher,
            skew,
            event_tx,
            persist_path,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn persist_path(&self) -> Option<&Path> {
        self.persist_path.as_deref()
    }

    /// Initial sign-in: create the user's session or re-seed the existing one.
    pub fn sign_in(&self, user: &str, triple: TokenTriple) -> Arc<SessionController> {
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(user) {
            let existing = Arc::clone(existing);
            drop(sessions);
            existing.sign_in(triple);
            return existing;
        }

        let controller = self.controller(user, triple);
        sessions.insert(user.to_owned(), Arc::clone(&controller));
        drop(sessions);

        info!(user, "session signed in");
        let _ = self.event_tx.send(SessionEvent::SignedIn { user: user.to_owned() });
        controller
    }

    pub fn get(&self, user: &str) -> Option<Arc<SessionController>> {
        self.sessions.read().get(user).cloned()
    }

    /// Sign out: destroy the session's credentials and forget it.
    ///
    /// Returns `false` if the user had no session.
    pub fn sign_out(&self, user: &str) -> bool {
        let Some(controller) = self.sessions.write().remove(user) else {
            return false;
        };
        controller.end();
        info!(user, "session signed out");
        let _ = self.event_tx.send(SessionEvent::SignedOut { user: user.to_owned() });
        true
    }

    /// State of every session, sorted by user. Never refreshes.
    pub fn status(&self) -> Vec<SessionView> {
        let sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        let mut views: Vec<_> = sessions.iter().map(|c| c.peek()).collect();
        views.sort_by(|a, b| a.user.cmp(&b.user));
        views
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Seed sessions from persisted state. Users already signed in keep
    /// their live session. Returns the number of sessions restored.
    pub fn load_persisted(&self, persisted: &PersistedSessions) -> usize {
        let mut sessions = self.sessions.write();
        let mut restored = 0;
        for (user, session) in &persisted.sessions {
            if sessions.contains_key(user) {
                continue;
            }
            let controller = self.controller(user, session.to_triple());
            sessions.insert(user.clone(), controller);
            restored += 1;
        }
        restored
    }

    /// Sessions holding credentials, in persistable form. Sessions in a
    /// terminal error have none and are left out.
    pub fn to_persisted(&self) -> PersistedSessions {
        let sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        let sessions = sessions
            .iter()
            .filter_map(|c| {
                c.snapshot().map(|t| (c.user().to_owned(), PersistedSession::from_triple(&t)))
            })
            .collect();
        PersistedSessions { sessions }
    }

    /// Write all sessions to the persist path, if one is configured.
    pub fn persist(&self) {
        let Some(path) = self.persist_path() else {
            return;
        };
        if let Err(e) = persist::save(path, &self.to_persisted()) {
            warn!(path = %path.display(), "failed to persist sessions: {e:#}");
        }
    }

    fn controller(&self, user: &str, triple: TokenTriple) -> Arc<SessionController> {
        SessionController::new(
            user,
            triple,
            Arc::clone(&self.refresher),
            self.skew,
            self.event_tx.clone(),
        )
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
