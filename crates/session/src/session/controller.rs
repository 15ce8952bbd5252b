// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle controller: owns one session's credentials and makes
//! sure at most one refresh is in flight for it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::credential::refresh::TokenRefresher;
use crate::credential::store::CredentialStore;
use crate::credential::TokenTriple;
use crate::error::AuthError;
use crate::session::{Phase, SessionEvent, SessionView};

type RefreshOutcome = Result<TokenTriple, AuthError>;

/// The single pending-refresh slot. Every caller that needs a refresh while
/// one is running awaits a clone of this instead of starting another.
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct Inner {
    store: CredentialStore,
    pending: Option<PendingRefresh>,
    /// Bumped by sign-in, sign-out, and rejection. A refresh started under
    /// an older generation must not write its result.
    generation: u64,
}

impl Inner {
    fn phase(&self) -> Phase {
        if self.store.error().is_some() {
            Phase::TerminalError
        } else if self.pending.is_some() {
            Phase::Refreshing
        } else {
            Phase::Valid
        }
    }
}

/// Either an answer available right now, or a refresh to wait on.
enum Plan {
    Ready(RefreshOutcome),
    Wait(PendingRefresh),
}

/// Owns the state of one signed-in session.
pub struct SessionController {
    user: String,
    refresher: Arc<TokenRefresher>,
    skew: Duration,
    inner: Mutex<Inner>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        user: impl Into<String>,
        triple: TokenTriple,
        refresher: Arc<TokenRefresher>,
        skew: Duration,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            user: user.into(),
            refresher,
            skew,
            inner: Mutex::new(Inner {
                store: CredentialStore::new(triple),
                pending: None,
                generation: 0,
            }),
            event_tx,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase()
    }

    /// Current triple without any validity check or I/O.
    pub fn snapshot(&self) -> Option<TokenTriple> {
        self.inner.lock().store.read().cloned()
    }

    /// Re-seed the session from a fresh sign-in.
    ///
    /// Takes priority over everything else: clears the error flag and
    /// detaches any in-flight refresh so its result is discarded.
    pub fn sign_in(&self, triple: TokenTriple) {
        {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.pending = None;
            inner.store.write(triple);
            inner.store.clear_error();
        }
        info!(user = %self.user, "session signed in");
        let _ = self.event_tx.send(SessionEvent::SignedIn { user: self.user.clone() });
    }

    /// Destroy the credentials (sign-out). The registry announces it.
    pub(crate) fn end(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.pending = None;
        inner.store.clear();
    }

    /// Return a usable access token, refreshing first if it is inside the
    /// skew window or already expired.
    pub async fn access_token(self: &Arc<Self>) -> RefreshOutcome {
        let skew = self.skew;
        self.drive("token expired", |store, now| {
            if store.is_valid(now, skew) {
                store.read().cloned()
            } else {
                None
            }
        })
        .await
    }

    /// Refresh now, even if the current token is still valid.
    ///
    /// Joins the pending refresh instead when one is already running.
    pub async fn force_refresh(self: &Arc<Self>) -> RefreshOutcome {
        self.drive("forced", |_, _| None).await
    }

    /// Refresh because a downstream service rejected `rejected`.
    ///
    /// If the session already moved past that token (another caller
    /// refreshed it), the current valid token is returned without a new
    /// exchange.
    pub async fn refresh_rejected(self: &Arc<Self>, rejected: &TokenTriple) -> RefreshOutcome {
        let skew = self.skew;
        self.drive("downstream rejected token", |store, now| {
            store
                .read()
                .filter(|t| t.access_token != rejected.access_token)
                .filter(|_| store.is_valid(now, skew))
                .cloned()
        })
        .await
    }

    /// Escalate a second downstream rejection to a terminal error.
    ///
    /// Ignored if the session no longer holds `rejected` (it was re-seeded
    /// or refreshed in the meantime).
    pub fn reject(&self, rejected: &TokenTriple) -> AuthError {
        let err = AuthError::RejectedAfterRefresh;
        {
            let mut inner = self.inner.lock();
            let holds_rejected =
                inner.store.read().is_some_and(|t| t.access_token == rejected.access_token);
            if !holds_rejected {
                debug!(user = %self.user, "rejected token already replaced, not escalating");
                return err;
            }
            inner.generation += 1;
            inner.pending = None;
            inner.store.mark_terminal_error(err.clone());
        }
        error!(user = %self.user, "access token rejected after forced refresh, re-authentication required");
        let _ = self
            .event_tx
            .send(SessionEvent::TerminalError { user: self.user.clone(), error: err.to_string() });
        err
    }

    /// Session read for the UI: refreshes when needed, then reports state.
    pub async fn read(self: &Arc<Self>) -> SessionView {
        if let Err(e) = self.access_token().await {
            debug!(user = %self.user, error = %e, "session read found terminal error");
        }
        self.peek()
    }

    /// Session state for the UI without refreshing.
    pub fn peek(&self) -> SessionView {
        let inner = self.inner.lock();
        let now = Instant::now();
        let triple = inner.store.read();
        let error = inner.store.error();
        SessionView {
            user: self.user.clone(),
            phase: inner.phase(),
            access_token: triple.map(|t| t.access_token.clone()),
            error: error.map(|e| e.code().to_owned()),
            error_detail: error.map(|e| e.to_string()),
            expires_in_secs: triple.and_then(|t| t.expires_in(now)).map(|d| d.as_secs()),
            has_refresh_token: triple.is_some_and(|t| t.refresh_token.is_some()),
        }
    }

    async fn drive(
        self: &Arc<Self>,
        reason: &'static str,
        reuse: impl FnOnce(&CredentialStore, Instant) -> Option<TokenTriple>,
    ) -> RefreshOutcome {
        match self.plan(reason, reuse) {
            Plan::Ready(outcome) => outcome,
            Plan::Wait(pending) => pending.await,
        }
    }

    fn plan(
        self: &Arc<Self>,
        reason: &'static str,
        reuse: impl FnOnce(&CredentialStore, Instant) -> Option<TokenTriple>,
    ) -> Plan {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.store.error() {
            return Plan::Ready(Err(err.clone()));
        }
        if let Some(pending) = inner.pending.clone() {
            debug!(user = %self.user, reason, "joining in-flight refresh");
            return Plan::Wait(pending);
        }
        if let Some(triple) = reuse(&inner.store, Instant::now()) {
            return Plan::Ready(Ok(triple));
        }
        Plan::Wait(self.start_refresh(&mut inner, reason))
    }

    /// Spawn the refresh and park its shared outcome in the pending slot.
    ///
    /// The refresh runs as its own task so that dropping a waiter never
    /// cancels it.
    fn start_refresh(self: &Arc<Self>, inner: &mut Inner, reason: &'static str) -> PendingRefresh {
        let refresh_token = inner.store.read().and_then(|t| t.refresh_token.clone());
        let generation = inner.generation;
        info!(user = %self.user, reason, "refreshing access token");

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = controller.refresher.refresh(refresh_token.as_deref()).await;
            controller.complete(generation, outcome)
        });

        let controller = Arc::clone(self);
        let pending = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    controller.complete(generation, Err(AuthError::RefreshAborted(e.to_string())))
                }
            }
        }
        .boxed()
        .shared();

        inner.pending = Some(pending.clone());
        pending
    }

    /// Apply a finished refresh to the store (if still current) and announce it.
    fn complete(&self, generation: u64, outcome: RefreshOutcome) -> RefreshOutcome {
        let event = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                debug!(user = %self.user, "discarding result of a superseded refresh");
                return outcome;
            }
            inner.pending = None;
            match &outcome {
                Ok(triple) => {
                    inner.store.write(triple.clone());
                    SessionEvent::Refreshed { user: self.user.clone() }
                }
                Err(e) => {
                    inner.store.mark_terminal_error(e.clone());
                    SessionEvent::TerminalError { user: self.user.clone(), error: e.to_string() }
                }
            }
        };

        match &event {
            SessionEvent::TerminalError { error, .. } => {
                error!(user = %self.user, error = %error, "token refresh failed, re-authentication required");
            }
            _ => info!(user = %self.user, "access token refreshed"),
        }
        let _ = self.event_tx.send(event);
        outcome
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
