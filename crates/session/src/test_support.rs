// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit tests: a scripted in-memory token endpoint and
//! loopback axum servers.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::time::Instant;

use crate::credential::endpoint::{AttemptError, TokenEndpoint, TokenResponse};
use crate::credential::refresh::{RetryPolicy, TokenRefresher};

static INIT: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub fn test_client() -> reqwest::Client {
    ensure_crypto_provider();
    reqwest::Client::new()
}

/// Serve `app` on an ephemeral loopback port.
pub async fn serve(app: Router) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(addr)
}

/// What the scripted endpoint does on one call.
#[derive(Debug, Clone)]
pub enum Step {
    Grant { access: &'static str, refresh: Option<&'static str>, expires_in: Option<u64> },
    Status(u16),
    /// Never answers; only the refresher's timeout ends the attempt.
    Hang,
}

pub fn grant(access: &'static str, expires_in: u64) -> Step {
    Step::Grant { access, refresh: None, expires_in: Some(expires_in) }
}

/// In-memory [`TokenEndpoint`] that plays back a script of responses.
///
/// Once the script runs out the last step repeats.
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    latency: Duration,
    calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    seen: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedEndpoint {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Self::with_latency(steps, Duration::ZERO)
    }

    pub fn with_latency(steps: Vec<Step>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            last: Mutex::new(None),
            latency,
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented, in call order.
    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    /// Instants at which each call started.
    pub fn call_times(&self) -> Vec<Instant> {
        self.seen.lock().iter().map(|(at, _)| *at).collect()
    }

    fn next_step(&self) -> Step {
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Step::Status(500)),
        }
    }

    async fn play(&self, refresh_token: &str) -> Result<TokenResponse, AttemptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push((Instant::now(), refresh_token.to_owned()));
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let step = self.next_step();
        let result = match step {
            Step::Grant { access, refresh, expires_in } => Ok(TokenResponse {
                access_token: access.to_owned(),
                refresh_token: refresh.map(str::to_owned),
                expires_in,
            }),
            Step::Status(status) => {
                Err(AttemptError::Status { status, body: "scripted failure".to_owned() })
            }
            Step::Hang => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return std::future::pending().await;
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl TokenEndpoint for ScriptedEndpoint {
    fn exchange<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse, AttemptError>> {
        self.play(refresh_token).boxed()
    }
}

/// Retry policy with the production schedule (3 attempts, 2s/4s backoff).
pub fn default_refresher(endpoint: Arc<ScriptedEndpoint>) -> Arc<TokenRefresher> {
    Arc::new(TokenRefresher::new(endpoint, RetryPolicy::default()))
}

/// Retry policy with millisecond backoff for tests running on the real clock.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        attempt_timeout: Duration::from_secs(5),
        backoff_base: Duration::from_millis(1),
        backoff_cap: Duration::from_millis(4),
    }
}
