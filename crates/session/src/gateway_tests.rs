// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::any;
use axum::Router;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::*;
use crate::credential::refresh::TokenRefresher;
use crate::session::Phase;
use crate::test_support::{fast_policy, grant, serve, test_client, ScriptedEndpoint, Step};

/// Downstream API stand-in: accepts only the listed bearer tokens and
/// records what it saw.
#[derive(Default)]
struct Downstream {
    accepted: Mutex<HashSet<String>>,
    seen: Mutex<Vec<(String, String)>>,
}

impl Downstream {
    fn accept(&self, token: &str) {
        self.accepted.lock().insert(token.to_owned());
    }

    /// `(bearer token, body)` for each request received.
    fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().clone()
    }
}

async fn downstream_handler(
    State(downstream): State<Arc<Downstream>>,
    headers: HeaderMap,
    body: String,
) -> (axum::http::StatusCode, String) {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_owned();
    downstream.seen.lock().push((token.clone(), body));
    if downstream.accepted.lock().contains(&token) {
        (axum::http::StatusCode::OK, format!("hello {token}"))
    } else {
        (axum::http::StatusCode::UNAUTHORIZED, "invalid credentials".to_owned())
    }
}

struct Harness {
    gateway: Gateway,
    session: Arc<SessionController>,
    endpoint: Arc<ScriptedEndpoint>,
    downstream: Arc<Downstream>,
    base: String,
}

impl Harness {
    async fn new(steps: Vec<Step>, refresh_token: Option<&str>) -> anyhow::Result<Self> {
        let downstream = Arc::new(Downstream::default());
        let app = Router::new()
            .route("/{*path}", any(downstream_handler))
            .with_state(Arc::clone(&downstream));
        let addr = serve(app).await?;

        let endpoint = ScriptedEndpoint::new(steps);
        let refresher = Arc::new(TokenRefresher::new(endpoint.clone(), fast_policy()));
        let (event_tx, _) = broadcast::channel(16);
        let session = SessionController::new(
            "ada",
            TokenTriple::new(
                "A1",
                refresh_token.map(str::to_owned),
                Some(Instant::now() + Duration::from_secs(3600)),
            ),
            refresher,
            Duration::from_secs(300),
            event_tx,
        );

        Ok(Self {
            gateway: Gateway::new(test_client()),
            session,
            endpoint,
            downstream,
            base: format!("http://{addr}"),
        })
    }

    fn post(&self, body: &str) -> anyhow::Result<reqwest::Request> {
        Ok(self
            .gateway
            .client()
            .post(format!("{}/gmail/v1/users/me/messages/send", self.base))
            .body(body.to_owned())
            .build()?)
    }
}

#[tokio::test]
async fn valid_token_is_attached_without_refresh() -> anyhow::Result<()> {
    let h = Harness::new(vec![grant("A2", 3600)], Some("R1")).await?;
    h.downstream.accept("A1");

    let resp = h.gateway.call(&h.session, h.post("msg")?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await?, "hello A1");
    assert_eq!(h.endpoint.calls(), 0);
    assert_eq!(h.downstream.seen(), vec![("A1".to_owned(), "msg".to_owned())]);
    Ok(())
}

#[tokio::test]
async fn rejection_forces_one_refresh_and_one_retry() -> anyhow::Result<()> {
    let h = Harness::new(vec![grant("A2", 3600)], Some("R1")).await?;
    h.downstream.accept("A2");

    let resp = h.gateway.call(&h.session, h.post("msg")?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.endpoint.calls(), 1);
    assert_eq!(
        h.downstream.seen(),
        vec![("A1".to_owned(), "msg".to_owned()), ("A2".to_owned(), "msg".to_owned())]
    );
    assert_eq!(h.session.phase(), Phase::Valid);
    Ok(())
}

#[tokio::test]
async fn second_rejection_is_terminal() -> anyhow::Result<()> {
    let h = Harness::new(vec![grant("A2", 3600)], Some("R1")).await?;

    let result = h.gateway.call(&h.session, h.post("msg")?).await;
    assert!(matches!(result, Err(GatewayError::Auth(AuthError::RejectedAfterRefresh))));
    assert_eq!(h.downstream.seen().len(), 2);
    assert_eq!(h.endpoint.calls(), 1);
    assert_eq!(h.session.phase(), Phase::TerminalError);

    // Terminal: later calls fail without reaching downstream.
    let result = h.gateway.call(&h.session, h.post("again")?).await;
    assert!(matches!(result, Err(GatewayError::Auth(_))));
    assert_eq!(h.downstream.seen().len(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_refresh_after_rejection_surfaces_auth_error() -> anyhow::Result<()> {
    let h = Harness::new(vec![Step::Status(400)], Some("R1")).await?;

    let result = h.gateway.call(&h.session, h.post("msg")?).await;
    assert!(matches!(
        result,
        Err(GatewayError::Auth(AuthError::RefreshExhausted { attempts: 3, .. }))
    ));
    assert_eq!(h.downstream.seen().len(), 1);
    assert_eq!(h.session.phase(), Phase::TerminalError);
    Ok(())
}

#[tokio::test]
async fn missing_refresh_token_after_rejection_is_terminal() -> anyhow::Result<()> {
    let h = Harness::new(vec![grant("A2", 3600)], None).await?;

    let result = h.gateway.call(&h.session, h.post("msg")?).await;
    assert!(matches!(result, Err(GatewayError::Auth(AuthError::MissingRefreshCredential))));
    assert_eq!(h.endpoint.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn non_auth_errors_pass_through() -> anyhow::Result<()> {
    let downstream = Router::new().route(
        "/{*path}",
        any(|| async { (axum::http::StatusCode::FORBIDDEN, "quota exceeded") }),
    );
    let addr = serve(downstream).await?;
    let h = Harness::new(vec![grant("A2", 3600)], Some("R1")).await?;

    let request = h.gateway.client().get(format!("http://{addr}/gmail/v1/users/me/labels")).build()?;
    let resp = h.gateway.call(&h.session, request).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.endpoint.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn unreachable_downstream_is_a_transport_error() -> anyhow::Result<()> {
    let h = Harness::new(vec![grant("A2", 3600)], Some("R1")).await?;
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let request = h.gateway.client().get(format!("http://{addr}/gmail/v1/users/me/labels")).build()?;
    let result = h.gateway.call(&h.session, request).await;
    assert!(matches!(result, Err(GatewayError::Transport(_))));
    assert_eq!(h.session.phase(), Phase::Valid);
    Ok(())
}
