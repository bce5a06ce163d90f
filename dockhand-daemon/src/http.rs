//! Webhook listener.
//!
//! `GET` or `POST`:
//!
//! | path       | query                 | job                  |
//! |------------|-----------------------|----------------------|
//! | `/update`  | `token`               | full pass            |
//! | `/start`   | `token`, `service`    | direct `up`          |
//! | `/stop`    | `token`, `service`    | direct `down`        |
//! | `/restart` | `token`, `service`    | direct `restart`     |
//!
//! Admitted jobs are answered `202` and run in the background.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{Extensions, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use dockhand_core::{Action, ServiceName};
use dockhand_reconcile::Job;

use crate::dispatch::DaemonState;

#[derive(Clone)]
struct HttpState {
    daemon: Arc<DaemonState>,
    token: Option<Arc<str>>,
}

#[derive(Debug, Deserialize)]
struct TriggerQuery {
    token: Option<String>,
    service: Option<String>,
}

/// Build the webhook router. Without a configured `token` every request is
/// refused.
pub fn build_router(daemon: Arc<DaemonState>, token: Option<String>) -> Router {
    let state = HttpState {
        daemon,
        token: token.filter(|t| !t.is_empty()).map(Arc::from),
    };
    Router::new()
        .route("/update", get(update).post(update))
        .route("/start", get(start).post(start))
        .route("/stop", get(stop).post(stop))
        .route("/restart", get(restart).post(restart))
        .with_state(state)
}

async fn update(
    State(state): State<HttpState>,
    Query(query): Query<TriggerQuery>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    trigger(&state, &query, &headers, &extensions, None)
}

async fn start(
    State(state): State<HttpState>,
    Query(query): Query<TriggerQuery>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    trigger(&state, &query, &headers, &extensions, Some(Action::Up))
}

async fn stop(
    State(state): State<HttpState>,
    Query(query): Query<TriggerQuery>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    trigger(&state, &query, &headers, &extensions, Some(Action::Down))
}

async fn restart(
    State(state): State<HttpState>,
    Query(query): Query<TriggerQuery>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    trigger(&state, &query, &headers, &extensions, Some(Action::Restart))
}

fn trigger(
    state: &HttpState,
    query: &TriggerQuery,
    headers: &HeaderMap,
    extensions: &Extensions,
    direct: Option<Action>,
) -> Response {
    let source_ip = client_ip(headers, extensions);
    if !token_matches(state.token.as_deref(), query.token.as_deref()) {
        tracing::warn!(source_ip = %source_ip, "webhook rejected: bad token");
        return (StatusCode::UNAUTHORIZED, "invalid token\n").into_response();
    }

    let job = match direct {
        None => Job::Pass,
        Some(action) => match query.service.as_deref().filter(|s| !s.is_empty()) {
            Some(service) => Job::Direct {
                action,
                service: ServiceName::from(service),
            },
            None => {
                return (StatusCode::BAD_REQUEST, "missing service\n").into_response();
            }
        },
    };

    tracing::info!(source_ip = %source_ip, %job, "webhook trigger");
    match state.daemon.admit(job, "http") {
        Ok(()) => (StatusCode::ACCEPTED, "accepted\n").into_response(),
        Err(err) if err.is_busy() => (StatusCode::CONFLICT, "pass in progress\n").into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n")).into_response(),
    }
}

fn token_matches(expected: Option<&str>, given: Option<&str>) -> bool {
    match (expected, given) {
        (Some(expected), Some(given)) => {
            // Constant-time over the shorter length; lengths compared last.
            let eq = expected
                .bytes()
                .zip(given.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b));
            eq == 0 && expected.len() == given.len()
        }
        _ => false,
    }
}

/// `X-Real-IP`, else the first `X-Forwarded-For` hop, else the peer address.
fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    header("x-real-ip")
        .or_else(|| header("x-forwarded-for"))
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
