//! HTTP front for the Slack Events webhook.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::annotator::ReactionAnnotator;
use super::payload::Inbound;
use super::signature::SignatureVerifier;

#[derive(Clone)]
pub struct AppState {
    verifier: Arc<SignatureVerifier>,
    annotator: Arc<ReactionAnnotator>,
}

impl AppState {
    pub fn new(verifier: SignatureVerifier, annotator: ReactionAnnotator) -> Self {
        Self {
            verifier: Arc::new(verifier),
            annotator: Arc::new(annotator),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(%addr, "Listening for Slack events");
    axum::serve(listener, build_router(state))
        .await
        .context("Listener server failed")
}

async fn health() -> &'static str {
    "ok"
}

async fn slack_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(e) = state.verifier.verify(&headers, &body, Utc::now()) {
        warn!(error = %e, "Rejected unsigned request");
        return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
    }

    let inbound = match Inbound::parse(&body) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(error = %e, "Request body is not JSON");
            return (StatusCode::BAD_REQUEST, "Bad JSON").into_response();
        }
    };

    match inbound {
        Inbound::UrlVerification { challenge } => {
            info!("URL verification handshake");
            ([(header::CONTENT_TYPE, "text/plain")], challenge).into_response()
        }
        Inbound::ReactionAdded { ts, reaction } => {
            // Slack retries non-2xx responses, so annotator faults still ack
            if let Err(e) = state.annotator.annotate(&ts, &reaction).await {
                error!(%ts, %reaction, error = %e, "Failed to record reaction");
            }
            ok()
        }
        Inbound::Ignored => {
            debug!("Ignoring event");
            ok()
        }
    }
}

fn ok() -> Response {
    (StatusCode::OK, "OK").into_response()
}
