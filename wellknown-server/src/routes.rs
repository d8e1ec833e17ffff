//! The three well-known endpoints, with the authorization gate in front
//! of the two mutating ones.
//!
//! Denials answer with a deliberately generic body; the precise reason is
//! logged server-side only, so a probing client learns nothing about which
//! check failed.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use tracing::{debug, error, info};
use wellknown_auth::authn::{LruReplayCache, RequestContext};
use wellknown_auth::gate::{Decision, DenyReason, Gate, Operation};
use wellknown_auth::paths;

use crate::current_timestamp;
use crate::registry::SqlRegistry;
use crate::store::ChallengeStore;

#[derive(Clone)]
pub struct AppState {
    gate: Arc<Gate<LruReplayCache>>,
    registry: Arc<SqlRegistry>,
    store: ChallengeStore,
}

impl AppState {
    pub fn new(
        gate: Gate<LruReplayCache>,
        registry: Arc<SqlRegistry>,
        store: ChallengeStore,
    ) -> Self {
        Self {
            gate: Arc::new(gate),
            registry,
            store,
        }
    }

    /// Run one request through the gate; on denial, the ready-made HTTP
    /// response to send back.
    fn authorize(
        &self,
        operation: Operation,
        headers: &HeaderMap,
        ctx: &RequestContext<'_>,
    ) -> Result<Option<String>, Response> {
        let header = match headers.get(AUTHORIZATION) {
            None => None,
            Some(value) => match value.to_str() {
                Ok(s) => Some(s),
                Err(_) => return Err(deny_response(&DenyReason::Malformed)),
            },
        };

        match self.gate.authorize(
            operation,
            header,
            ctx,
            current_timestamp(),
            self.registry.as_ref(),
        ) {
            Decision::Allow { username } => Ok(username),
            Decision::Deny(reason) => Err(deny_response(&reason)),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route(paths::PUBLISH, post(publish))
        .route("/.well-known/challenges/:challenge/", delete(retract))
        .route("/.well-known/acme-challenge/:challenge", get(resolve))
        .with_state(state)
}

#[derive(Deserialize)]
struct PublishBody {
    challenge: String,
    response: String,
}

async fn publish(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    // The signature covers the raw body bytes; parse only after the gate.
    let ctx = RequestContext::new("POST", paths::PUBLISH, Some(&body));
    let username = match state.authorize(Operation::Create, &headers, &ctx) {
        Ok(username) => username,
        Err(response) => return response,
    };

    let payload: PublishBody = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid request body").into_response(),
    };
    // Tokens are base64url; anything else would produce a retraction path
    // whose percent-decoded form differs from the bytes the agent signed.
    if payload.challenge.is_empty() || !is_token(&payload.challenge) {
        return (StatusCode::BAD_REQUEST, "invalid challenge token").into_response();
    }

    match state
        .store
        .insert(&payload.challenge, &payload.response, username.as_deref())
        .await
    {
        Ok(()) => {
            info!(
                challenge = %payload.challenge,
                username = username.as_deref().unwrap_or("-"),
                "challenge published"
            );
            StatusCode::CREATED.into_response()
        }
        Err(err) => internal_error(&err),
    }
}

async fn retract(
    State(state): State<AppState>,
    Path(challenge): Path<String>,
    headers: HeaderMap,
) -> Response {
    let path = paths::retraction(&challenge);
    let ctx = RequestContext::new("DELETE", &path, None);
    let username = match state.authorize(Operation::Delete, &headers, &ctx) {
        Ok(username) => username,
        Err(response) => return response,
    };

    match state.store.remove(&challenge).await {
        Ok(true) => {
            info!(
                %challenge,
                username = username.as_deref().unwrap_or("-"),
                "challenge retracted"
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => internal_error(&err),
    }
}

async fn resolve(State(state): State<AppState>, Path(challenge): Path<String>) -> Response {
    // Reads are open: the validator fetching the response has no credentials.
    let path = paths::resolution(&challenge);
    let ctx = RequestContext::new("GET", &path, None);
    if let Err(response) = state.authorize(Operation::Read, &HeaderMap::new(), &ctx) {
        return response;
    }

    match state.store.lookup(&challenge).await {
        Ok(Some(response)) => (StatusCode::OK, response).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => internal_error(&err),
    }
}

fn is_token(challenge: &str) -> bool {
    challenge
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn deny_response(reason: &DenyReason) -> Response {
    // Full reason stays in the logs; the wire answer is uniform.
    debug!(?reason, "request denied");
    match reason {
        DenyReason::MissingHeader => {
            (StatusCode::UNAUTHORIZED, "authorization required").into_response()
        }
        _ => (StatusCode::FORBIDDEN, "forbidden").into_response(),
    }
}

fn internal_error(err: &sqlx::Error) -> Response {
    error!(error = %err, "database failure");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}
