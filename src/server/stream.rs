//! Server-Sent-Events endpoint and the GitHub webhook receiver feeding it.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::api::{ApiError, SharedState};
use super::auth::AuthSession;
use crate::errors::WebhookError;
use crate::events::{WebhookOutcome, parse_webhook, verify_signature};

/// Interval between SSE keep-alive comments.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const DELIVERY_HEADER: &str = "x-github-delivery";

#[derive(Deserialize)]
pub struct EventsQuery {
    /// `owner/name`; all repositories when omitted
    pub repo: Option<String>,
}

pub fn stream_router() -> Router<SharedState> {
    Router::new()
        .route("/api/events", get(events_handler))
        .route("/api/webhooks/github", post(github_webhook))
}

async fn events_handler(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let filter = query.repo.filter(|r| !r.trim().is_empty());
    debug!(login = %session.user.login, repo = ?filter, "event stream opened");

    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(move |received| {
        match received {
            Ok(event) if filter.as_deref().is_none_or(|r| event.concerns(r)) => {
                match SseEvent::default().event(event.kind()).json_data(&event) {
                    Ok(sse) => Some(Ok(sse)),
                    Err(e) => {
                        warn!(error = %e, "failed to encode event");
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "event stream lagged, dropping missed events");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::MissingSignature | WebhookError::BadSignature => {
                ApiError::Unauthorized(err.to_string())
            }
            WebhookError::Malformed { .. } => ApiError::BadRequest(err.to_string()),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn github_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if let Some(secret) = state
        .config
        .toml
        .github
        .webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        verify_signature(secret, &body, header_str(&headers, SIGNATURE_HEADER))?;
    }

    let event_name = header_str(&headers, EVENT_HEADER)
        .ok_or_else(|| ApiError::BadRequest("Missing X-GitHub-Event header".into()))?;
    let delivery = header_str(&headers, DELIVERY_HEADER).unwrap_or("-");

    match parse_webhook(event_name, &body)? {
        WebhookOutcome::Ping => Ok((StatusCode::OK, "pong").into_response()),
        WebhookOutcome::Event(event) => {
            let delivered = state.events.publish(event.clone());
            info!(
                delivery,
                kind = event.kind(),
                repo = event.repo(),
                delivered,
                "webhook received"
            );
            Ok(Json(serde_json::json!({ "delivered": delivered })).into_response())
        }
        WebhookOutcome::Ignored(name) => {
            debug!(delivery, event = %name, "webhook ignored");
            Ok(StatusCode::ACCEPTED.into_response())
        }
    }
}
