//! Repository notifications fanned out to browsers over SSE.
//!
//! Events come from two places: GitHub webhook deliveries (`push`,
//! `pull_request`) and submissions made through this server. Browsers
//! subscribe per repository and refresh whatever they are showing.

use std::collections::BTreeSet;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::broadcast;
use tracing::debug;

use crate::errors::WebhookError;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    Push {
        repo: String,
        branch: String,
        before: String,
        after: String,
        files: Vec<String>,
    },
    PullRequest {
        repo: String,
        number: u64,
        action: String,
        merged: bool,
        head_ref: String,
        base_ref: String,
        title: String,
        url: String,
    },
    Submitted {
        repo: String,
        number: u64,
        url: String,
        branch: String,
        files: Vec<String>,
    },
}

impl Event {
    /// `owner/name` of the repository the event concerns.
    pub fn repo(&self) -> &str {
        match self {
            Event::Push { repo, .. }
            | Event::PullRequest { repo, .. }
            | Event::Submitted { repo, .. } => repo,
        }
    }

    /// SSE event name; matches the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Push { .. } => "push",
            Event::PullRequest { .. } => "pull_request",
            Event::Submitted { .. } => "submitted",
        }
    }

    /// Repository names compare case-insensitively on GitHub.
    pub fn concerns(&self, repo: &str) -> bool {
        self.repo().eq_ignore_ascii_case(repo)
    }
}

/// Broadcast hub between event producers and SSE connections.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Send to every subscriber; returns how many received it.
    pub fn publish(&self, event: Event) -> usize {
        let kind = event.kind();
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(kind, delivered, "event published");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ── Webhooks ─────────────────────────────────────────────────────────

/// What a webhook delivery turned into.
#[derive(Debug, PartialEq)]
pub enum WebhookOutcome {
    Ping,
    Event(Event),
    Ignored(String),
}

/// Check `X-Hub-Signature-256` against the raw request body.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;
    let expected = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .and_then(|h| hex::decode(h).ok())
        .ok_or(WebhookError::BadSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::BadSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::BadSignature)
}

/// Signature header value GitHub would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

#[derive(Deserialize)]
struct RepositoryPayload {
    full_name: String,
}

#[derive(Deserialize, Default)]
struct CommitPayload {
    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    modified: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
}

#[derive(Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    before: String,
    #[serde(default)]
    after: String,
    repository: RepositoryPayload,
    #[serde(default)]
    commits: Vec<CommitPayload>,
}

#[derive(Deserialize)]
struct PullRequestRefPayload {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Deserialize)]
struct PullRequestBody {
    title: String,
    html_url: String,
    #[serde(default)]
    merged: bool,
    head: PullRequestRefPayload,
    base: PullRequestRefPayload,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    action: String,
    number: u64,
    pull_request: PullRequestBody,
    repository: RepositoryPayload,
}

/// Turn a webhook delivery (`X-GitHub-Event` name plus body) into an event.
pub fn parse_webhook(event_name: &str, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
    let malformed = |source| WebhookError::Malformed {
        event: event_name.to_string(),
        source,
    };
    match event_name {
        "ping" => Ok(WebhookOutcome::Ping),
        "push" => {
            let payload: PushPayload = serde_json::from_slice(body).map_err(malformed)?;
            Ok(WebhookOutcome::Event(push_event(payload)))
        }
        "pull_request" => {
            let payload: PullRequestPayload = serde_json::from_slice(body).map_err(malformed)?;
            Ok(WebhookOutcome::Event(Event::PullRequest {
                repo: payload.repository.full_name,
                number: payload.number,
                action: payload.action,
                merged: payload.pull_request.merged,
                head_ref: payload.pull_request.head.ref_name,
                base_ref: payload.pull_request.base.ref_name,
                title: payload.pull_request.title,
                url: payload.pull_request.html_url,
            }))
        }
        other => Ok(WebhookOutcome::Ignored(other.to_string())),
    }
}

fn push_event(payload: PushPayload) -> Event {
    let files: BTreeSet<String> = payload
        .commits
        .into_iter()
        .flat_map(|c| c.added.into_iter().chain(c.modified).chain(c.removed))
        .collect();
    let branch = payload
        .git_ref
        .strip_prefix("refs/heads/")
        .unwrap_or(&payload.git_ref)
        .to_string();
    Event::Push {
        repo: payload.repository.full_name,
        branch,
        before: payload.before,
        after: payload.after,
        files: files.into_iter().collect(),
    }
}
