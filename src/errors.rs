//! Typed error hierarchy for Staticms.
//!
//! One enum per library subsystem:
//! - `GitHubError`: REST calls against the GitHub API
//! - `ContentError`: content config and document handling
//! - `SessionError`: login state and session lookups
//! - `WebhookError`: incoming GitHub webhook deliveries
//!
//! The HTTP layer folds all of them into `server::api::ApiError`.

use thiserror::Error;

/// Errors from the GitHub REST client.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub resource not found: {0}")]
    NotFound(String),

    #[error("GitHub rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("GitHub denied access: {0}")]
    Forbidden(String),

    #[error("GitHub reported a conflict: {0}")]
    Conflict(String),

    #[error("GitHub validation failed: {0}")]
    Validation(String),

    #[error("GitHub rate limit exhausted")]
    RateLimited,

    #[error("GitHub returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to reach GitHub: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to decode GitHub response: {0}")]
    Decode(String),
}

impl GitHubError {
    /// Classify a non-success response by status code and GitHub's `message` field.
    pub fn from_status(status: u16, message: String, rate_limit_exhausted: bool) -> Self {
        match status {
            401 => GitHubError::Unauthorized(message),
            403 | 429 if rate_limit_exhausted => GitHubError::RateLimited,
            403 => GitHubError::Forbidden(message),
            404 => GitHubError::NotFound(message),
            409 => GitHubError::Conflict(message),
            422 => GitHubError::Validation(message),
            _ => GitHubError::Status { status, message },
        }
    }

    /// True when the error means the requested ref does not exist.
    pub fn is_missing_branch(&self) -> bool {
        match self {
            GitHubError::NotFound(_) => true,
            GitHubError::Validation(msg) => msg.contains("No commit found for the ref"),
            _ => false,
        }
    }
}

/// Errors from content config parsing, document parsing and validation.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Failed to parse content config: {0}")]
    ConfigParse(#[source] serde_yaml::Error),

    #[error("Invalid content config: {}", .0.join("; "))]
    ConfigInvalid(Vec<String>),

    #[error("Failed to parse front matter in {path}: {source}")]
    FrontMatter {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Expected a YAML mapping in {path}")]
    NotAMapping { path: String },

    #[error("Failed to render document: {0}")]
    Render(#[source] serde_yaml::Error),

    #[error("Path '{0}' is not editable under the content config")]
    NotEditable(String),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("Field validation failed for {path}")]
    InvalidFields {
        path: String,
        errors: Vec<crate::content::FieldError>,
    },
}

/// Errors from the session store.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("Unknown or expired login state")]
    InvalidState,

    #[error("Session not found or expired")]
    NotFound,
}

/// Errors from verifying and decoding GitHub webhook deliveries.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing X-Hub-Signature-256 header")]
    MissingSignature,

    #[error("Webhook signature does not match")]
    BadSignature,

    #[error("Malformed {event} payload: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}
