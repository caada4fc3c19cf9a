use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use tracing::{info, warn};

use super::auth::AuthSession;
use crate::config::StaticmsConfig;
use crate::content::config::TargetInfo;
use crate::content::{ContentConfig, Document};
use crate::errors::{ContentError, GitHubError, SessionError};
use crate::events::{Event, EventBus};
use crate::github::{
    Branch, CommitSummary, ContentEntry, Fallback, GitHubApi, RepoSlug,
    execute_with_branch_fallback,
};
use crate::session::SessionStore;
use crate::submission::{self, ChangeSet, PrLock};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub config: StaticmsConfig,
    pub github: Arc<dyn GitHubApi>,
    pub sessions: SessionStore,
    pub events: EventBus,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: StaticmsConfig, github: Arc<dyn GitHubApi>) -> Self {
        let sessions = SessionStore::new(config.toml.session.ttl_hours);
        Self {
            config,
            github,
            sessions,
            events: EventBus::new(),
        }
    }

    fn branch_prefix(&self) -> &str {
        &self.config.toml.content.branch_prefix
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize)]
pub struct BranchQuery {
    pub branch: Option<String>,
}

#[derive(Deserialize)]
pub struct FileQuery {
    pub path: String,
    pub branch: Option<String>,
}

#[derive(Deserialize)]
pub struct LockQuery {
    pub path: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub path: Option<String>,
    pub branch: Option<String>,
}

// ── Response payload types ────────────────────────────────────────────

#[derive(Serialize)]
pub struct ConfigResponse {
    pub path: String,
    pub branch: String,
    pub fell_back: bool,
    pub config: ContentConfig,
}

#[derive(Serialize)]
pub struct CollectionResponse {
    pub collection: String,
    pub branch: String,
    pub fell_back: bool,
    pub entries: Vec<ContentEntry>,
}

#[derive(Serialize)]
pub struct FileResponse {
    pub path: String,
    pub sha: String,
    pub branch: String,
    pub fell_back: bool,
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Mapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    pub lock: Option<PrLock>,
}

#[derive(Serialize)]
pub struct LockResponse {
    pub path: String,
    pub locked: bool,
    pub lock: Option<PrLock>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub branch: String,
    pub fell_back: bool,
    pub commits: Vec<CommitSummary>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// Submission touches files that already have an open pull request
    Locked(Vec<(String, PrLock)>),
    Unprocessable(String),
    InvalidFields {
        path: String,
        errors: Vec<crate::content::FieldError>,
    },
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, error_body(msg)),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, error_body(msg)),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(msg)),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, error_body(msg)),
            ApiError::Locked(locks) => {
                let paths: Vec<&str> = locks.iter().map(|(p, _)| p.as_str()).collect();
                let locks: Vec<serde_json::Value> = locks
                    .iter()
                    .map(|(path, lock)| serde_json::json!({"path": path, "lock": lock}))
                    .collect();
                (
                    StatusCode::CONFLICT,
                    serde_json::json!({
                        "error": format!("open pull request already edits {}", paths.join(", ")),
                        "locks": locks,
                    }),
                )
            }
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, error_body(msg)),
            ApiError::InvalidFields { path, errors } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "error": format!("Field validation failed for {}", path),
                    "path": path,
                    "fields": errors,
                }),
            ),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, error_body(msg)),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(msg)),
        };
        (status, Json(body)).into_response()
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

impl From<GitHubError> for ApiError {
    fn from(err: GitHubError) -> Self {
        let message = err.to_string();
        match err {
            GitHubError::NotFound(_) => ApiError::NotFound(message),
            GitHubError::Unauthorized(_) => ApiError::Unauthorized(message),
            GitHubError::Forbidden(_) | GitHubError::RateLimited => ApiError::Forbidden(message),
            GitHubError::Conflict(_) => ApiError::Conflict(message),
            GitHubError::Validation(_) => ApiError::Unprocessable(message),
            GitHubError::Status { .. } | GitHubError::Transport(_) | GitHubError::Decode(_) => {
                warn!(error = %message, "GitHub request failed");
                ApiError::BadGateway(message)
            }
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::InvalidFields { path, errors } => ApiError::InvalidFields { path, errors },
            ContentError::NotEditable(_) | ContentError::InvalidSubmission(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ContentError::Render(_) => ApiError::Internal(err.to_string()),
            ContentError::ConfigParse(_)
            | ContentError::ConfigInvalid(_)
            | ContentError::FrontMatter { .. }
            | ContentError::NotAMapping { .. } => ApiError::Unprocessable(err.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidState => ApiError::BadRequest(err.to_string()),
            SessionError::NotFound => ApiError::Unauthorized(err.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/user", get(current_user))
        .route("/api/repos", get(list_repos))
        .route("/api/repos/{owner}/{repo}", get(get_repo))
        .route("/api/repos/{owner}/{repo}/branches", get(list_branches))
        .route("/api/repos/{owner}/{repo}/config", get(get_config))
        .route(
            "/api/repos/{owner}/{repo}/collections/{name}",
            get(list_collection),
        )
        .route("/api/repos/{owner}/{repo}/file", get(get_file))
        .route("/api/repos/{owner}/{repo}/lock", get(get_lock))
        .route("/api/repos/{owner}/{repo}/history", get(get_history))
        .route("/api/repos/{owner}/{repo}/pulls", get(list_pulls))
        .route(
            "/api/repos/{owner}/{repo}/submissions",
            post(create_submission),
        )
}

fn repo_slug(owner: &str, repo: &str) -> Result<RepoSlug, ApiError> {
    RepoSlug::parse(&format!("{}/{}", owner, repo))
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid repository '{}/{}'", owner, repo)))
}

fn clean_path(path: &str) -> Result<String, ApiError> {
    let path = path.trim().trim_matches('/');
    if path.is_empty() || path.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return Err(ApiError::BadRequest(format!("Invalid path '{}'", path)));
    }
    Ok(path.to_string())
}

/// Fetch and parse the repository's content config. `None` when the file does not exist.
async fn load_content_config(
    state: &AppState,
    token: &str,
    repo: &RepoSlug,
    branch: Option<&str>,
) -> Result<Option<Fallback<ContentConfig>>, ApiError> {
    let path = state.config.toml.content.config_path.as_str();
    let api = state.github.as_ref();
    let fetched = execute_with_branch_fallback(api, token, repo, branch, |b| async move {
        api.get_file(token, repo, path, &b).await
    })
    .await;
    let file = match fetched {
        Ok(file) => file,
        Err(GitHubError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let config = ContentConfig::parse(&file.value.content)?;
    Ok(Some(Fallback {
        value: config,
        branch: file.branch,
        fell_back: file.fell_back,
    }))
}

async fn require_content_config(
    state: &AppState,
    token: &str,
    repo: &RepoSlug,
    branch: Option<&str>,
) -> Result<Fallback<ContentConfig>, ApiError> {
    load_content_config(state, token, repo, branch)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "{} has no {}",
                repo, state.config.toml.content.config_path
            ))
        })
}

/// Branch to work on: explicit request, else the config's preferred branch.
fn preferred_branch<'a>(
    requested: Option<&'a str>,
    config: Option<&'a ContentConfig>,
) -> Option<&'a str> {
    requested
        .filter(|b| !b.trim().is_empty())
        .or_else(|| config.and_then(|c| c.branch.as_deref()))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn current_user(AuthSession(session): AuthSession) -> impl IntoResponse {
    Json(session.user)
}

async fn list_repos(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(30).clamp(1, 100);
    let repos = state
        .github
        .list_repos(&session.token, page, per_page)
        .await?;
    Ok(Json(repos))
}

async fn get_repo(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = repo_slug(&owner, &repo)?;
    Ok(Json(state.github.get_repo(&session.token, &slug).await?))
}

async fn list_branches(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = repo_slug(&owner, &repo)?;
    let branches: Vec<Branch> = state.github.list_branches(&session.token, &slug).await?;
    Ok(Json(branches))
}

async fn get_config(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<BranchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = repo_slug(&owner, &repo)?;
    let loaded =
        require_content_config(&state, &session.token, &slug, query.branch.as_deref()).await?;
    Ok(Json(ConfigResponse {
        path: state.config.toml.content.config_path.clone(),
        branch: loaded.branch,
        fell_back: loaded.fell_back,
        config: loaded.value,
    }))
}

async fn list_collection(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Path((owner, repo, name)): Path<(String, String, String)>,
    Query(query): Query<BranchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = repo_slug(&owner, &repo)?;
    let token = session.token.as_str();
    let loaded = require_content_config(&state, token, &slug, query.branch.as_deref()).await?;
    let collection = loaded
        .value
        .collection(&name)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown collection '{}'", name)))?;

    let api = state.github.as_ref();
    let repo = &slug;
    let preferred = preferred_branch(query.branch.as_deref(), Some(&loaded.value));
    let branch = execute_with_branch_fallback(api, token, repo, preferred, |b| async move {
        api.get_branch(token, repo, &b).await
    })
    .await?;

    // A collection directory that does not exist yet simply has no entries
    let entries = match api
        .list_directory(token, &slug, &collection.path, &branch.branch)
        .await
    {
        Ok(entries) => entries,
        Err(GitHubError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let entries = entries
        .into_iter()
        .filter(|e| e.is_file() && collection.contains(&e.path))
        .collect();

    Ok(Json(CollectionResponse {
        collection: collection.name.clone(),
        branch: branch.branch,
        fell_back: branch.fell_back,
        entries,
    }))
}

async fn get_file(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<FileQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = repo_slug(&owner, &repo)?;
    let token = session.token.as_str();
    let path = clean_path(&query.path)?;

    let config = load_content_config(&state, token, &slug, query.branch.as_deref())
        .await?
        .map(|c| c.value);
    let preferred = preferred_branch(query.branch.as_deref(), config.as_ref());

    let api = state.github.as_ref();
    let repo = &slug;
    let file_path = path.as_str();
    let fetched = execute_with_branch_fallback(api, token, repo, preferred, |b| async move {
        api.get_file(token, repo, file_path, &b).await
    })
    .await?;

    let target = config.as_ref().and_then(|c| c.resolve(&path));
    let (values, parse_error) = match target {
        Some(t) => match Document::parse(&fetched.value.content, t.format(), &path) {
            Ok(doc) => (Some(doc.values(t.format())), None),
            Err(e) => (None, Some(e.to_string())),
        },
        None => (None, None),
    };
    let lock = submission::find_lock(api, token, &slug, state.branch_prefix(), &path).await?;

    Ok(Json(FileResponse {
        path: fetched.value.path,
        sha: fetched.value.sha,
        branch: fetched.branch,
        fell_back: fetched.fell_back,
        raw: fetched.value.content,
        target: target.map(|t| t.info()),
        values,
        parse_error,
        lock,
    }))
}

async fn get_lock(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<LockQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = repo_slug(&owner, &repo)?;
    let path = clean_path(&query.path)?;
    let lock = submission::find_lock(
        state.github.as_ref(),
        &session.token,
        &slug,
        state.branch_prefix(),
        &path,
    )
    .await?;
    Ok(Json(LockResponse {
        path,
        locked: lock.is_some(),
        lock,
    }))
}

async fn get_history(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Path((owner, repo)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = repo_slug(&owner, &repo)?;
    let token = session.token.as_str();
    let path = query.path.as_deref().map(clean_path).transpose()?;

    let config = load_content_config(&state, token, &slug, query.branch.as_deref())
        .await?
        .map(|c| c.value);
    let preferred = preferred_branch(query.branch.as_deref(), config.as_ref());

    let api = state.github.as_ref();
    let repo = &slug;
    let file_path = path.as_deref();
    let commits = execute_with_branch_fallback(api, token, repo, preferred, |b| async move {
        api.list_commits(token, repo, file_path, &b).await
    })
    .await?;

    Ok(Json(HistoryResponse {
        branch: commits.branch,
        fell_back: commits.fell_back,
        commits: commits.value,
    }))
}

async fn list_pulls(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = repo_slug(&owner, &repo)?;
    let pulls = submission::open_pulls(
        state.github.as_ref(),
        &session.token,
        &slug,
        state.branch_prefix(),
    )
    .await?;
    Ok(Json(pulls))
}

async fn create_submission(
    State(state): State<SharedState>,
    AuthSession(session): AuthSession,
    Path((owner, repo)): Path<(String, String)>,
    Json(change_set): Json<ChangeSet>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = repo_slug(&owner, &repo)?;
    let token = session.token.as_str();
    let api = state.github.as_ref();

    let loaded = require_content_config(&state, token, &slug, change_set.base.as_deref()).await?;
    let mut prepared = submission::prepare(&loaded.value, change_set, Utc::now())?;
    if prepared.base.is_none() {
        prepared.base = loaded.value.branch.clone();
    }

    let locks = submission::find_locks(api, token, &slug, state.branch_prefix(), &prepared.paths())
        .await?;
    if !locks.is_empty() {
        return Err(ApiError::Locked(locks));
    }

    let result = submission::submit(
        api,
        token,
        &slug,
        state.branch_prefix(),
        &prepared,
        &session.user.login,
    )
    .await?;
    info!(
        repo = %slug,
        number = result.pull_request.number,
        files = result.files.len(),
        login = %session.user.login,
        "submission opened"
    );

    state.events.publish(Event::Submitted {
        repo: slug.to_string(),
        number: result.pull_request.number,
        url: result.pull_request.html_url.clone(),
        branch: result.branch.clone(),
        files: result.files.clone(),
    });

    Ok((StatusCode::CREATED, Json(result)))
}
