//! Sign-in routes and the session extractor.
//!
//! Two ways in: the OAuth web flow (`/api/auth/login` → GitHub →
//! `/api/auth/callback`) when a client id and secret are configured, or a
//! pasted personal access token via `POST /api/auth/token`.

use axum::{
    Json, Router,
    extract::{FromRequestParts, Query, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::api::{ApiError, SharedState};
use crate::github::oauth::{authorize_url, is_valid_github_token};
use crate::session::{Session, clear_cookie, read_cookie, session_cookie};

/// A request made with a live session. Rejects with 401 otherwise.
pub struct AuthSession(pub Session);

impl FromRequestParts<SharedState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let cookie_name = &state.config.toml.session.cookie_name;
        let id = read_cookie(&parts.headers, cookie_name)
            .ok_or_else(|| ApiError::Unauthorized("Not signed in".into()))?;
        let session = state.sessions.get(&id).await?;
        Ok(AuthSession(session))
    }
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Deserialize)]
pub struct TokenLoginRequest {
    pub token: String,
}

#[derive(Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub oauth_configured: bool,
}

pub fn auth_router() -> Router<SharedState> {
    Router::new()
        .route("/api/auth/status", get(auth_status))
        .route("/api/auth/login", get(login))
        .route("/api/auth/callback", get(callback))
        .route("/api/auth/token", post(token_login))
        .route("/api/auth/logout", post(logout))
}

async fn auth_status(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    let session = match read_cookie(&headers, &state.config.toml.session.cookie_name) {
        Some(id) => state.sessions.get(&id).await.ok(),
        None => None,
    };
    Json(AuthStatus {
        authenticated: session.is_some(),
        login: session.as_ref().map(|s| s.user.login.clone()),
        avatar_url: session.and_then(|s| s.user.avatar_url),
        oauth_configured: state.config.oauth_configured(),
    })
}

async fn login(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let github = &state.config.toml.github;
    let client_id = match (&github.client_id, state.config.oauth_configured()) {
        (Some(id), true) => id,
        _ => {
            return Err(ApiError::BadRequest(
                "GitHub OAuth is not configured; sign in with a token instead".into(),
            ));
        }
    };
    let login_state = state.sessions.begin_login().await;
    let url = authorize_url(
        &github.oauth_url,
        client_id,
        &state.config.redirect_uri(),
        &login_state,
    )?;
    Ok(Redirect::to(&url))
}

async fn callback(
    State(state): State<SharedState>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or_default();
        warn!(error = %error, detail = %detail, "GitHub declined authorization");
        return Err(ApiError::BadRequest(format!(
            "GitHub authorization failed: {} {}",
            error, detail
        )));
    }
    let login_state = query
        .state
        .ok_or_else(|| ApiError::BadRequest("Missing state".into()))?;
    state.sessions.finish_login(&login_state).await?;
    let code = query
        .code
        .ok_or_else(|| ApiError::BadRequest("Missing code".into()))?;

    let github = &state.config.toml.github;
    let (Some(client_id), Some(client_secret)) = (&github.client_id, &github.client_secret)
    else {
        return Err(ApiError::BadRequest("GitHub OAuth is not configured".into()));
    };
    let token = state
        .github
        .exchange_code(client_id, client_secret, &code, &state.config.redirect_uri())
        .await?;

    let (cookie, _) = start_session(&state, token).await?;
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")))
}

async fn token_login(
    State(state): State<SharedState>,
    Json(request): Json<TokenLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = request.token.trim().to_string();
    if !is_valid_github_token(&token) {
        return Err(ApiError::BadRequest(
            "That does not look like a GitHub token".into(),
        ));
    }
    let (cookie, session) = start_session(&state, token).await?;
    let status = AuthStatus {
        authenticated: true,
        login: Some(session.user.login),
        avatar_url: session.user.avatar_url,
        oauth_configured: state.config.oauth_configured(),
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(status)))
}

/// Resolve the token's user, store the session, and build its cookie.
async fn start_session(state: &SharedState, token: String) -> Result<(String, Session), ApiError> {
    let user = state.github.current_user(&token).await?;
    info!(login = %user.login, "signed in");
    let session = state.sessions.create(token, user).await;
    let settings = &state.config.toml.session;
    let cookie = session_cookie(
        &settings.cookie_name,
        &session.id,
        state.sessions.ttl(),
        settings.secure_cookie,
    );
    Ok((cookie, session))
}

async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    let cookie_name = &state.config.toml.session.cookie_name;
    if let Some(id) = read_cookie(&headers, cookie_name)
        && state.sessions.remove(&id).await
    {
        info!("signed out");
    }
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_cookie(cookie_name))],
    )
}
