//! Server-side sessions keyed by an opaque cookie value.
//!
//! The GitHub access token never leaves the server: the browser only holds
//! the session id. Sessions live in memory and are lost on restart.

use std::collections::HashMap;

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::errors::SessionError;
use crate::github::GitHubUser;

/// How long an OAuth `state` value stays redeemable.
const LOGIN_STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    #[serde(skip)]
    pub token: String,
    pub user: GitHubUser,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    login_states: RwLock<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_hours: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            login_states: RwLock::new(HashMap::new()),
            ttl: Duration::hours(ttl_hours.min(i64::MAX as u64 / 3600) as i64),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a new session and return it.
    pub async fn create(&self, token: String, user: GitHubUser) -> Session {
        self.create_at(token, user, Utc::now()).await
    }

    async fn create_at(&self, token: String, user: GitHubUser, now: DateTime<Utc>) -> Session {
        let session = Session {
            id: Uuid::new_v4().simple().to_string(),
            token,
            user,
            created_at: now,
            last_seen: now,
        };
        debug!(login = %session.user.login, "session created");
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Look up a live session, refreshing its idle timer. Expired sessions are dropped.
    pub async fn get(&self, id: &str) -> Result<Session, SessionError> {
        self.get_at(id, Utc::now()).await
    }

    async fn get_at(&self, id: &str, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().await;
        let expired = match sessions.get_mut(id) {
            None => return Err(SessionError::NotFound),
            Some(session) if now - session.last_seen >= self.ttl => true,
            Some(session) => {
                session.last_seen = now;
                return Ok(session.clone());
            }
        };
        if expired {
            sessions.remove(id);
        }
        Err(SessionError::NotFound)
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired sessions and login states; returns how many sessions went.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now()).await
    }

    async fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_seen < self.ttl);
        let removed = before - sessions.len();
        drop(sessions);

        self.login_states
            .write()
            .await
            .retain(|_, created| now - *created < Duration::minutes(LOGIN_STATE_TTL_MINUTES));
        removed
    }

    /// Issue a one-time OAuth `state` value.
    pub async fn begin_login(&self) -> String {
        self.begin_login_at(Utc::now()).await
    }

    async fn begin_login_at(&self, now: DateTime<Utc>) -> String {
        let state = Uuid::new_v4().simple().to_string();
        self.login_states.write().await.insert(state.clone(), now);
        state
    }

    /// Redeem an OAuth `state` value. Each value works at most once.
    pub async fn finish_login(&self, state: &str) -> Result<(), SessionError> {
        self.finish_login_at(state, Utc::now()).await
    }

    async fn finish_login_at(&self, state: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        match self.login_states.write().await.remove(state) {
            Some(created) if now - created < Duration::minutes(LOGIN_STATE_TTL_MINUTES) => Ok(()),
            _ => Err(SessionError::InvalidState),
        }
    }
}

/// `Set-Cookie` value for a session.
pub fn session_cookie(name: &str, id: &str, ttl: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name,
        id,
        ttl.num_seconds().max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that deletes the session cookie.
pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

/// Read a cookie value from request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user() -> GitHubUser {
        GitHubUser {
            login: "octocat".into(),
            id: 1,
            name: None,
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = SessionStore::new(1);
        let session = store.create("gho_abc".into(), user()).await;
        assert_eq!(session.id.len(), 32);

        let found = store.get(&session.id).await.unwrap();
        assert_eq!(found.token, "gho_abc");
        assert_eq!(found.user.login, "octocat");
        assert_eq!(store.get("nope").await.unwrap_err(), SessionError::NotFound);
    }

    #[tokio::test]
    async fn expired_sessions_are_removed_on_access() {
        let store = SessionStore::new(1);
        let start = Utc::now();
        let session = store.create_at("t".into(), user(), start).await;

        // Activity slides the window
        store
            .get_at(&session.id, start + Duration::minutes(50))
            .await
            .unwrap();
        store
            .get_at(&session.id, start + Duration::minutes(100))
            .await
            .unwrap();

        let later = start + Duration::minutes(161);
        assert!(store.get_at(&session.id, later).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let store = SessionStore::new(1);
        let start = Utc::now();
        store.create_at("old".into(), user(), start).await;
        store
            .create_at("new".into(), user(), start + Duration::minutes(30))
            .await;

        let removed = store.purge_expired_at(start + Duration::minutes(61)).await;
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn remove_logs_out() {
        let store = SessionStore::new(1);
        let session = store.create("t".into(), user()).await;
        assert!(store.remove(&session.id).await);
        assert!(!store.remove(&session.id).await);
        assert!(store.get(&session.id).await.is_err());
    }

    #[tokio::test]
    async fn login_state_is_single_use() {
        let store = SessionStore::new(1);
        let state = store.begin_login().await;
        assert!(store.finish_login(&state).await.is_ok());
        assert_eq!(
            store.finish_login(&state).await.unwrap_err(),
            SessionError::InvalidState
        );
        assert!(store.finish_login("forged").await.is_err());
    }

    #[tokio::test]
    async fn login_state_expires() {
        let store = SessionStore::new(1);
        let start = Utc::now();
        let state = store.begin_login_at(start).await;
        assert!(
            store
                .finish_login_at(&state, start + Duration::minutes(11))
                .await
                .is_err()
        );
    }

    #[test]
    fn cookie_formatting() {
        let cookie = session_cookie("sid", "abc", Duration::hours(1), false);
        assert_eq!(cookie, "sid=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600");
        assert!(session_cookie("sid", "abc", Duration::hours(1), true).ends_with("; Secure"));
        assert!(clear_cookie("sid").contains("Max-Age=0"));
    }

    #[test]
    fn reads_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; sid=abc123"));
        headers.append(COOKIE, HeaderValue::from_static("other=1"));
        assert_eq!(read_cookie(&headers, "sid").as_deref(), Some("abc123"));
        assert_eq!(read_cookie(&headers, "other").as_deref(), Some("1"));
        assert_eq!(read_cookie(&headers, "missing"), None);

        let mut empty = HeaderMap::new();
        empty.insert(COOKIE, HeaderValue::from_static("sid="));
        assert_eq!(read_cookie(&empty, "sid"), None);
    }
}
