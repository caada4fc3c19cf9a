//! HTTP surface: JSON API, auth, event stream and the embedded UI.
//!
//! | Module     | Responsibility                                               |
//! |------------|--------------------------------------------------------------|
//! | `api`      | `AppState`, `ApiError`, repository and content routes        |
//! | `auth`     | OAuth/token sign-in, logout, `AuthSession` extractor         |
//! | `stream`   | `/api/events` SSE and the GitHub webhook receiver            |
//! | `embedded` | Compiled browser UI served from the binary (`rust-embed`)    |

pub mod api;
pub mod auth;
pub mod embedded;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::StaticmsConfig;
use crate::github::{GitHubApi, RestClient};
pub use api::{ApiError, AppState, SharedState};

/// How often expired sessions and login states are swept.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Options for [`start_server`].
pub struct ServerConfig {
    pub settings: StaticmsConfig,
    /// Open the UI in the default browser once listening
    pub open_browser: bool,
}

impl ServerConfig {
    pub fn new(settings: StaticmsConfig) -> Self {
        Self {
            settings,
            open_browser: false,
        }
    }
}

/// Build the full application router with API, auth, events and SPA serving.
pub fn build_router(state: SharedState) -> Router {
    let dev_mode = state.config.toml.server.dev_mode;
    let mut app = api::api_router()
        .merge(auth::auth_router())
        .merge(stream::stream_router())
        .fallback(embedded::static_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Periodically drop expired sessions until the state is gone.
fn spawn_session_purge(state: &SharedState) {
    let weak = Arc::downgrade(state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(state) = weak.upgrade() else {
                break;
            };
            let removed = state.sessions.purge_expired().await;
            if removed > 0 {
                debug!(removed, "purged expired sessions");
            }
        }
    });
}

/// Start the Staticms server and run until Ctrl-C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let settings = config.settings;
    for warning in settings.validate() {
        warn!("config: {}", warning);
    }
    if !settings.oauth_configured() {
        info!("GitHub OAuth not configured; users sign in with a personal access token");
    }
    if settings.toml.github.webhook_secret.is_none() {
        warn!("no webhook secret configured; GitHub deliveries are accepted unverified");
    }

    let github = &settings.toml.github;
    let client: Arc<dyn GitHubApi> = Arc::new(RestClient::new(
        &github.api_url,
        &github.oauth_url,
        &github.user_agent,
    ));

    let addr = settings.bind_addr();
    let public_url = settings.public_url();
    let state = Arc::new(AppState::new(settings, client));
    spawn_session_purge(&state);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, url = %public_url, "Staticms listening");
    println!("Staticms running at {}", public_url);

    if config.open_browser
        && let Err(e) = open::that(&public_url)
    {
        warn!(error = %e, "could not open browser");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
