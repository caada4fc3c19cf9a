//! GitHub OAuth web flow helpers and token format checks.

use reqwest::Url;
use serde::Deserialize;

use crate::errors::GitHubError;

pub const GITHUB_AUTHORIZE_PATH: &str = "/login/oauth/authorize";
pub const GITHUB_TOKEN_PATH: &str = "/login/oauth/access_token";

/// Scope needed to read contents, push branches and open pull requests.
pub const OAUTH_SCOPE: &str = "repo";

/// Response from GitHub's token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// GitHub answers 200 even for failures; the error lives in the body.
    pub fn into_access_token(self) -> Result<String, GitHubError> {
        if let Some(token) = self.access_token.filter(|t| !t.is_empty()) {
            return Ok(token);
        }
        match (self.error, self.error_description) {
            (Some(err), Some(desc)) => Err(GitHubError::Unauthorized(format!("{}: {}", err, desc))),
            (Some(err), None) => Err(GitHubError::Unauthorized(err)),
            _ => Err(GitHubError::Decode(
                "token response had neither access_token nor error".to_string(),
            )),
        }
    }
}

/// URL the browser is sent to for authorization.
pub fn authorize_url(
    oauth_url: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<String, GitHubError> {
    let base = format!("{}{}", oauth_url.trim_end_matches('/'), GITHUB_AUTHORIZE_PATH);
    let mut url = Url::parse(&base)
        .map_err(|e| GitHubError::Decode(format!("invalid OAuth URL {}: {}", base, e)))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", OAUTH_SCOPE)
        .append_pair("state", state)
        .append_pair("allow_signup", "false");
    Ok(url.into())
}

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server tokens
    "ghr_",        // GitHub App refresh tokens
];

/// Format check only; does not verify the token is active or scoped.
pub fn is_valid_github_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    GITHUB_TOKEN_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}
