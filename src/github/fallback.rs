//! Retry a ref-scoped GitHub operation on the default branch when the
//! preferred branch does not exist.
//!
//! Content configs name a preferred branch (`branch: staging`), and users
//! pick branches in the UI. Either can point at a branch that was deleted or
//! never pushed; reads and submissions then retry once against the
//! repository's default branch instead of failing outright.

use std::future::Future;

use serde::Serialize;
use tracing::warn;

use super::client::GitHubApi;
use super::models::RepoSlug;
use crate::errors::GitHubError;

/// Result of an operation plus the branch it actually ran against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fallback<T> {
    pub value: T,
    pub branch: String,
    pub fell_back: bool,
}

/// Run `op` on `preferred` (or the default branch when there is no
/// preference). When it fails because the branch is missing, run it once more
/// on the default branch.
///
/// A `NotFound` from `op` may mean the *object* is missing rather than the
/// branch, so the branch is looked up before falling back; if it exists the
/// original error is returned unchanged.
pub async fn execute_with_branch_fallback<A, T, F, Fut>(
    api: &A,
    token: &str,
    repo: &RepoSlug,
    preferred: Option<&str>,
    op: F,
) -> Result<Fallback<T>, GitHubError>
where
    A: GitHubApi + ?Sized,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, GitHubError>>,
{
    let preferred = preferred.map(str::trim).filter(|b| !b.is_empty());
    let Some(branch) = preferred else {
        let default = api.get_repo(token, repo).await?.default_branch;
        let value = op(default.clone()).await?;
        return Ok(Fallback {
            value,
            branch: default,
            fell_back: false,
        });
    };

    let err = match op(branch.to_string()).await {
        Ok(value) => {
            return Ok(Fallback {
                value,
                branch: branch.to_string(),
                fell_back: false,
            });
        }
        Err(e) if e.is_missing_branch() => e,
        Err(e) => return Err(e),
    };

    match api.get_branch(token, repo, branch).await {
        Ok(_) => return Err(err),
        Err(GitHubError::NotFound(_)) => {}
        Err(other) => return Err(other),
    }

    let default = api.get_repo(token, repo).await?.default_branch;
    if default == branch {
        return Err(err);
    }

    warn!(
        repo = %repo,
        requested = branch,
        fallback = %default,
        "branch not found, retrying on default branch"
    );
    let value = op(default.clone()).await?;
    Ok(Fallback {
        value,
        branch: default,
        fell_back: true,
    })
}
