//! Turning edited content into a branch, commits and a pull request.
//!
//! Submission is two-phase. [`prepare`] is pure: it checks every file
//! against the content config and renders the final file text. [`submit`]
//! then talks to GitHub. Nothing is written to GitHub unless every file
//! prepared cleanly.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use tracing::{info, warn};
use uuid::Uuid;

use crate::content::config::TargetInfo;
use crate::content::{ContentConfig, ContentTarget, Document, apply_defaults, slugify, validate_values};
use crate::errors::{ContentError, GitHubError};
use crate::github::{
    GitHubApi, NewPullRequest, PullRequest, PullState, PutFile, RepoSlug,
    execute_with_branch_fallback,
};

const SUFFIX_LEN: usize = 8;

/// A set of edits submitted together as one pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeSet {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Branch to propose against; the repository default when absent
    #[serde(default)]
    pub base: Option<String>,
    pub files: Vec<FileChange>,
}

/// One edited file. Carries either form `values` or `raw` text, not both.
///
/// New collection entries may name a `collection` instead of a `path`; the
/// path is then built from the collection's filename template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileChange {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub values: Option<Mapping>,
    #[serde(default)]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedFile {
    pub path: String,
    pub content: String,
    pub target: TargetInfo,
    /// Path was derived from a collection template; must not exist yet
    pub new_entry: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChangeSet {
    pub title: String,
    pub description: String,
    pub base: Option<String>,
    pub files: Vec<PreparedFile>,
}

impl PreparedChangeSet {
    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Outcome of a successful [`submit`].
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub pull_request: PullRequest,
    pub branch: String,
    pub base: String,
    pub base_fell_back: bool,
    pub files: Vec<String>,
}

/// An open pull request that already touches a content file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrLock {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub head_ref: String,
}

/// Check a change set against the content config and render each file.
pub fn prepare(
    config: &ContentConfig,
    change_set: ChangeSet,
    now: DateTime<Utc>,
) -> Result<PreparedChangeSet, ContentError> {
    let title = change_set.title.trim().to_string();
    if title.is_empty() {
        return Err(ContentError::InvalidSubmission(
            "title must not be empty".into(),
        ));
    }
    if change_set.files.is_empty() {
        return Err(ContentError::InvalidSubmission("no files to submit".into()));
    }

    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(change_set.files.len());
    for change in change_set.files {
        let file = prepare_file(config, change, now)?;
        if !seen.insert(file.path.clone()) {
            return Err(ContentError::InvalidSubmission(format!(
                "'{}' appears more than once",
                file.path
            )));
        }
        files.push(file);
    }

    Ok(PreparedChangeSet {
        title,
        description: change_set.description.trim().to_string(),
        base: change_set
            .base
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty()),
        files,
    })
}

fn prepare_file(
    config: &ContentConfig,
    change: FileChange,
    now: DateTime<Utc>,
) -> Result<PreparedFile, ContentError> {
    let (target, path, new_entry) = match (change.path.as_deref(), change.collection.as_deref()) {
        (Some(path), _) => {
            let path = path.trim().trim_start_matches('/').to_string();
            let target = config
                .resolve(&path)
                .ok_or_else(|| ContentError::NotEditable(path.clone()))?;
            (target, path, false)
        }
        (None, Some(name)) => {
            let collection = config.collection(name).ok_or_else(|| {
                ContentError::InvalidSubmission(format!("unknown collection '{}'", name))
            })?;
            let values = change.values.as_ref().ok_or_else(|| {
                ContentError::InvalidSubmission(format!(
                    "new entries in '{}' need form values",
                    name
                ))
            })?;
            // Template placeholders may refer to defaulted fields
            let mut values = values.clone();
            apply_defaults(&collection.fields, &mut values);
            let path = collection.entry_path(&values, now)?;
            (ContentTarget::Collection(collection), path, true)
        }
        (None, None) => {
            return Err(ContentError::InvalidSubmission(
                "every file needs a path or a collection".into(),
            ));
        }
    };

    let content = match (change.values, change.raw) {
        (Some(mut values), None) => {
            apply_defaults(target.fields(), &mut values);
            let errors = validate_values(target.fields(), &values);
            if !errors.is_empty() {
                return Err(ContentError::InvalidFields { path, errors });
            }
            let format = target.format();
            Document::from_values(values, format).render(format)?
        }
        (None, Some(raw)) => raw,
        _ => {
            return Err(ContentError::InvalidSubmission(format!(
                "'{}' must carry exactly one of values or raw",
                path
            )));
        }
    };

    Ok(PreparedFile {
        path,
        content,
        target: target.info(),
        new_entry,
    })
}

/// Name of the branch a submission is pushed to.
pub fn branch_name(prefix: &str, title: &str) -> String {
    let mut slug = slugify(title);
    if slug.is_empty() {
        slug = "changes".to_string();
    }
    // Keep ref names readable in the GitHub UI
    if slug.len() > 48 {
        slug.truncate(48);
        slug = slug.trim_end_matches('-').to_string();
    }
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}-{}", prefix, slug, &suffix[..SUFFIX_LEN])
}

/// Body of the pull request: description plus attribution footer.
pub fn pull_request_body(description: &str, login: &str) -> String {
    let footer = format!("Submitted via Staticms by @{}", login);
    if description.is_empty() {
        footer
    } else {
        format!("{}\n\n---\n{}", description, footer)
    }
}

/// Push a prepared change set to a new branch and open a pull request.
pub async fn submit<A: GitHubApi + ?Sized>(
    api: &A,
    token: &str,
    repo: &RepoSlug,
    prefix: &str,
    prepared: &PreparedChangeSet,
    login: &str,
) -> Result<Submission, GitHubError> {
    let base = execute_with_branch_fallback(api, token, repo, prepared.base.as_deref(), |b| {
        async move { api.get_branch(token, repo, &b).await }
    })
    .await?;

    // Blob shas on the base, looked up before anything is written
    let mut existing_shas = Vec::with_capacity(prepared.files.len());
    for file in &prepared.files {
        let sha = match api.get_file(token, repo, &file.path, &base.branch).await {
            Ok(current) => Some(current.sha),
            Err(GitHubError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if file.new_entry && sha.is_some() {
            return Err(GitHubError::Conflict(format!(
                "'{}' already exists on {}",
                file.path, base.branch
            )));
        }
        existing_shas.push(sha);
    }

    let branch = branch_name(prefix, &prepared.title);
    api.create_branch(token, repo, &branch, &base.value.commit.sha)
        .await?;
    info!(repo = %repo, branch = %branch, base = %base.branch, "created submission branch");

    for (file, existing) in prepared.files.iter().zip(existing_shas) {
        let message = match existing {
            Some(_) => format!("Update {}", file.path),
            None => format!("Create {}", file.path),
        };
        let put = PutFile {
            path: file.path.clone(),
            branch: branch.clone(),
            message,
            content: file.content.clone(),
            sha: existing,
        };
        if let Err(e) = api.put_file(token, repo, &put).await {
            warn!(repo = %repo, branch = %branch, path = %file.path, error = %e, "commit failed, branch left behind");
            return Err(e);
        }
    }

    let pull_request = api
        .create_pull_request(
            token,
            repo,
            &NewPullRequest {
                title: prepared.title.clone(),
                body: pull_request_body(&prepared.description, login),
                head: branch.clone(),
                base: base.branch.clone(),
            },
        )
        .await?;
    info!(repo = %repo, number = pull_request.number, "opened pull request");

    Ok(Submission {
        pull_request,
        branch,
        base: base.branch,
        base_fell_back: base.fell_back,
        files: prepared.paths(),
    })
}

/// Open pull requests created by this server (head ref under `prefix`).
pub async fn open_pulls<A: GitHubApi + ?Sized>(
    api: &A,
    token: &str,
    repo: &RepoSlug,
    prefix: &str,
) -> Result<Vec<PullRequest>, GitHubError> {
    Ok(api
        .list_pull_requests(token, repo, PullState::Open)
        .await?
        .into_iter()
        .filter(|pr| pr.head.ref_name.starts_with(prefix))
        .collect())
}

/// Locks for each of `paths`; paths without an open pull request are omitted.
pub async fn find_locks<A: GitHubApi + ?Sized>(
    api: &A,
    token: &str,
    repo: &RepoSlug,
    prefix: &str,
    paths: &[String],
) -> Result<Vec<(String, PrLock)>, GitHubError> {
    let mut remaining: Vec<&String> = paths.iter().collect();
    let mut locks = Vec::new();
    for pr in open_pulls(api, token, repo, prefix).await? {
        if remaining.is_empty() {
            break;
        }
        let files = api.list_pull_request_files(token, repo, pr.number).await?;
        remaining.retain(|path| {
            if !files.iter().any(|f| &f.filename == *path) {
                return true;
            }
            locks.push((
                (*path).clone(),
                PrLock {
                    number: pr.number,
                    title: pr.title.clone(),
                    url: pr.html_url.clone(),
                    head_ref: pr.head.ref_name.clone(),
                },
            ));
            false
        });
    }
    Ok(locks)
}

/// The first open pull request touching `path`, if any.
pub async fn find_lock<A: GitHubApi + ?Sized>(
    api: &A,
    token: &str,
    repo: &RepoSlug,
    prefix: &str,
    path: &str,
) -> Result<Option<PrLock>, GitHubError> {
    let paths = [path.trim_start_matches('/').to_string()];
    Ok(find_locks(api, token, repo, prefix, &paths)
        .await?
        .into_iter()
        .next()
        .map(|(_, lock)| lock))
}
