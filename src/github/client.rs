//! REST access to GitHub behind the [`GitHubApi`] trait.
//!
//! Every call takes the user's access token; the client itself holds no
//! credentials, so one instance serves all sessions.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::*;
use super::oauth::{GITHUB_TOKEN_PATH, TokenResponse};
use crate::errors::GitHubError;

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;

#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Trade an OAuth authorization code for an access token.
    async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, GitHubError>;

    async fn current_user(&self, token: &str) -> Result<GitHubUser, GitHubError>;

    /// One page of repositories the user can access, most recently updated first.
    async fn list_repos(
        &self,
        token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<GitHubRepo>, GitHubError>;

    async fn get_repo(&self, token: &str, repo: &RepoSlug) -> Result<GitHubRepo, GitHubError>;

    async fn list_branches(&self, token: &str, repo: &RepoSlug)
    -> Result<Vec<Branch>, GitHubError>;

    async fn get_branch(
        &self,
        token: &str,
        repo: &RepoSlug,
        branch: &str,
    ) -> Result<Branch, GitHubError>;

    async fn create_branch(
        &self,
        token: &str,
        repo: &RepoSlug,
        branch: &str,
        from_sha: &str,
    ) -> Result<GitRef, GitHubError>;

    async fn get_file(
        &self,
        token: &str,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent, GitHubError>;

    async fn list_directory(
        &self,
        token: &str,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<ContentEntry>, GitHubError>;

    async fn put_file(
        &self,
        token: &str,
        repo: &RepoSlug,
        file: &PutFile,
    ) -> Result<PutFileResult, GitHubError>;

    /// Recent commits on `git_ref`, optionally restricted to one path.
    async fn list_commits(
        &self,
        token: &str,
        repo: &RepoSlug,
        path: Option<&str>,
        git_ref: &str,
    ) -> Result<Vec<CommitSummary>, GitHubError>;

    /// All pull requests in `state`.
    async fn list_pull_requests(
        &self,
        token: &str,
        repo: &RepoSlug,
        state: PullState,
    ) -> Result<Vec<PullRequest>, GitHubError>;

    async fn list_pull_request_files(
        &self,
        token: &str,
        repo: &RepoSlug,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, GitHubError>;

    async fn create_pull_request(
        &self,
        token: &str,
        repo: &RepoSlug,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError>;
}

/// [`GitHubApi`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    api_url: String,
    oauth_url: String,
    user_agent: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct RawCommit {
    sha: String,
    html_url: String,
    commit: RawCommitDetail,
}

#[derive(Deserialize)]
struct RawCommitDetail {
    message: String,
    author: Option<RawCommitAuthor>,
}

#[derive(Deserialize)]
struct RawCommitAuthor {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct RawPutResponse {
    content: RawPutContent,
    commit: GitObject,
}

#[derive(Deserialize)]
struct RawPutContent {
    path: String,
    sha: String,
}

/// Decode a contents-endpoint payload into text.
pub(crate) fn decode_content(raw: RawFileContent) -> Result<FileContent, GitHubError> {
    let encoded = raw.content.unwrap_or_default();
    let text = match raw.encoding.as_deref() {
        Some("base64") => {
            let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact)
                .map_err(|e| GitHubError::Decode(format!("{}: invalid base64: {}", raw.path, e)))?;
            String::from_utf8(bytes)
                .map_err(|_| GitHubError::Decode(format!("{} is not UTF-8 text", raw.path)))?
        }
        Some("none") => {
            return Err(GitHubError::Decode(format!(
                "{} is too large to edit ({} bytes)",
                raw.path, raw.size
            )));
        }
        _ => encoded,
    };
    Ok(FileContent {
        path: raw.path,
        sha: raw.sha,
        size: raw.size,
        content: text,
    })
}

impl RestClient {
    pub fn new(api_url: &str, oauth_url: &str, user_agent: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            oauth_url: oauth_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    /// Build an API URL from path segments; each segment is percent-encoded.
    fn endpoint<'a, I>(&self, segments: I) -> Result<Url, GitHubError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| GitHubError::Decode(format!("invalid API URL {}: {}", self.api_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| GitHubError::Decode(format!("API URL {} cannot be a base", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_endpoint<'a, I>(&self, repo: &'a RepoSlug, rest: I) -> Result<Url, GitHubError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.endpoint(
            ["repos", repo.owner.as_str(), repo.name.as_str()]
                .into_iter()
                .chain(rest),
        )
    }

    fn contents_endpoint(&self, repo: &RepoSlug, path: &str) -> Result<Url, GitHubError> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        self.repo_endpoint(repo, std::iter::once("contents").chain(segments))
    }

    fn request(&self, method: Method, token: &str, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", &self.user_agent)
    }

    async fn check(resp: Response) -> Result<Response, GitHubError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let exhausted = resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(text);
        Err(GitHubError::from_status(status.as_u16(), message, exhausted))
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, GitHubError> {
        let resp = builder.send().await.map_err(GitHubError::Transport)?;
        let resp = Self::check(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| GitHubError::Decode(e.to_string()))
    }

    /// Fetch every page of a list endpoint.
    async fn paginate<T: DeserializeOwned>(
        &self,
        token: &str,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, GitHubError> {
        let mut all = Vec::new();
        let mut page = 1u32;
        let per_page = PAGE_SIZE.to_string();
        loop {
            let page_str = page.to_string();
            let items: Vec<T> = Self::send(
                self.request(Method::GET, token, url.clone())
                    .query(query)
                    .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]),
            )
            .await?;
            let count = items.len();
            all.extend(items);
            if count < PAGE_SIZE {
                break; // Last page
            }
            page += 1;
        }
        Ok(all)
    }
}

#[async_trait]
impl GitHubApi for RestClient {
    async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, GitHubError> {
        let url = format!("{}{}", self.oauth_url, GITHUB_TOKEN_PATH);
        let resp = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(GitHubError::Transport)?;
        let resp = Self::check(resp).await?;
        let token = resp
            .json::<TokenResponse>()
            .await
            .map_err(|e| GitHubError::Decode(e.to_string()))?;
        token.into_access_token()
    }

    async fn current_user(&self, token: &str) -> Result<GitHubUser, GitHubError> {
        Self::send(self.request(Method::GET, token, self.endpoint(["user"])?)).await
    }

    async fn list_repos(
        &self,
        token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<GitHubRepo>, GitHubError> {
        let url = self.endpoint(["user", "repos"])?;
        Self::send(self.request(Method::GET, token, url).query(&[
            ("sort", "updated".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ]))
        .await
    }

    async fn get_repo(&self, token: &str, repo: &RepoSlug) -> Result<GitHubRepo, GitHubError> {
        Self::send(self.request(Method::GET, token, self.repo_endpoint(repo, [])?)).await
    }

    async fn list_branches(
        &self,
        token: &str,
        repo: &RepoSlug,
    ) -> Result<Vec<Branch>, GitHubError> {
        let url = self.repo_endpoint(repo, ["branches"])?;
        self.paginate(token, url, &[]).await
    }

    async fn get_branch(
        &self,
        token: &str,
        repo: &RepoSlug,
        branch: &str,
    ) -> Result<Branch, GitHubError> {
        let url = self.repo_endpoint(repo, ["branches", branch])?;
        Self::send(self.request(Method::GET, token, url)).await
    }

    async fn create_branch(
        &self,
        token: &str,
        repo: &RepoSlug,
        branch: &str,
        from_sha: &str,
    ) -> Result<GitRef, GitHubError> {
        let url = self.repo_endpoint(repo, ["git", "refs"])?;
        debug!(repo = %repo, branch, from_sha, "creating branch");
        Self::send(self.request(Method::POST, token, url).json(&serde_json::json!({
            "ref": format!("refs/heads/{}", branch),
            "sha": from_sha,
        })))
        .await
    }

    async fn get_file(
        &self,
        token: &str,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent, GitHubError> {
        let url = self.contents_endpoint(repo, path)?;
        let raw: RawFileContent =
            Self::send(self.request(Method::GET, token, url).query(&[("ref", git_ref)])).await?;
        decode_content(raw)
    }

    async fn list_directory(
        &self,
        token: &str,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<ContentEntry>, GitHubError> {
        let url = self.contents_endpoint(repo, path)?;
        Self::send(self.request(Method::GET, token, url).query(&[("ref", git_ref)])).await
    }

    async fn put_file(
        &self,
        token: &str,
        repo: &RepoSlug,
        file: &PutFile,
    ) -> Result<PutFileResult, GitHubError> {
        let url = self.contents_endpoint(repo, &file.path)?;
        let mut body = serde_json::json!({
            "message": file.message,
            "content": STANDARD.encode(file.content.as_bytes()),
            "branch": file.branch,
        });
        if let Some(ref sha) = file.sha {
            body["sha"] = serde_json::Value::String(sha.clone());
        }
        debug!(repo = %repo, path = %file.path, branch = %file.branch, "writing file");
        let resp: RawPutResponse =
            Self::send(self.request(Method::PUT, token, url).json(&body)).await?;
        Ok(PutFileResult {
            path: resp.content.path,
            content_sha: resp.content.sha,
            commit_sha: resp.commit.sha,
        })
    }

    async fn list_commits(
        &self,
        token: &str,
        repo: &RepoSlug,
        path: Option<&str>,
        git_ref: &str,
    ) -> Result<Vec<CommitSummary>, GitHubError> {
        let url = self.repo_endpoint(repo, ["commits"])?;
        let mut query = vec![("sha", git_ref), ("per_page", "30")];
        if let Some(path) = path {
            query.push(("path", path));
        }
        let raw: Vec<RawCommit> =
            Self::send(self.request(Method::GET, token, url).query(&query)).await?;
        Ok(raw
            .into_iter()
            .map(|c| CommitSummary {
                sha: c.sha,
                message: c.commit.message,
                author: c.commit.author.as_ref().and_then(|a| a.name.clone()),
                date: c.commit.author.and_then(|a| a.date),
                html_url: c.html_url,
            })
            .collect())
    }

    async fn list_pull_requests(
        &self,
        token: &str,
        repo: &RepoSlug,
        state: PullState,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let url = self.repo_endpoint(repo, ["pulls"])?;
        self.paginate(token, url, &[("state", state.as_str())]).await
    }

    async fn list_pull_request_files(
        &self,
        token: &str,
        repo: &RepoSlug,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, GitHubError> {
        let number = number.to_string();
        let url = self.repo_endpoint(repo, ["pulls", number.as_str(), "files"])?;
        self.paginate(token, url, &[]).await
    }

    async fn create_pull_request(
        &self,
        token: &str,
        repo: &RepoSlug,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        let url = self.repo_endpoint(repo, ["pulls"])?;
        Self::send(self.request(Method::POST, token, url).json(&serde_json::json!({
            "title": pr.title,
            "body": pr.body,
            "head": pr.head,
            "base": pr.base,
        })))
        .await
    }
}
