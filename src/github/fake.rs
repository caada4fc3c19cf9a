//! In-memory [`GitHubApi`] used by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::GitHubApi;
use super::models::*;
use crate::errors::GitHubError;

pub const TEST_TOKEN: &str = "gho_test";

#[derive(Default)]
struct FakeRepo {
    info: Option<GitHubRepo>,
    /// branch -> head sha
    heads: HashMap<String, String>,
    /// branch -> path -> (content, blob sha)
    files: HashMap<String, BTreeMap<String, (String, String)>>,
    commits: Vec<(String, String, CommitSummary)>,
    pulls: Vec<(PullRequest, Vec<String>)>,
}

#[derive(Default)]
struct FakeState {
    repos: HashMap<String, FakeRepo>,
    tokens: HashSet<String>,
    codes: HashMap<String, String>,
    calls: Vec<String>,
    counter: u64,
    fail_put: Option<String>,
}

impl FakeState {
    fn next_sha(&mut self) -> String {
        self.counter += 1;
        format!("{:040x}", self.counter)
    }

    fn repo(&mut self, slug: &RepoSlug) -> Result<&mut FakeRepo, GitHubError> {
        self.repos
            .get_mut(&slug.to_string())
            .ok_or_else(|| GitHubError::NotFound("Not Found".into()))
    }
}

pub struct FakeGitHub {
    state: Mutex<FakeState>,
    user: GitHubUser,
}

fn no_ref(branch: &str) -> GitHubError {
    GitHubError::NotFound(format!("No commit found for the ref {}", branch))
}

impl FakeGitHub {
    pub fn new() -> Self {
        let mut state = FakeState::default();
        state.tokens.insert(TEST_TOKEN.to_string());
        Self {
            state: Mutex::new(state),
            user: GitHubUser {
                login: "octocat".into(),
                id: 1,
                name: Some("The Octocat".into()),
                avatar_url: None,
            },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: &str, token: &str) -> Result<(), GitHubError> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        if state.tokens.contains(token) {
            Ok(())
        } else {
            Err(GitHubError::Unauthorized("Bad credentials".into()))
        }
    }

    pub fn add_repo(&self, owner: &str, name: &str, default_branch: &str) -> RepoSlug {
        let slug = RepoSlug::new(owner, name);
        let mut state = self.lock();
        let sha = state.next_sha();
        let mut repo = FakeRepo {
            info: Some(GitHubRepo {
                full_name: slug.to_string(),
                name: name.to_string(),
                private: false,
                html_url: format!("https://github.com/{}", slug),
                description: None,
                default_branch: default_branch.to_string(),
                permissions: None,
            }),
            ..FakeRepo::default()
        };
        repo.heads.insert(default_branch.to_string(), sha);
        repo.files.insert(default_branch.to_string(), BTreeMap::new());
        state.repos.insert(slug.to_string(), repo);
        slug
    }

    /// Create `branch` as a copy of `from`.
    pub fn add_branch(&self, repo: &str, branch: &str, from: &str) {
        let mut state = self.lock();
        let r = state.repos.get_mut(repo).unwrap();
        let head = r.heads[from].clone();
        let files = r.files[from].clone();
        r.heads.insert(branch.to_string(), head);
        r.files.insert(branch.to_string(), files);
    }

    /// Seed a file directly, bypassing the API.
    pub fn put(&self, repo: &str, branch: &str, path: &str, content: &str) {
        let mut state = self.lock();
        let sha = state.next_sha();
        let r = state.repos.get_mut(repo).unwrap();
        r.files
            .get_mut(branch)
            .unwrap()
            .insert(path.to_string(), (content.to_string(), sha));
    }

    /// Seed an open pull request touching `files`.
    pub fn add_pull(&self, repo: &str, number: u64, head: &str, files: &[&str]) {
        let mut state = self.lock();
        let r = state.repos.get_mut(repo).unwrap();
        r.pulls.push((
            PullRequest {
                number,
                title: format!("PR {}", number),
                body: None,
                state: "open".into(),
                html_url: format!("https://github.com/{}/pull/{}", repo, number),
                head: PullRequestRef {
                    ref_name: head.to_string(),
                    sha: "0".into(),
                },
                base: PullRequestRef {
                    ref_name: "main".into(),
                    sha: "0".into(),
                },
                user: Some(PullRequestUser {
                    login: "octocat".into(),
                }),
                created_at: None,
            },
            files.iter().map(|f| f.to_string()).collect(),
        ));
    }

    /// Mark a seeded pull request as closed.
    pub fn close_pull(&self, repo: &str, number: u64) {
        let mut state = self.lock();
        let r = state.repos.get_mut(repo).unwrap();
        for (pull, _) in r.pulls.iter_mut().filter(|(p, _)| p.number == number) {
            pull.state = "closed".into();
        }
    }

    pub fn add_code(&self, code: &str, token: &str) {
        let mut state = self.lock();
        state.codes.insert(code.to_string(), token.to_string());
        state.tokens.insert(token.to_string());
    }

    /// Make `put_file` fail for this path.
    pub fn fail_put_for(&self, path: &str) {
        self.lock().fail_put = Some(path.to_string());
    }

    pub fn file(&self, repo: &str, branch: &str, path: &str) -> Option<String> {
        let state = self.lock();
        state
            .repos
            .get(repo)?
            .files
            .get(branch)?
            .get(path)
            .map(|(c, _)| c.clone())
    }

    pub fn branches(&self, repo: &str) -> Vec<String> {
        let state = self.lock();
        let mut names: Vec<String> = state.repos[repo].heads.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn pulls(&self, repo: &str) -> Vec<PullRequest> {
        self.lock().repos[repo].pulls.iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn count_calls(&self, name: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == name).count()
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn exchange_code(
        &self,
        _client_id: &str,
        _client_secret: &str,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<String, GitHubError> {
        self.lock()
            .codes
            .remove(code)
            .ok_or_else(|| GitHubError::Unauthorized("bad_verification_code".into()))
    }

    async fn current_user(&self, token: &str) -> Result<GitHubUser, GitHubError> {
        self.record("current_user", token)?;
        Ok(self.user.clone())
    }

    async fn list_repos(
        &self,
        token: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<GitHubRepo>, GitHubError> {
        self.record("list_repos", token)?;
        let state = self.lock();
        let mut repos: Vec<GitHubRepo> =
            state.repos.values().filter_map(|r| r.info.clone()).collect();
        repos.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        let skip = (page.saturating_sub(1) * per_page) as usize;
        Ok(repos.into_iter().skip(skip).take(per_page as usize).collect())
    }

    async fn get_repo(&self, token: &str, repo: &RepoSlug) -> Result<GitHubRepo, GitHubError> {
        self.record("get_repo", token)?;
        let mut state = self.lock();
        Ok(state.repo(repo)?.info.clone().unwrap())
    }

    async fn list_branches(
        &self,
        token: &str,
        repo: &RepoSlug,
    ) -> Result<Vec<Branch>, GitHubError> {
        self.record("list_branches", token)?;
        let mut state = self.lock();
        let r = state.repo(repo)?;
        let mut branches: Vec<Branch> = r
            .heads
            .iter()
            .map(|(name, sha)| Branch {
                name: name.clone(),
                commit: BranchCommit { sha: sha.clone() },
                protected: false,
            })
            .collect();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    async fn get_branch(
        &self,
        token: &str,
        repo: &RepoSlug,
        branch: &str,
    ) -> Result<Branch, GitHubError> {
        self.record("get_branch", token)?;
        let mut state = self.lock();
        let r = state.repo(repo)?;
        let sha = r
            .heads
            .get(branch)
            .ok_or_else(|| GitHubError::NotFound("Branch not found".into()))?;
        Ok(Branch {
            name: branch.to_string(),
            commit: BranchCommit { sha: sha.clone() },
            protected: false,
        })
    }

    async fn create_branch(
        &self,
        token: &str,
        repo: &RepoSlug,
        branch: &str,
        from_sha: &str,
    ) -> Result<GitRef, GitHubError> {
        self.record("create_branch", token)?;
        let mut state = self.lock();
        let r = state.repo(repo)?;
        if r.heads.contains_key(branch) {
            return Err(GitHubError::Validation("Reference already exists".into()));
        }
        let source = r
            .heads
            .iter()
            .find(|(_, sha)| *sha == from_sha)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| GitHubError::Validation("Object does not exist".into()))?;
        let files = r.files[&source].clone();
        r.heads.insert(branch.to_string(), from_sha.to_string());
        r.files.insert(branch.to_string(), files);
        Ok(GitRef {
            ref_name: format!("refs/heads/{}", branch),
            object: GitObject {
                sha: from_sha.to_string(),
            },
        })
    }

    async fn get_file(
        &self,
        token: &str,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent, GitHubError> {
        self.record("get_file", token)?;
        let mut state = self.lock();
        let r = state.repo(repo)?;
        let files = r.files.get(git_ref).ok_or_else(|| no_ref(git_ref))?;
        let (content, sha) = files
            .get(path)
            .ok_or_else(|| GitHubError::NotFound("Not Found".into()))?;
        Ok(FileContent {
            path: path.to_string(),
            sha: sha.clone(),
            size: content.len() as u64,
            content: content.clone(),
        })
    }

    async fn list_directory(
        &self,
        token: &str,
        repo: &RepoSlug,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<ContentEntry>, GitHubError> {
        self.record("list_directory", token)?;
        let mut state = self.lock();
        let r = state.repo(repo)?;
        let files = r.files.get(git_ref).ok_or_else(|| no_ref(git_ref))?;
        let prefix = format!("{}/", path.trim_matches('/'));
        let mut entries: BTreeMap<String, ContentEntry> = BTreeMap::new();
        for (file_path, (content, sha)) in files.iter() {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                continue;
            };
            let (name, kind) = match rest.split_once('/') {
                Some((dir, _)) => (dir.to_string(), "dir"),
                None => (rest.to_string(), "file"),
            };
            entries.entry(name.clone()).or_insert(ContentEntry {
                path: format!("{}{}", prefix, name),
                name,
                sha: sha.clone(),
                size: if kind == "file" { content.len() as u64 } else { 0 },
                kind: kind.to_string(),
            });
        }
        if entries.is_empty() {
            return Err(GitHubError::NotFound("Not Found".into()));
        }
        Ok(entries.into_values().collect())
    }

    async fn put_file(
        &self,
        token: &str,
        repo: &RepoSlug,
        file: &PutFile,
    ) -> Result<PutFileResult, GitHubError> {
        self.record("put_file", token)?;
        let mut state = self.lock();
        if state.fail_put.as_deref() == Some(file.path.as_str()) {
            return Err(GitHubError::Status {
                status: 500,
                message: "boom".into(),
            });
        }
        let blob = state.next_sha();
        let commit = state.next_sha();
        let r = state.repo(repo)?;
        let files = r
            .files
            .get_mut(&file.branch)
            .ok_or_else(|| GitHubError::NotFound(format!("Branch {} not found", file.branch)))?;
        match (files.get(&file.path), &file.sha) {
            (Some(_), None) => {
                return Err(GitHubError::Validation("\"sha\" wasn't supplied.".into()));
            }
            (Some((_, current)), Some(given)) if current != given => {
                return Err(GitHubError::Conflict(format!(
                    "{} does not match {}",
                    file.path, given
                )));
            }
            (None, Some(_)) => {
                return Err(GitHubError::NotFound("Not Found".into()));
            }
            _ => {}
        }
        files.insert(file.path.clone(), (file.content.clone(), blob.clone()));
        r.heads.insert(file.branch.clone(), commit.clone());
        r.commits.push((
            file.branch.clone(),
            file.path.clone(),
            CommitSummary {
                sha: commit.clone(),
                message: file.message.clone(),
                author: Some("octocat".into()),
                date: None,
                html_url: format!("https://github.com/{}/commit/{}", repo, commit),
            },
        ));
        Ok(PutFileResult {
            path: file.path.clone(),
            content_sha: blob,
            commit_sha: commit,
        })
    }

    async fn list_commits(
        &self,
        token: &str,
        repo: &RepoSlug,
        path: Option<&str>,
        git_ref: &str,
    ) -> Result<Vec<CommitSummary>, GitHubError> {
        self.record("list_commits", token)?;
        let mut state = self.lock();
        let r = state.repo(repo)?;
        if !r.heads.contains_key(git_ref) {
            return Err(no_ref(git_ref));
        }
        Ok(r.commits
            .iter()
            .rev()
            .filter(|(b, p, _)| b == git_ref && path.is_none_or(|want| want == p))
            .map(|(_, _, c)| c.clone())
            .collect())
    }

    async fn list_pull_requests(
        &self,
        token: &str,
        repo: &RepoSlug,
        filter: PullState,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        self.record("list_pull_requests", token)?;
        let mut state = self.lock();
        Ok(state
            .repo(repo)?
            .pulls
            .iter()
            .filter(|(p, _)| filter.matches(&p.state))
            .map(|(p, _)| p.clone())
            .collect())
    }

    async fn list_pull_request_files(
        &self,
        token: &str,
        repo: &RepoSlug,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, GitHubError> {
        self.record("list_pull_request_files", token)?;
        let mut state = self.lock();
        let (_, files) = state
            .repo(repo)?
            .pulls
            .iter()
            .find(|(p, _)| p.number == number)
            .ok_or_else(|| GitHubError::NotFound("Not Found".into()))?;
        Ok(files
            .iter()
            .map(|f| PullRequestFile {
                filename: f.clone(),
                status: "modified".into(),
            })
            .collect())
    }

    async fn create_pull_request(
        &self,
        token: &str,
        repo: &RepoSlug,
        pr: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        self.record("create_pull_request", token)?;
        let mut state = self.lock();
        let r = state.repo(repo)?;
        let head_files = r
            .files
            .get(&pr.head)
            .ok_or_else(|| GitHubError::Validation(format!("head {} invalid", pr.head)))?;
        let base_files = r
            .files
            .get(&pr.base)
            .ok_or_else(|| GitHubError::Validation(format!("base {} invalid", pr.base)))?;
        let changed: Vec<String> = head_files
            .iter()
            .filter(|(path, (content, _))| base_files.get(*path).map(|(c, _)| c) != Some(content))
            .map(|(path, _)| path.clone())
            .collect();
        if changed.is_empty() {
            return Err(GitHubError::Validation(format!(
                "No commits between {} and {}",
                pr.base, pr.head
            )));
        }
        let number = r.pulls.len() as u64 + 1;
        let pull = PullRequest {
            number,
            title: pr.title.clone(),
            body: Some(pr.body.clone()),
            state: "open".into(),
            html_url: format!("https://github.com/{}/pull/{}", repo, number),
            head: PullRequestRef {
                ref_name: pr.head.clone(),
                sha: r.heads[&pr.head].clone(),
            },
            base: PullRequestRef {
                ref_name: pr.base.clone(),
                sha: r.heads[&pr.base].clone(),
            },
            user: Some(PullRequestUser {
                login: "octocat".into(),
            }),
            created_at: None,
        };
        r.pulls.push((pull.clone(), changed));
        Ok(pull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_unknown_tokens() {
        let fake = FakeGitHub::new();
        let err = fake.current_user("ghp_wrong").await.unwrap_err();
        assert!(matches!(err, GitHubError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn put_requires_matching_sha_for_existing_files() {
        let fake = FakeGitHub::new();
        let repo = fake.add_repo("o", "r", "main");
        fake.put("o/r", "main", "a.md", "one");
        let mut put = PutFile {
            path: "a.md".into(),
            branch: "main".into(),
            message: "m".into(),
            content: "two".into(),
            sha: None,
        };
        assert!(matches!(
            fake.put_file(TEST_TOKEN, &repo, &put).await,
            Err(GitHubError::Validation(_))
        ));
        put.sha = Some(fake.get_file(TEST_TOKEN, &repo, "a.md", "main").await.unwrap().sha);
        fake.put_file(TEST_TOKEN, &repo, &put).await.unwrap();
        assert_eq!(fake.file("o/r", "main", "a.md").as_deref(), Some("two"));
    }
}
