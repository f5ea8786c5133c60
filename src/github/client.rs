//! github::client
//!
//! Thin REST client over the GitHub contents and Git Data endpoints. Every
//! call maps one HTTP request to one method; sequencing lives in
//! [`commit`](super::commit).

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT_VALUE: &str = "sitesmith-backend";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// Non-2xx response; carries the failing step, status and raw body.
    #[error("GitHub {step} failed with HTTP {status}: {body}")]
    Api { step: &'static str, status: u16, body: String },

    #[error("GitHub {0} not found")]
    NotFound(String),

    #[error("GitHub {step} request failed: {source}")]
    Transport {
        step: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("GitHub {step} returned an unexpected body: {message}")]
    Decode { step: &'static str, message: String },

    #[error("invalid commit input: {0}")]
    InvalidInput(String),

    #[error("GitHub token is not configured")]
    MissingToken,
}

// ---------------------------------------------------------------------------
// Path validation
// ---------------------------------------------------------------------------

/// A repository-relative file path: no leading slash, no empty, `.` or `..`
/// segments, nothing that a URL would read as a query or fragment.
pub fn validate_repo_path(path: &str) -> Result<(), GitHubError> {
    if path.is_empty() || path.starts_with('/') {
        return Err(GitHubError::InvalidInput(format!("path '{}' must be relative", path)));
    }
    if path.contains(['?', '#', '\\']) {
        return Err(GitHubError::InvalidInput(format!("path '{}' contains a reserved character", path)));
    }
    if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(GitHubError::InvalidInput(format!("path '{}' has an invalid segment", path)));
    }
    Ok(())
}

fn validate_branch(branch: &str) -> Result<(), GitHubError> {
    if branch.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(GitHubError::InvalidInput(format!("branch '{}' is not a valid ref name", branch)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Repository coordinates. `branch: None` means the default branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub branch: Option<String>,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self { owner: owner.into(), name: name.into(), branch: None }
    }

    pub fn on_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Parse `owner/name` or `owner/name@branch`.
    pub fn parse(spec: &str) -> Option<Self> {
        let (coords, branch) = match spec.split_once('@') {
            Some((c, b)) if !b.is_empty() => (c, Some(b.to_string())),
            _ => (spec, None),
        };
        let (owner, name) = coords.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self { owner: owner.to_string(), name: name.to_string(), branch })
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if let Some(ref b) = self.branch {
            write!(f, "@{}", b)?;
        }
        Ok(())
    }
}

/// One entry of a `POST /git/trees` request. Exactly one of `sha` and
/// `content` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self { path: path.into(), mode: "100644", kind: "blob", sha: Some(sha.into()), content: None }
    }

    pub fn inline(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), mode: "100644", kind: "blob", sha: None, content: Some(content.into()) }
    }
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: GitObject,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    tree: GitObject,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    token: Option<String>,
    api_base: String,
}

// Keep the token out of logs.
impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("has_token", &self.token.is_some())
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubClient {
    pub fn new(client: Client, token: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            client,
            token: token.filter(|t| !t.is_empty()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, GitHubError> {
        let token = self.token.as_deref().ok_or(GitHubError::MissingToken)?;
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| GitHubError::InvalidInput("token contains invalid header characters".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
        Ok(headers)
    }

    /// `{api_base}/repos/{owner}/{name}/{segments…}`, each segment
    /// percent-encoded on its own so input can never change the route.
    fn repo_url<'a>(
        &self,
        repo: &RepoRef,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, GitHubError> {
        for part in [repo.owner.as_str(), repo.name.as_str()] {
            if part.is_empty() || part == "." || part == ".." || part.contains('/') {
                return Err(GitHubError::InvalidInput(format!("invalid repository '{}'", repo)));
            }
        }
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| GitHubError::InvalidInput(format!("invalid API base '{}': {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidInput(format!("API base '{}' cannot carry a path", self.api_base)))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        step: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GitHubError> {
        let resp = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|source| GitHubError::Transport { step, source })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(step, status = status.as_u16(), "GitHub call failed");
            return Err(GitHubError::Api { step, status: status.as_u16(), body });
        }
        resp.json::<T>()
            .await
            .map_err(|e| GitHubError::Decode { step, message: e.to_string() })
    }

    // ── Contents API ────────────────────────────────────────────────────

    /// Read a file's raw content. 404 becomes [`GitHubError::NotFound`].
    pub async fn get_file(&self, repo: &RepoRef, path: &str) -> Result<String, GitHubError> {
        let step = "read file";
        validate_repo_path(path)?;
        let mut url = self.repo_url(repo, std::iter::once("contents").chain(path.split('/')))?;
        if let Some(ref branch) = repo.branch {
            validate_branch(branch)?;
            url.query_pairs_mut().append_pair("ref", branch);
        }

        let mut headers = self.headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.raw+json"));
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|source| GitHubError::Transport { step, source })?;

        match resp.status() {
            s if s.is_success() => resp
                .text()
                .await
                .map_err(|e| GitHubError::Decode { step, message: e.to_string() }),
            StatusCode::NOT_FOUND => Err(GitHubError::NotFound(format!("file '{}' in {}", path, repo))),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(GitHubError::Api { step, status: s.as_u16(), body })
            }
        }
    }

    // ── Git Data API ────────────────────────────────────────────────────

    pub async fn default_branch(&self, repo: &RepoRef) -> Result<String, GitHubError> {
        let url = self.repo_url(repo, [])?;
        let info: RepoInfo = self.send_json("read repository", self.client.get(url)).await?;
        Ok(info.default_branch)
    }

    pub async fn branch_head(&self, repo: &RepoRef, branch: &str) -> Result<String, GitHubError> {
        validate_branch(branch)?;
        let url = self.repo_url(repo, ["git", "ref", "heads"].into_iter().chain(branch.split('/')))?;
        let r: RefResponse = self.send_json("read branch ref", self.client.get(url)).await?;
        Ok(r.object.sha)
    }

    pub async fn commit_tree(&self, repo: &RepoRef, commit_sha: &str) -> Result<String, GitHubError> {
        let url = self.repo_url(repo, ["git", "commits", commit_sha])?;
        let c: CommitResponse = self.send_json("read head commit", self.client.get(url)).await?;
        Ok(c.tree.sha)
    }

    pub async fn create_blob(&self, repo: &RepoRef, content: &str, encoding: &str) -> Result<String, GitHubError> {
        let url = self.repo_url(repo, ["git", "blobs"])?;
        let body = json!({ "content": content, "encoding": encoding });
        let o: GitObject = self.send_json("create blob", self.client.post(url).json(&body)).await?;
        Ok(o.sha)
    }

    pub async fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String, GitHubError> {
        let url = self.repo_url(repo, ["git", "trees"])?;
        let body = json!({ "base_tree": base_tree, "tree": entries });
        let o: GitObject = self.send_json("create tree", self.client.post(url).json(&body)).await?;
        Ok(o.sha)
    }

    pub async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String, GitHubError> {
        let url = self.repo_url(repo, ["git", "commits"])?;
        let body = json!({ "message": message, "tree": tree_sha, "parents": [parent_sha] });
        let c: CommitResponse = self.send_json("create commit", self.client.post(url).json(&body)).await?;
        Ok(c.sha)
    }

    /// Fast-forward `branch` to `commit_sha`. Never forced: GitHub rejects the
    /// update when the branch moved since its head was read.
    pub async fn update_ref(&self, repo: &RepoRef, branch: &str, commit_sha: &str) -> Result<(), GitHubError> {
        validate_branch(branch)?;
        let url = self.repo_url(repo, ["git", "refs", "heads"].into_iter().chain(branch.split('/')))?;
        let body = json!({ "sha": commit_sha, "force": false });
        let _: serde_json::Value = self.send_json("update branch ref", self.client.patch(url).json(&body)).await?;
        Ok(())
    }
}
