//! Atomic multi-file commit over the Git Data API.
//!
//! Sequence: branch head → head tree → (blobs) → tree on top of the head
//! tree → commit with the head as sole parent → non-force ref update. The ref
//! moves only in the last step, so an earlier failure leaves at most orphaned
//! objects behind. Steps run strictly in order; nothing is retried.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::client::{validate_repo_path, GitHubClient, GitHubError, RepoRef, TreeEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlobEncoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

impl BlobEncoding {
    fn as_str(self) -> &'static str {
        match self {
            BlobEncoding::Utf8 => "utf-8",
            BlobEncoding::Base64 => "base64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub encoding: Option<BlobEncoding>,
}

impl FileChange {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: content.into(), encoding: None }
    }

    fn encoding(&self) -> BlobEncoding {
        self.encoding.unwrap_or_default()
    }
}

/// `Blobs` uploads each file as a blob first; `Inline` lets the tree call
/// create blobs from raw string content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    Blobs,
    Inline,
}

impl CommitMode {
    /// Pre-encoded content needs the blob variant; plain text goes inline.
    pub fn for_files(files: &[FileChange]) -> Self {
        if files.iter().any(|f| f.encoding() == BlobEncoding::Base64) {
            CommitMode::Blobs
        } else {
            CommitMode::Inline
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub commit_sha: String,
    pub tree_sha: String,
    pub parent_sha: String,
    pub branch: String,
    pub files: usize,
}

/// Reject empty batches, paths that fail [`validate_repo_path`], and
/// duplicate paths.
pub fn validate_files(files: &[FileChange]) -> Result<(), GitHubError> {
    if files.is_empty() {
        return Err(GitHubError::InvalidInput("no files to commit".into()));
    }
    let mut seen = HashSet::new();
    for f in files {
        let path = f.path.as_str();
        validate_repo_path(path)?;
        if !seen.insert(path) {
            return Err(GitHubError::InvalidInput(format!("path '{}' appears twice", path)));
        }
    }
    Ok(())
}

/// Commit `files` to `repo` as one new commit on its branch.
pub async fn commit_files(
    gh: &GitHubClient,
    repo: &RepoRef,
    files: &[FileChange],
    message: &str,
    mode: CommitMode,
) -> Result<CommitOutcome, GitHubError> {
    validate_files(files)?;

    let branch = match repo.branch {
        Some(ref b) => b.clone(),
        None => gh.default_branch(repo).await?,
    };

    let parent_sha = gh.branch_head(repo, &branch).await?;
    let base_tree = gh.commit_tree(repo, &parent_sha).await?;

    let mut entries = Vec::with_capacity(files.len());
    match mode {
        CommitMode::Blobs => {
            for f in files {
                let sha = gh.create_blob(repo, &f.content, f.encoding().as_str()).await?;
                entries.push(TreeEntry::blob(&f.path, sha));
            }
        }
        CommitMode::Inline => {
            for f in files {
                entries.push(TreeEntry::inline(&f.path, inline_text(f)?));
            }
        }
    }

    let tree_sha = gh.create_tree(repo, &base_tree, &entries).await?;
    let commit_sha = gh.create_commit(repo, message, &tree_sha, &parent_sha).await?;
    gh.update_ref(repo, &branch, &commit_sha).await?;

    tracing::info!(
        repo = %repo,
        branch = %branch,
        commit = %commit_sha,
        files = files.len(),
        ?mode,
        "committed files"
    );

    Ok(CommitOutcome { commit_sha, tree_sha, parent_sha, branch, files: files.len() })
}

/// Tree `content` must be UTF-8 text; base64 input is decoded first.
fn inline_text(f: &FileChange) -> Result<String, GitHubError> {
    match f.encoding() {
        BlobEncoding::Utf8 => Ok(f.content.clone()),
        BlobEncoding::Base64 => {
            let bytes = BASE64
                .decode(f.content.trim())
                .map_err(|e| GitHubError::InvalidInput(format!("'{}' is not valid base64: {}", f.path, e)))?;
            String::from_utf8(bytes).map_err(|_| {
                GitHubError::InvalidInput(format!("'{}' is binary; commit it in blob mode", f.path))
            })
        }
    }
}
