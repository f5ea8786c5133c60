//! GitHub integration: file reads and atomic commits.

pub mod client;
pub mod commit;

pub use client::{validate_repo_path, GitHubClient, GitHubError, RepoRef, TreeEntry, DEFAULT_API_BASE};
pub use commit::{commit_files, validate_files, BlobEncoding, CommitMode, CommitOutcome, FileChange};
