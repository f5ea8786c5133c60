use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::github::RepoRef;

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

/// Where a client site is in the build pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ClientStatus {
    Draft,
    Scraped,
    Briefed,
    Generated,
    Deployed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub slug: String,
    /// Brief, scraped summary and generated site config.
    pub config: Value,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub repo_branch: Option<String>,
    pub status: ClientStatus,
    pub edit_count: i32,
    pub last_edit_at: Option<DateTime<Utc>>,
    pub last_commit_sha: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClientRecord {
    /// The client's site repository, if one has been provisioned.
    pub fn repo(&self) -> Option<RepoRef> {
        let owner = self.repo_owner.as_deref().filter(|s| !s.is_empty())?;
        let name = self.repo_name.as_deref().filter(|s| !s.is_empty())?;
        let repo = RepoRef::new(owner, name);
        Some(match self.repo_branch.as_deref().filter(|s| !s.is_empty()) {
            Some(b) => repo.on_branch(b),
            None => repo,
        })
    }
}

// ---------------------------------------------------------------------------
// Edit history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEdit {
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub file_path: String,
    pub instruction: String,
    pub explanation: Option<String>,
    pub commit_sha: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ClientRecord {
        ClientRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Acme Plumbing".into(),
            slug: "acme-plumbing".into(),
            config: serde_json::json!({}),
            repo_owner: Some("acme-sites".into()),
            repo_name: Some("acme-plumbing".into()),
            repo_branch: None,
            status: ClientStatus::Generated,
            edit_count: 0,
            last_edit_at: None,
            last_commit_sha: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn repo_needs_owner_and_name() {
        let mut r = record();
        assert_eq!(r.repo(), Some(RepoRef::new("acme-sites", "acme-plumbing")));
        r.repo_branch = Some("live".into());
        assert_eq!(r.repo().unwrap().branch.as_deref(), Some("live"));
        r.repo_name = Some(String::new());
        assert_eq!(r.repo(), None);
    }

    #[test]
    fn record_serializes_camel_case() {
        let v = serde_json::to_value(record()).unwrap();
        assert_eq!(v["status"], "generated");
        assert_eq!(v["editCount"], 0);
        assert!(v.get("repoOwner").is_some());
    }
}
