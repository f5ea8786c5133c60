//! Object storage for raw HTML snapshots of scraped pages.
//!
//! Objects are keyed `{client_slug}/{page_slug}.html` and written with
//! upsert semantics, so re-scraping a page replaces its snapshot.

use reqwest::Client;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("snapshot storage is not configured")]
    NotConfigured,

    #[error("snapshot upload failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("snapshot upload returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Clone)]
pub struct SnapshotStorage {
    client: Client,
    base_url: Option<String>,
    service_key: Option<String>,
    bucket: String,
}

impl std::fmt::Debug for SnapshotStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStorage")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Storage key for a page snapshot.
pub fn snapshot_path(client_slug: &str, page_slug: &str) -> String {
    format!("{}/{}.html", client_slug.trim_matches('/'), page_slug)
}

impl SnapshotStorage {
    pub fn new(client: Client, base_url: Option<String>, service_key: Option<String>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()).filter(|u| !u.is_empty()),
            service_key: service_key.filter(|k| !k.is_empty()),
            bucket: bucket.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.service_key.is_some()
    }

    /// Upload `html` and return the object path it was stored under.
    pub async fn upload(&self, client_slug: &str, page_slug: &str, html: &str) -> Result<String, StorageError> {
        let (Some(base), Some(key)) = (self.base_url.as_deref(), self.service_key.as_deref()) else {
            return Err(StorageError::NotConfigured);
        };
        let path = snapshot_path(client_slug, page_slug);

        let resp = self
            .client
            .post(format!("{}/storage/v1/object/{}/{}", base, self.bucket, path))
            .bearer_auth(key)
            .header("apikey", key)
            .header("x-upsert", "true")
            .header("Content-Type", "text/html; charset=utf-8")
            .body(html.to_string())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Api { status: status.as_u16(), body });
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_joins_client_and_page() {
        assert_eq!(snapshot_path("acme-plumbing", "services--drains"), "acme-plumbing/services--drains.html");
        assert_eq!(snapshot_path("/acme/", "index"), "acme/index.html");
    }
}
