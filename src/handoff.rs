//! Single-use login handoff tokens.
//!
//! A signed-in user asks for a short-lived token, hands it to another
//! surface (a preview tab, the site editor), and that surface redeems it once
//! for the session it stands for. Redeeming consumes the token; a second
//! redeem, an expired token and an unknown token all look the same.
//!
//! Only the SHA-256 of a token is ever stored.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

/// What a redeemed token grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffGrant {
    pub user_id: Uuid,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("handoff store query failed: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait HandoffStore: Send + Sync {
    /// Store `grant` and return the opaque token that redeems it.
    async fn issue(&self, grant: HandoffGrant) -> Result<String, HandoffError>;

    /// Consume `token`. `None` when unknown, already used or expired.
    async fn redeem(&self, token: &str) -> Result<Option<HandoffGrant>, HandoffError>;

    fn ttl(&self) -> Duration;
}

pub fn new_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// ── In-process store ────────────────────────────────────────────────────────

/// Process-local store. Tokens die with the process; use
/// [`PgHandoffStore`] when more than one instance serves traffic.
pub struct MemoryHandoffStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, (HandoffGrant, Instant)>>,
}

impl MemoryHandoffStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    fn purge_expired(map: &mut HashMap<String, (HandoffGrant, Instant)>, now: Instant) {
        map.retain(|_, (_, expires)| *expires > now);
    }
}

#[async_trait]
impl HandoffStore for MemoryHandoffStore {
    async fn issue(&self, grant: HandoffGrant) -> Result<String, HandoffError> {
        let token = new_token();
        let now = Instant::now();
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Self::purge_expired(&mut map, now);
        map.insert(token_digest(&token), (grant, now + self.ttl));
        Ok(token)
    }

    async fn redeem(&self, token: &str) -> Result<Option<HandoffGrant>, HandoffError> {
        let now = Instant::now();
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Self::purge_expired(&mut map, now);
        Ok(map.remove(&token_digest(token)).map(|(grant, _)| grant))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

// ── Postgres store ──────────────────────────────────────────────────────────

/// Shared store on the `handoff_tokens` table. Redeem is a single
/// `DELETE … RETURNING`, so exactly one caller wins a token.
pub struct PgHandoffStore {
    db: PgPool,
    ttl: Duration,
}

impl PgHandoffStore {
    pub fn new(db: PgPool, ttl: Duration) -> Self {
        Self { db, ttl }
    }
}

#[async_trait]
impl HandoffStore for PgHandoffStore {
    async fn issue(&self, grant: HandoffGrant) -> Result<String, HandoffError> {
        let token = new_token();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::seconds(60));

        // Opportunistic cleanup; the redeem query ignores stale rows anyway.
        if let Err(e) = sqlx::query("DELETE FROM handoff_tokens WHERE expires_at <= now()")
            .execute(&self.db)
            .await
        {
            tracing::warn!("handoff token cleanup failed: {}", e);
        }

        sqlx::query(
            "INSERT INTO handoff_tokens (token_hash, user_id, access_token, refresh_token, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(token_digest(&token))
        .bind(grant.user_id)
        .bind(&grant.access_token)
        .bind(&grant.refresh_token)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(token)
    }

    async fn redeem(&self, token: &str) -> Result<Option<HandoffGrant>, HandoffError> {
        let row = sqlx::query_as::<_, (Uuid, String, Option<String>, DateTime<Utc>)>(
            "DELETE FROM handoff_tokens WHERE token_hash = $1 \
             RETURNING user_id, access_token, refresh_token, expires_at",
        )
        .bind(token_digest(token))
        .fetch_optional(&self.db)
        .await?;

        Ok(row.and_then(|(user_id, access_token, refresh_token, expires_at)| {
            (expires_at > Utc::now()).then_some(HandoffGrant { user_id, access_token, refresh_token })
        }))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant() -> HandoffGrant {
        HandoffGrant {
            user_id: Uuid::new_v4(),
            access_token: "access-abc".into(),
            refresh_token: Some("refresh-xyz".into()),
        }
    }

    #[test]
    fn tokens_are_random_hex() {
        let a = new_token();
        let b = new_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_ne!(token_digest(&a), a);
    }

    #[tokio::test]
    async fn token_redeems_exactly_once() {
        let store = MemoryHandoffStore::new(Duration::from_secs(60));
        let g = grant();
        let token = store.issue(g.clone()).await.unwrap();

        assert_eq!(store.redeem(&token).await.unwrap(), Some(g));
        assert_eq!(store.redeem(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn token_is_invalid_after_ttl() {
        let store = MemoryHandoffStore::new(Duration::from_millis(50));
        let token = store.issue(grant()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(store.redeem(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let store = MemoryHandoffStore::new(Duration::from_secs(60));
        store.issue(grant()).await.unwrap();
        assert_eq!(store.redeem("not-a-token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_purged_on_access() {
        let store = MemoryHandoffStore::new(Duration::from_millis(20));
        store.issue(grant()).await.unwrap();
        store.issue(grant()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.redeem("anything").await.unwrap();
        assert!(store.entries.lock().unwrap().is_empty());
    }
}
