//! Identity provider client: bearer validation and password sign-in.
//!
//! Speaks the Supabase auth (GoTrue) REST shape. Both calls carry the
//! project's anon key in the `apikey` header.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider is not configured")]
    NotConfigured,

    #[error("invalid or expired credentials")]
    InvalidCredentials,

    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

/// The caller behind a validated bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    /// The bearer token the user was resolved from.
    #[serde(skip)]
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: SessionUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: Option<String>,
    anon_key: String,
}

impl std::fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClient").field("base_url", &self.base_url).finish()
    }
}

impl IdentityClient {
    pub fn new(client: Client, base_url: Option<String>, anon_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()).filter(|u| !u.is_empty()),
            anon_key: anon_key.into(),
        }
    }

    fn base(&self) -> Result<&str, IdentityError> {
        self.base_url.as_deref().ok_or(IdentityError::NotConfigured)
    }

    /// Resolve a bearer token to its user. 401/403 → `InvalidCredentials`.
    pub async fn validate_token(&self, token: &str) -> Result<AuthUser, IdentityError> {
        let resp = self
            .client
            .get(format!("{}/auth/v1/user", self.base()?))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => {
                let user: SessionUser = resp.json().await?;
                Ok(AuthUser { id: user.id, email: user.email, access_token: token.to_string() })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::InvalidCredentials),
            s => Err(IdentityError::Api { status: s.as_u16(), body: resp.text().await.unwrap_or_default() }),
        }
    }

    /// Exchange email + password for a session.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        let resp = self
            .client
            .post(format!("{}/auth/v1/token?grant_type=password", self.base()?))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(resp.json().await?),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(IdentityError::InvalidCredentials),
            s => Err(IdentityError::Api { status: s.as_u16(), body: resp.text().await.unwrap_or_default() }),
        }
    }
}
