// ---------------------------------------------------------------------------
// handlers/: one sub-module per route group
// mod.rs re-exports the handlers so lib.rs routes read `handlers::*`.
// ---------------------------------------------------------------------------

pub(crate) mod auth;
pub(crate) mod brief;
pub(crate) mod clients;
pub(crate) mod generate;
pub(crate) mod scrape;
pub(crate) mod sites;
pub(crate) mod system;

// ── Re-exports ───────────────────────────────────────────────────────────────

pub use auth::{issue_handoff, login, redeem_handoff};
pub use brief::brief_chat;
pub use clients::get_client;
pub use generate::{generate_config, generate_file};
pub use scrape::{scrape_discover, scrape_page};
pub use sites::{commit_site, edit_site, read_site_file};
pub use system::{health, readiness};

// ── Shared types ─────────────────────────────────────────────────────────────

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::github::{GitHubError, RepoRef};
use crate::handoff::HandoffError;
use crate::identity::{AuthUser, IdentityError};
use crate::llm::LlmError;
use crate::models::{ClientRecord, ClientStatus};
use crate::state::AppState;
use crate::storage::StorageError;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Centralized API error type for all handlers.
/// Logs full details server-side and answers with the common envelope:
///
/// ```json
/// { "success": false, "message": "Human-readable description", "code": "BAD_REQUEST" }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A vendor API answered non-2xx (or not at all); the message carries
    /// its status and body.
    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Machine-readable error code string for each variant.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller. Internal errors are replaced with a
    /// generic message; everything else passes through.
    fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::NotFound(m)
            | ApiError::Upstream(m)
            | ApiError::Unavailable(m) => m.clone(),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "API error ({}): {}", status.as_u16(), self);
        } else {
            tracing::warn!(code = self.error_code(), "API error ({}): {}", status.as_u16(), self);
        }

        let body = json!({
            "success": false,
            "message": self.public_message(),
            "code": self.error_code(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<GitHubError> for ApiError {
    fn from(e: GitHubError) -> Self {
        match e {
            GitHubError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            GitHubError::InvalidInput(m) => ApiError::BadRequest(m),
            GitHubError::MissingToken => ApiError::Unavailable(GitHubError::MissingToken.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::NotConfigured => ApiError::Unavailable(LlmError::NotConfigured.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidCredentials => ApiError::Unauthorized(IdentityError::InvalidCredentials.to_string()),
            IdentityError::NotConfigured => ApiError::Unavailable(IdentityError::NotConfigured.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotConfigured => ApiError::Unavailable(StorageError::NotConfigured.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<HandoffError> for ApiError {
    fn from(e: HandoffError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ApiError::NotFound("record not found".into()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Trimmed, non-empty string field or a 400 naming the field.
pub(crate) fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("'{}' is required", field)))
}

/// Load a client owned by `user` or 404.
pub(crate) async fn load_client(state: &AppState, user: &AuthUser, client_id: Uuid) -> Result<ClientRecord, ApiError> {
    crate::store::get_client(&state.db, user.id, client_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("client {} not found", client_id)))
}

/// Merge `patch` into the client's config and move it to `status`.
/// Never fails the request: errors are logged and the result is `false`.
pub(crate) async fn save_client_progress(
    state: &AppState,
    user: &AuthUser,
    client_id: Uuid,
    patch: &serde_json::Value,
    status: ClientStatus,
) -> bool {
    let mut saved = true;
    if let Err(e) = crate::store::merge_client_config(&state.db, user.id, client_id, patch).await {
        tracing::warn!(%client_id, "saving client config failed: {}", e);
        saved = false;
    }
    if let Err(e) = crate::store::set_client_status(&state.db, user.id, client_id, status).await {
        tracing::warn!(%client_id, ?status, "status update failed: {}", e);
        saved = false;
    }
    saved
}

/// The client's site repository, or 400 when none is provisioned.
pub(crate) fn client_repo(client: &ClientRecord) -> Result<RepoRef, ApiError> {
    client
        .repo()
        .ok_or_else(|| ApiError::BadRequest(format!("client '{}' has no repository yet", client.slug)))
}

/// Repository the site template is read from, or 503 when unset.
pub(crate) fn template_repo(state: &AppState) -> Result<RepoRef, ApiError> {
    state
        .config
        .template_repo
        .clone()
        .ok_or_else(|| ApiError::Unavailable("TEMPLATE_REPO is not configured".into()))
}
