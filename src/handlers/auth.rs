use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{required, ApiError};
use crate::handoff::HandoffGrant;
use crate::identity::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// POST /api/auth/login: password sign-in through the identity provider.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let email = required(body.email.as_deref(), "email")?;
    let password = body
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::BadRequest("'password' is required".into()))?;

    let session = state.identity.sign_in_with_password(email, password).await?;
    tracing::info!(user_id = %session.user.id, "user signed in");

    Ok(Json(json!({ "success": true, "session": session })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// POST /api/auth/handoff: mint a single-use token for the caller's session.
pub async fn issue_handoff(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<HandoffRequest>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let grant = HandoffGrant {
        user_id: user.id,
        access_token: user.access_token.clone(),
        refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
    };

    let token = state.handoff.issue(grant).await?;
    let expires_in = state.handoff.ttl().as_secs();
    tracing::info!(user_id = %user.id, expires_in, "handoff token issued");

    Ok(Json(json!({ "success": true, "token": token, "expiresIn": expires_in })))
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub token: Option<String>,
}

/// POST /api/auth/handoff/redeem: exchange a handoff token for its session.
/// Works once per token.
pub async fn redeem_handoff(
    State(state): State<AppState>,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = required(body.token.as_deref(), "token")?;

    match state.handoff.redeem(token).await? {
        Some(grant) => {
            tracing::info!(user_id = %grant.user_id, "handoff token redeemed");
            Ok(Json(json!({ "success": true, "session": grant })))
        }
        None => Err(ApiError::Unauthorized("Invalid or expired handoff token".into())),
    }
}
