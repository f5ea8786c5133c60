// Bearer token authentication middleware.
// Every protected route requires `Authorization: Bearer <access token>`;
// the token is checked against the identity provider and the resolved
// user is attached to the request as an `AuthUser` extension.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::handlers::ApiError;
use crate::identity::IdentityError;
use crate::state::AppState;

pub use crate::identity::AuthUser;

/// Pull the token out of an `Authorization: Bearer …` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Middleware that resolves the bearer token to a user or rejects with 401.
/// Public routes (health, login, handoff redeem) should NOT use this.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let Some(token) = bearer_token(header) else {
        tracing::warn!("Auth failed: missing or malformed Authorization header");
        return Err(ApiError::Unauthorized("Missing bearer token".into()));
    };

    let user = match state.identity.validate_token(token).await {
        Ok(user) => user,
        Err(IdentityError::InvalidCredentials) => {
            tracing::warn!("Auth failed: invalid token");
            return Err(ApiError::Unauthorized("Invalid or expired token".into()));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(user_id = %user.id, "request authenticated");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token(Some("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(Some("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(None), None);
    }
}
