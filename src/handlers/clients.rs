use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{load_client, ApiError};
use crate::identity::AuthUser;
use crate::state::AppState;

/// GET /api/clients/{id}
pub async fn get_client(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let client = load_client(&state, &user, id).await?;
    Ok(Json(json!({ "success": true, "client": client })))
}
