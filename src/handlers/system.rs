use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// GET /api/health: liveness, version and which integrations are wired.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cfg = &state.config;
    Json(json!({
        "success": true,
        "status": if state.is_ready() { "ok" } else { "starting" },
        "version": env!("CARGO_PKG_VERSION"),
        "app": "sitesmith",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "integrations": {
            "github": cfg.github_token.is_some(),
            "llm": cfg.anthropic_api_key.is_some(),
            "identity": cfg.supabase_url.is_some(),
            "snapshots": state.storage.is_configured(),
            "template": cfg.template_repo.is_some(),
        },
    }))
}

/// GET /api/health/ready: lightweight readiness probe (no locks, no DB).
pub async fn readiness(State(state): State<AppState>) -> axum::response::Response {
    use axum::http::StatusCode;

    let ready = state.is_ready();
    let uptime = state.start_time.elapsed().as_secs();
    let body = json!({ "ready": ready, "uptime_seconds": uptime });

    if ready {
        (StatusCode::OK, Json(body)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}
