use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{load_client, required, save_client_progress, template_repo, ApiError};
use crate::github::{GitHubClient, GitHubError, RepoRef};
use crate::identity::AuthUser;
use crate::llm::{decode_envelope, ChatMessage};
use crate::models::{ClientRecord, ClientStatus};
use crate::prompts::{
    config_prompt, finish_generated, generation_prompt, required_config_keys, split_imports, GenerationInput,
    MIN_GENERATED_CHARS,
};
use crate::state::AppState;

/// Optional notes for the model that ship with the template repository.
pub const GUIDE_PATH: &str = "GENERATION.md";
pub const DEFAULT_CONFIG_PATH: &str = "src/data/site.json";

/// A template file plus the template guide, fetched together. A missing
/// guide is fine; a missing template file is a 404.
async fn fetch_with_guide(
    github: &GitHubClient,
    repo: &RepoRef,
    path: &str,
) -> Result<(String, Option<String>), ApiError> {
    let (template, guide) = tokio::join!(github.get_file(repo, path), github.get_file(repo, GUIDE_PATH));
    let template = template?;
    let guide = match guide {
        Ok(g) => Some(g),
        Err(GitHubError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    Ok((template, guide))
}

/// Request value first, then the client's stored config.
fn from_request_or_client<'a>(given: Option<&'a Value>, client: Option<&'a ClientRecord>, key: &str) -> Option<&'a Value> {
    given
        .filter(|v| !v.is_null())
        .or_else(|| client.and_then(|c| c.config.get(key)).filter(|v| !v.is_null()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFileRequest {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub path: Option<String>,
    #[serde(default)]
    pub brief: Option<Value>,
    #[serde(default)]
    pub site_config: Option<Value>,
    #[serde(default)]
    pub scraped: Option<Value>,
}

/// POST /api/generate/file: rewrite one template file for a client.
pub async fn generate_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<GenerateFileRequest>,
) -> Result<Json<Value>, ApiError> {
    let path = required(body.path.as_deref(), "path")?;
    let repo = template_repo(&state)?;
    let client = match body.client_id {
        Some(id) => Some(load_client(&state, &user, id).await?),
        None => None,
    };

    let brief = from_request_or_client(body.brief.as_ref(), client.as_ref(), "brief")
        .ok_or_else(|| ApiError::BadRequest("a creative brief is required".into()))?;
    let site_config = from_request_or_client(body.site_config.as_ref(), client.as_ref(), "siteConfig");
    let scraped = from_request_or_client(body.scraped.as_ref(), client.as_ref(), "scrape");

    let (template, guide) = fetch_with_guide(&state.github, &repo, path).await?;
    let (header, template_body) = split_imports(&template);

    let (system, user_prompt) = generation_prompt(&GenerationInput {
        path,
        template: &template_body,
        guide: guide.as_deref(),
        brief,
        site_config,
        scraped,
    });
    let raw = state
        .llm
        .complete_at_least(&system, &[ChatMessage::user(user_prompt)], MIN_GENERATED_CHARS)
        .await?;
    let content = finish_generated(&header, &raw)?;

    tracing::info!(
        path,
        client_id = ?client.as_ref().map(|c| c.id),
        imports = header.lines.len(),
        chars = content.len(),
        "file generated"
    );

    Ok(Json(json!({ "success": true, "path": path, "content": content })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateConfigRequest {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub brief: Option<Value>,
    #[serde(default)]
    pub scraped: Option<Value>,
}

/// POST /api/generate/config: fill in the template's site config JSON.
/// Every top-level key of the template must come back.
pub async fn generate_config(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<GenerateConfigRequest>,
) -> Result<Json<Value>, ApiError> {
    let path = body
        .path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let repo = template_repo(&state)?;
    let client = match body.client_id {
        Some(id) => Some(load_client(&state, &user, id).await?),
        None => None,
    };

    let brief = from_request_or_client(body.brief.as_ref(), client.as_ref(), "brief")
        .ok_or_else(|| ApiError::BadRequest("a creative brief is required".into()))?;
    let scraped = from_request_or_client(body.scraped.as_ref(), client.as_ref(), "scrape");

    let (template, guide) = fetch_with_guide(&state.github, &repo, path).await?;
    let template_json: Value = serde_json::from_str(&template)
        .map_err(|e| ApiError::Upstream(format!("template config '{}' is not valid JSON: {}", path, e)))?;
    let keys = required_config_keys(&template_json);
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

    let (system, user_prompt) = config_prompt(&template, guide.as_deref(), brief, scraped);
    let raw = state.llm.complete(&system, &[ChatMessage::user(user_prompt)]).await?;
    let site_config: Value = decode_envelope(&raw, &key_refs)?;

    if let Some(ref client) = client {
        let patch = json!({ "siteConfig": site_config });
        save_client_progress(&state, &user, client.id, &patch, ClientStatus::Generated).await;
    }

    tracing::info!(path, keys = keys.len(), client_id = ?client.as_ref().map(|c| c.id), "site config generated");

    Ok(Json(json!({ "success": true, "path": path, "config": site_config })))
}
