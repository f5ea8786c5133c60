use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{client_repo, load_client, required, ApiError};
use crate::github::{commit_files, CommitMode, FileChange};
use crate::identity::AuthUser;
use crate::llm::{decode_envelope, ChatMessage, EditEnvelope, ImageSource};
use crate::models::{ClientStatus, NewEdit};
use crate::prompts::{attach_imports, edit_prompt, find_section, reject_imports, split_imports};
use crate::state::AppState;
use crate::store;

const MAX_FILES_PER_COMMIT: usize = 200;
const MAX_INSTRUCTION_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub files: Vec<FileChange>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub mode: Option<CommitMode>,
}

/// POST /api/sites/commit: land a batch of files as one commit on the
/// repository of one of the caller's clients.
pub async fn commit_site(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CommitRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.files.len() > MAX_FILES_PER_COMMIT {
        return Err(ApiError::BadRequest(format!("at most {} files per commit", MAX_FILES_PER_COMMIT)));
    }

    let client_id = body
        .client_id
        .ok_or_else(|| ApiError::BadRequest("'clientId' is required".into()))?;
    let client = load_client(&state, &user, client_id).await?;
    let repo = client_repo(&client)?;

    let message = body
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Update {} file(s)", body.files.len()));
    let mode = body.mode.unwrap_or_else(|| CommitMode::for_files(&body.files));

    let outcome = commit_files(&state.github, &repo, &body.files, &message, mode).await?;

    if let Err(e) = store::record_commit(&state.db, user.id, client.id, &outcome.commit_sha).await {
        tracing::warn!(client_id = %client.id, "recording commit failed: {}", e);
    }
    if let Err(e) = store::set_client_status(&state.db, user.id, client.id, ClientStatus::Deployed).await {
        tracing::warn!(client_id = %client.id, "status update failed: {}", e);
    }

    Ok(Json(json!({ "success": true, "commit": outcome })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub client_id: Option<Uuid>,
    pub path: Option<String>,
    pub instruction: Option<String>,
    /// `id` of a `<section>` to limit the edit to.
    #[serde(default)]
    pub section: Option<String>,
    /// Screenshot or reference image for the instruction.
    #[serde(default)]
    pub image: Option<ImageSource>,
}

/// POST /api/sites/edit: apply a plain-language edit to one file (or one
/// section of it) with the model and commit the result.
pub async fn edit_site(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<EditRequest>,
) -> Result<Json<Value>, ApiError> {
    let client_id = body
        .client_id
        .ok_or_else(|| ApiError::BadRequest("'clientId' is required".into()))?;
    let path = required(body.path.as_deref(), "path")?;
    let instruction = required(body.instruction.as_deref(), "instruction")?;
    if instruction.chars().count() > MAX_INSTRUCTION_CHARS {
        return Err(ApiError::BadRequest(format!("instruction exceeds {} characters", MAX_INSTRUCTION_CHARS)));
    }
    let section = body.section.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let client = load_client(&state, &user, client_id).await?;
    let repo = client_repo(&client)?;
    let current = state.github.get_file(&repo, path).await?;

    // The model only ever sees import-free code.
    let (header, body_code) = split_imports(&current);
    let (target, range) = match section {
        Some(id) => {
            let range = find_section(&body_code, id)
                .ok_or_else(|| ApiError::BadRequest(format!("section '{}' not found in {}", id, path)))?;
            (body_code[range.clone()].to_string(), Some(range))
        }
        None => (body_code.clone(), None),
    };

    let (system, user_prompt) = edit_prompt(path, &target, instruction, section);
    let mut message = ChatMessage::user(user_prompt);
    if let Some(image) = body.image {
        message = message.with_image(image);
    }
    let raw = state.llm.complete(&system, &[message]).await?;
    let edit: EditEnvelope = decode_envelope(&raw, &["explanation", "code"])?;
    reject_imports(&edit.code)?;

    let new_body = match range {
        Some(r) => format!("{}{}{}", &body_code[..r.start], edit.code.trim(), &body_code[r.end..]),
        None => edit.code.clone(),
    };
    let mut updated = attach_imports(&header, &new_body);
    if current.ends_with('\n') && !updated.ends_with('\n') {
        updated.push('\n');
    }

    let summary: String = instruction.chars().take(72).collect();
    let outcome = commit_files(
        &state.github,
        &repo,
        &[FileChange::text(path, updated.clone())],
        &format!("Edit {}: {}", path, summary),
        CommitMode::Inline,
    )
    .await?;

    store::record_edit(
        &state.db,
        user.id,
        &NewEdit {
            client_id: client.id,
            user_id: user.id,
            file_path: path.to_string(),
            instruction: instruction.to_string(),
            explanation: Some(edit.explanation.clone()),
            commit_sha: Some(outcome.commit_sha.clone()),
        },
    )
    .await;

    tracing::info!(client_id = %client.id, path, section = ?section, commit = %outcome.commit_sha, "site edited");

    Ok(Json(json!({
        "success": true,
        "explanation": edit.explanation,
        "path": path,
        "content": updated,
        "commit": outcome,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileQuery {
    pub client_id: Option<Uuid>,
    pub path: Option<String>,
}

/// GET /api/sites/file?clientId=…&path=…: read one file of a client site.
pub async fn read_site_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<FileQuery>,
) -> Result<Json<Value>, ApiError> {
    let client_id = query
        .client_id
        .ok_or_else(|| ApiError::BadRequest("'clientId' is required".into()))?;
    let path = required(query.path.as_deref(), "path")?;

    let client = load_client(&state, &user, client_id).await?;
    let repo = client_repo(&client)?;
    let content = state.github.get_file(&repo, path).await?;

    Ok(Json(json!({ "success": true, "path": path, "content": content })))
}
