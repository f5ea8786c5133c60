use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{load_client, save_client_progress, ApiError};
use crate::identity::AuthUser;
use crate::llm::{ChatMessage, ImageSource, Role};
use crate::models::ClientStatus;
use crate::prompts::{brief_system_prompt, parse_brief_reply, BriefReply, BriefTurn};
use crate::state::AppState;

const MAX_TURNS: usize = 60;
const OPENING_TURN: &str = "I'd like a new website for my business.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefChatRequest {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub messages: Vec<BriefTurn>,
    /// Reference image (screenshot, logo, mood board) for the latest turn.
    #[serde(default)]
    pub image: Option<ImageSource>,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub scraped: Option<Value>,
}

/// POST /api/brief/chat: one turn of the creative-brief interview. When the
/// model closes the interview the brief is returned and, for a known
/// client, saved to its config.
pub async fn brief_chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<BriefChatRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.messages.len() > MAX_TURNS {
        return Err(ApiError::BadRequest(format!("conversation exceeds {} turns", MAX_TURNS)));
    }
    if body.messages.last().is_some_and(|m| m.role != Role::User) {
        return Err(ApiError::BadRequest("the last message must come from the user".into()));
    }

    let client = match body.client_id {
        Some(id) => Some(load_client(&state, &user, id).await?),
        None => None,
    };
    let business_name = body
        .business_name
        .as_deref()
        .or(client.as_ref().map(|c| c.name.as_str()));
    let scraped = body
        .scraped
        .as_ref()
        .or(client.as_ref().and_then(|c| c.config.get("scrape")));

    let system = brief_system_prompt(business_name, scraped);
    let mut messages: Vec<ChatMessage> = if body.messages.is_empty() {
        vec![ChatMessage::user(OPENING_TURN)]
    } else {
        body.messages
            .iter()
            .map(|t| match t.role {
                Role::User => ChatMessage::user(&t.content),
                Role::Assistant => ChatMessage::assistant(&t.content),
            })
            .collect()
    };
    if let Some(image) = body.image {
        if let Some(last) = messages.pop() {
            messages.push(last.with_image(image));
        }
    }

    let reply = state.llm.complete(&system, &messages).await?;

    match parse_brief_reply(&reply)? {
        BriefReply::Question(text) => Ok(Json(json!({ "success": true, "done": false, "reply": text }))),
        BriefReply::Complete { message, brief } => {
            if let Some(client) = client {
                let patch = json!({ "brief": brief });
                if save_client_progress(&state, &user, client.id, &patch, ClientStatus::Briefed).await {
                    tracing::info!(client_id = %client.id, "creative brief saved");
                }
            }
            Ok(Json(json!({ "success": true, "done": true, "reply": message, "brief": brief })))
        }
    }
}
