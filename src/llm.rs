//! Language-model client (Anthropic Messages API).
//!
//! One request per call, no streaming. Model output that is supposed to be
//! JSON goes through [`decode_envelope`], which reports malformed JSON and
//! missing keys as distinct errors instead of optimistic field access.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const API_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("language model API key is not configured")]
    NotConfigured,

    #[error("language model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("language model returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("language model returned no text")]
    EmptyResponse,

    #[error("model output is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("model output is missing required key '{0}'")]
    MissingKey(String),

    #[error("model output violates the output contract: {0}")]
    ConstraintViolation(String),
}

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentBlock::Text { text: text.into() }] }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: vec![ContentBlock::Text { text: text.into() }] }
    }

    /// Image blocks go before the text, as the API recommends.
    pub fn with_image(mut self, source: ImageSource) -> Self {
        self.content.insert(0, ContentBlock::Image { source });
        self
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("has_api_key", &self.api_key.is_some())
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl LlmClient {
    pub fn new(
        client: Client,
        api_key: Option<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens,
        }
    }

    /// Send one completion request and return the concatenated text blocks.
    pub async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages,
        };

        let started = std::time::Instant::now();
        let resp = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "language model call failed");
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let parsed: MessagesResponse = resp.json().await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|b| match b {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        tracing::info!(
            model = %self.model,
            chars = text.len(),
            stop_reason = parsed.stop_reason.as_deref().unwrap_or("unknown"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "language model call complete"
        );

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    /// Like [`complete`](Self::complete), but asks once more when the answer
    /// is shorter than `min_chars`. The longer of the two answers wins.
    pub async fn complete_at_least(
        &self,
        system: &str,
        messages: &[ChatMessage],
        min_chars: usize,
    ) -> Result<String, LlmError> {
        let first = self.complete(system, messages).await?;
        if first.trim().chars().count() >= min_chars {
            return Ok(first);
        }
        tracing::warn!(
            chars = first.trim().chars().count(),
            min_chars,
            "model output suspiciously short, retrying once"
        );
        let second = self.complete(system, messages).await?;
        if second.trim().len() > first.trim().len() { Ok(second) } else { Ok(first) }
    }
}

// ---------------------------------------------------------------------------
// Output decoding
// ---------------------------------------------------------------------------

/// `{ "explanation": ..., "code": ... }` returned by the edit prompt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EditEnvelope {
    pub explanation: String,
    pub code: String,
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the language tag line.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim_end().to_string()
}

/// Decode model output into `T`, requiring each key in `required` to be
/// present and non-null. Prose around the JSON object is tolerated.
pub fn decode_envelope<T: DeserializeOwned>(raw: &str, required: &[&str]) -> Result<T, LlmError> {
    let cleaned = strip_code_fences(raw);
    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if e > s => &cleaned[s..=e],
        _ => return Err(LlmError::MalformedJson("no JSON object in output".into())),
    };

    let value: Value =
        serde_json::from_str(slice).map_err(|e| LlmError::MalformedJson(e.to_string()))?;
    let Value::Object(ref map) = value else {
        return Err(LlmError::MalformedJson("top-level value is not an object".into()));
    };
    for key in required {
        if map.get(*key).is_none_or(Value::is_null) {
            return Err(LlmError::MissingKey(key.to_string()));
        }
    }
    serde_json::from_value(value).map_err(|e| LlmError::MalformedJson(e.to_string()))
}
