use crate::models::{ChatMessage, ChatRole};
use crate::templates;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("no valid API key configured")]
    InvalidCredential,
    #[error("could not parse model response: {0}")]
    MalformedResponse(String),
    #[error("request to the model failed: {0}")]
    Transport(String),
    #[error("cancelled by user")]
    Cancelled,
}

/// Named function-invocation signal returned by the chat flow (used to detect
/// "ready to generate the script" intent).
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

/// Capability seam the pipeline stages consume: submit a prompt plus an
/// output schema, get parsed JSON back or a typed failure. Lets tests drive
/// the whole pipeline with a scripted gateway.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate_json(
        &self,
        prompt: &str,
        schema: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, GeminiError>;
}

/// Parse gateway JSON into the shape a call site declared.
pub fn parse_structured<T: DeserializeOwned>(value: Value) -> Result<T, GeminiError> {
    serde_json::from_value(value).map_err(|e| GeminiError::MalformedResponse(e.to_string()))
}

pub struct GeminiClient {
    client: Client,
    api_key: RwLock<Option<String>>,
    base_url: String,
}

impl GeminiClient {
    pub fn new() -> Self {
        let base_url = std::env::var("GEMINI_API_BASE")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Self {
            client: Client::new(),
            api_key: RwLock::new(None),
            base_url,
        }
    }

    /// Store the credential for all subsequent calls. Must run before any
    /// generation operation; an empty key is rejected.
    pub fn configure(&self, key: String) -> Result<(), GeminiError> {
        if key.trim().is_empty() {
            return Err(GeminiError::InvalidCredential);
        }
        *self.api_key.write() = Some(key);
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.read().is_some()
    }

    fn key(&self) -> Result<String, GeminiError> {
        self.api_key.read().clone().ok_or(GeminiError::InvalidCredential)
    }

    fn url(&self, key: &str) -> String {
        format!("{}/models/{}:generateContent?key={}", self.base_url, MODEL, key)
    }

    /// Check a candidate key against the API with a minimal request before
    /// accepting it. Honors cancellation like every other remote call.
    pub async fn validate_key(&self, key: &str, cancel: &CancellationToken) -> bool {
        if key.trim().is_empty() || cancel.is_cancelled() {
            return false;
        }
        let body = json!({
            "contents": [{"parts": [{"text": "hello"}]}],
            "generationConfig": {"maxOutputTokens": 1}
        });
        match self.client.post(self.url(key)).json(&body).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                error!("key validation request failed: {e}");
                false
            }
        }
    }

    async fn post(&self, body: &Value, cancel: &CancellationToken) -> Result<GeminiResponse, GeminiError> {
        let key = self.key()?;
        debug!("request body: {}", serde_json::to_string(body).unwrap_or_default());

        // Last cancellation check before the call goes out; a cancel observed
        // after the response returns is not retroactively applied.
        if cancel.is_cancelled() {
            return Err(GeminiError::Cancelled);
        }
        let response = self
            .client
            .post(self.url(&key))
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GeminiError::Transport(e.to_string()))?;
        if !status.is_success() {
            error!("❌ API error response: status={status} body={text}");
            return Err(GeminiError::Transport(format!("status={status} body={text}")));
        }

        serde_json::from_str(&text)
            .map_err(|e| GeminiError::MalformedResponse(format!("envelope parse error: {e}")))
    }

    /// Idea-gathering conversation turn: free text plus the optional
    /// `offer_to_generate_script` readiness signal.
    pub async fn chat(
        &self,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<ChatReply, GeminiError> {
        let contents: Vec<Value> = history
            .iter()
            .map(|m| {
                let mut parts = vec![json!({"text": m.text})];
                for img in &m.images {
                    parts.push(json!({
                        "inlineData": {"mimeType": img.mime_type, "data": img.data}
                    }));
                }
                json!({
                    "role": match m.role { ChatRole::User => "user", ChatRole::Ai => "model" },
                    "parts": parts,
                })
            })
            .collect();

        let body = json!({
            "contents": contents,
            "systemInstruction": {"parts": [{"text": templates::chat_system_instruction()}]},
            "generationConfig": {"temperature": 0.8},
            "tools": [{"functionDeclarations": [{
                "name": "offer_to_generate_script",
                "description": "Call this once enough detail is gathered and a good script \
could be written. Ask the user whether they are ready to proceed with script generation.",
                "parameters": {"type": "OBJECT", "properties": {}}
            }]}],
        });

        let parsed = self.post(&body, cancel).await?;
        info!("💬 chat turn completed ({} messages of history)", history.len());
        Ok(ChatReply {
            text: extract_text(&parsed),
            function_call: extract_function_call(&parsed),
        })
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelGateway for GeminiClient {
    async fn generate_json(
        &self,
        prompt: &str,
        schema: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, GeminiError> {
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
                "temperature": 0.7,
            },
        });

        let parsed = self.post(&body, cancel).await?;
        let text = extract_text(&parsed);
        if text.is_empty() {
            return Err(GeminiError::MalformedResponse("no text content in response".into()));
        }
        serde_json::from_str(strip_code_fence(&text))
            .map_err(|e| GeminiError::MalformedResponse(e.to_string()))
    }
}

// --- Response parsing helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Function {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    Text {
        text: String,
    },
    Other(Value),
}

fn extract_text(resp: &GeminiResponse) -> String {
    let mut out = Vec::new();
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Text { text } = p {
                out.push(text.trim());
            }
        }
    }
    out.join("\n")
}

fn extract_function_call(resp: &GeminiResponse) -> Option<FunctionCall> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Function { function_call } = p {
                return Some(function_call.clone());
            }
        }
    }
    None
}

/// Models occasionally wrap structured output in a markdown fence even when
/// told not to; unwrap it before parsing.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}
