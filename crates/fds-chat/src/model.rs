//! Language model client seam.
//!
//! The orchestrator talks to the model through the `ModelClient` trait; the
//! model's free-form output is parsed into a closed decision enum, so an
//! unknown or malformed tool request is a data error rather than a dispatch
//! fault.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

use fds_core::config::ModelConfig;

use crate::error::ChatError;

/// Role of one transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One message in the working transcript sent to the model.
#[derive(Debug, Clone)]
pub struct TranscriptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl TranscriptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// One consultation request: system prompt, transcript, advertised tools.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [TranscriptMessage],
    pub tools: &'a [Value],
}

/// The model's parsed output: exactly one tool request, or a final answer
/// as an ordered sequence of text fragments.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDecision {
    ToolRequest {
        name: String,
        arguments: Map<String, Value>,
    },
    Answer(Vec<String>),
}

/// Seam between the orchestrator and the language model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn propose(&self, request: ModelRequest<'_>) -> Result<ModelDecision, ChatError>;
}

/// Client for an OpenAI-compatible chat completions endpoint with function
/// calling.
pub struct OpenAiModelClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
}

impl OpenAiModelClient {
    /// Build a client from the model configuration.
    pub fn new(config: &ModelConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| ChatError::Model(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiModelClient {
    async fn propose(&self, request: ModelRequest<'_>) -> Result<ModelDecision, ChatError> {
        let mut messages = vec![json!({"role": "system", "content": request.system})];
        for msg in request.messages {
            messages.push(json!({"role": msg.role.as_str(), "content": msg.content}));
        }

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "tools": request.tools,
        });

        let mut http = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(ref key) = self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| ChatError::Model(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChatError::Model(e.to_string()))?;

        let completion: Value = response
            .json()
            .await
            .map_err(|e| ChatError::Model(e.to_string()))?;

        parse_completion(&completion)
    }
}

/// Parse a chat completion into a decision.
///
/// A `tool_calls` entry wins over text content; absent both, the completion
/// is malformed.
pub(crate) fn parse_completion(completion: &Value) -> Result<ModelDecision, ChatError> {
    let message = &completion["choices"][0]["message"];

    if let Some(tool_call) = message["tool_calls"].get(0) {
        let function = &tool_call["function"];
        let name = function["name"]
            .as_str()
            .ok_or_else(|| ChatError::Model("tool call without a name".to_string()))?
            .to_string();
        let arguments = parse_arguments(&function["arguments"])?;
        return Ok(ModelDecision::ToolRequest { name, arguments });
    }

    match message["content"].as_str() {
        Some(content) if !content.is_empty() => {
            Ok(ModelDecision::Answer(vec![content.to_string()]))
        }
        _ => Err(ChatError::Model("empty completion".to_string())),
    }
}

/// Function arguments arrive either as a JSON-encoded string (the OpenAI
/// wire format) or as a plain object.
fn parse_arguments(value: &Value) -> Result<Map<String, Value>, ChatError> {
    let parsed = match value {
        Value::String(s) if s.trim().is_empty() => Value::Object(Map::new()),
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| ChatError::Model(format!("unparseable tool arguments: {}", e)))?,
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    match parsed {
        Value::Object(map) => Ok(map),
        _ => Err(ChatError::Model(
            "tool arguments are not an object".to_string(),
        )),
    }
}
