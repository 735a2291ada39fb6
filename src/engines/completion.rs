//! Streaming completion service client
//!
//! OpenAI-compatible chat completions: streamed token chunks over SSE for
//! regular replies, or a one-shot response when a tool call is forced.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Role of a conversation history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role-tagged conversation history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Tool (function) specification advertised to the completion service
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object
    pub parameters: serde_json::Value,
}

/// Tool selection mode for one completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides whether to call a tool
    Auto,
    /// Force a call to the named tool
    Forced(String),
}

/// A tool call returned by the completion service
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// Raw JSON arguments string; may be malformed and is validated per call
    pub arguments: String,
}

/// One completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
    pub max_tokens: u32,
    pub stream: bool,
}

/// A streamed token chunk
#[derive(Debug, Clone)]
pub struct CompletionChunk {
    pub token: String,
}

/// A one-shot (non-streaming) completion response
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Result of a completion call: either a live token stream or a full response
pub enum CompletionOutcome {
    /// Token chunks arrive on the receiver as the service produces them
    Streaming(mpsc::Receiver<Result<CompletionChunk>>),
    /// Full response, used for forced tool calls
    Full(CompletionResponse),
}

/// Streaming-token source with optional tool calls
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Run one completion exchange over the given history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Completion`] on request failure. Mid-stream errors
    /// are delivered through the streaming receiver instead so partial
    /// output is preserved.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionOutcome>;
}

/// OpenAI-compatible chat-completions client
pub struct HttpCompletionService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    deployment: String,
}

impl HttpCompletionService {
    #[must_use]
    pub fn new(endpoint: String, api_key: String, deployment: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            deployment,
        }
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let tool_choice = match &request.tool_choice {
            ToolChoice::Auto => serde_json::json!("auto"),
            ToolChoice::Forced(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        };

        let mut body = serde_json::json!({
            "model": self.deployment,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "stream": request.stream,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(tools);
            body["tool_choice"] = tool_choice;
        }
        body
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.build_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "completion API error");
            return Err(Error::Completion(format!("completion API error {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionOutcome> {
        let response = self.send(&request).await?;

        if !request.stream {
            let raw: WireResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "failed to parse completion response");
                Error::Completion(e.to_string())
            })?;
            return Ok(CompletionOutcome::Full(parse_full(raw)));
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            // SSE events can split across network chunks, so line-buffer
            let mut pending = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(Error::Completion(e.to_string()))).await;
                        return;
                    }
                };
                pending.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = pending.find('\n') {
                    let line = pending[..pos].trim_end_matches('\r').to_string();
                    pending.drain(..=pos);
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return;
                    }
                    if let Some(token) = parse_delta(data) {
                        if tx.send(Ok(CompletionChunk { token })).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(CompletionOutcome::Streaming(rx))
    }
}

/// Extract the delta content token from one SSE data payload
fn parse_delta(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value["choices"][0]["delta"]["content"]
        .as_str()
        .map(String::from)
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

fn parse_full(raw: WireResponse) -> CompletionResponse {
    raw.choices.into_iter().next().map_or_else(CompletionResponse::default, |choice| {
        CompletionResponse {
            content: choice.message.content,
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|c| ToolCall { name: c.function.name, arguments: c.function.arguments })
                .collect(),
        }
    })
}
