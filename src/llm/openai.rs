//! OpenAI-compatible chat completions client
//!
//! This module implements both client traits for any endpoint speaking the
//! `/chat/completions` protocol. The same type backs the planning endpoint
//! (text only) and the executor endpoint (tools, optional streaming).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::{Event, EventSource};
use serde_json::{Value, json};

use crate::llm::client::{ExecutorClient, LlmError, PlanningClient};
use crate::llm::pool::{ClientPool, Endpoint};
use crate::llm::streaming::{StreamChunk, StreamHandle, StreamParser, create_stream_channel, parse_arguments};
use crate::llm::types::{ChatMessage, ChatRequest, ChatResponse, ContentBlock, FinishReason, MessageContent, ToolCall, Usage};

/// Default model to use
const DEFAULT_MODEL: &str = "gpt-4o";

/// Default max tokens for planning calls
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default sampling temperature for planning calls
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Channel capacity between the SSE reader task and the consumer
const STREAM_BUFFER: usize = 64;

/// Per-client settings
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl OpenAiConfig {
    /// Create a new config with a specific model
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Client for an OpenAI-compatible endpoint
pub struct OpenAiClient {
    client: Client,
    endpoint: Endpoint,
    config: OpenAiConfig,
    usage: Arc<Mutex<Usage>>,
}

impl OpenAiClient {
    /// Create a client backed by the shared pool
    pub fn new(pool: &ClientPool, endpoint: Endpoint, config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = pool.client_for(&endpoint)?;
        Ok(Self {
            client,
            endpoint,
            config,
            usage: Arc::new(Mutex::new(Usage::default())),
        })
    }

    fn post(&self) -> RequestBuilder {
        let builder = self
            .client
            .post(self.endpoint.completions_url())
            .header("content-type", "application/json");
        if self.endpoint.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.endpoint.api_key)
        }
    }

    /// Body for a planning call: one user message, never a `tools` field
    fn build_planning_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        })
    }

    /// Body for an executor call
    fn build_request(&self, request: &ChatRequest) -> Value {
        let model = if request.model.is_empty() {
            self.config.model.as_str()
        } else {
            request.model.as_str()
        };

        let messages: Vec<Value> = request.messages.iter().flat_map(message_to_openai).collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": request.stream
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request.tools.iter().map(|t| t.to_openai_schema()).collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!(request.tool_choice.as_deref().unwrap_or("auto"));
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        body
    }

    /// Parse the API response into a ChatResponse
    fn parse_response(&self, body: &Value) -> Result<ChatResponse, LlmError> {
        let response = parse_completion(body)?;
        let mut total = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        total.add(&response.usage);
        Ok(response)
    }

    /// Send a batched request
    async fn send_request(&self, body: Value) -> Result<Value, LlmError> {
        let timeout = self.endpoint.timeout;
        let response = self
            .post()
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { LlmError::Timeout(timeout) } else { LlmError::Network(e) })?;

        let status = response.status();

        // Handle rate limiting
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// Get cumulative token usage
    pub fn total_usage(&self) -> Usage {
        *self.usage.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PlanningClient for OpenAiClient {
    async fn plan(&self, prompt: &str) -> Result<String, LlmError> {
        log::info!("Calling boost model: {}", self.config.model);
        let body = self.build_planning_body(prompt);
        let response = self.send_request(body).await?;

        let content = response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".to_string()))?;

        log::info!("Boost model response received: {} characters", content.len());
        Ok(content.to_string())
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ExecutorClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let mut body = self.build_request(&request);
        body["stream"] = json!(false);
        let response = self.send_request(body).await?;
        self.parse_response(&response)
    }

    async fn stream(&self, request: ChatRequest) -> Result<StreamHandle, LlmError> {
        let mut body = self.build_request(&request);
        body["stream"] = json!(true);

        let mut source =
            EventSource::new(self.post().json(&body)).map_err(|e| LlmError::EventSource(e.to_string()))?;

        // Surface rejected requests before handing out a handle
        let mut pending = Vec::new();
        let mut parser = StreamParser::new();
        match source.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(message))) => pending = parser.process_data(&message.data),
            Some(Err(err)) => {
                source.close();
                return Err(eventsource_error(err).await);
            }
            None => return Err(LlmError::EventSource("stream closed before opening".to_string())),
        }

        let (tx, handle) = create_stream_channel(STREAM_BUFFER);
        tokio::spawn(async move {
            let mut ended = false;
            for chunk in pending {
                ended |= chunk.is_terminal();
                if tx.send(chunk).await.is_err() {
                    source.close();
                    return;
                }
            }

            while !ended {
                let chunks = match source.next().await {
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(message))) => parser.process_data(&message.data),
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => parser.finish(),
                    Some(Err(err)) => vec![StreamChunk::Error(err.to_string())],
                };
                for chunk in chunks {
                    ended |= chunk.is_terminal();
                    if tx.send(chunk).await.is_err() {
                        log::debug!("Stream consumer went away, closing upstream");
                        source.close();
                        return;
                    }
                }
            }
            source.close();
        });

        Ok(handle)
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.endpoint.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

async fn eventsource_error(err: reqwest_eventsource::Error) -> LlmError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => LlmError::ApiError {
            status: status.as_u16(),
            message: response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string()),
        },
        reqwest_eventsource::Error::Transport(e) => LlmError::Network(e),
        other => LlmError::EventSource(other.to_string()),
    }
}

/// Convert one message to OpenAI wire messages.
///
/// Tool results become separate `tool` messages placed ahead of the text they
/// accompany; tool uses become `tool_calls` on the assistant message.
fn message_to_openai(message: &ChatMessage) -> Vec<Value> {
    let blocks = match &message.content {
        MessageContent::Text(text) => {
            return vec![json!({ "role": message.role.as_str(), "content": text })];
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut out = Vec::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::ToolResult {
                tool_use_id, content, ..
            } => {
                let content = match content {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push(json!({ "role": "tool", "tool_call_id": tool_use_id, "content": content }));
            }
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(json!({
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": input.to_string() }
            })),
            ContentBlock::Text { .. } => {}
        }
    }

    let text = message.content.text();
    if !text.is_empty() || !tool_calls.is_empty() {
        let mut msg = json!({ "role": message.role.as_str(), "content": text });
        if !tool_calls.is_empty() {
            msg["tool_calls"] = json!(tool_calls);
        }
        out.push(msg);
    }
    out
}

/// Parse a batched chat completion body
pub fn parse_completion(body: &Value) -> Result<ChatResponse, LlmError> {
    let choice = body
        .pointer("/choices/0")
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let id = call["id"].as_str().unwrap_or_default();
                    let name = call.pointer("/function/name").and_then(Value::as_str)?;
                    let arguments = call.pointer("/function/arguments").and_then(Value::as_str).unwrap_or("");
                    Some(ToolCall::new(id, name, parse_arguments(arguments)))
                })
                .collect()
        })
        .unwrap_or_default();

    let finish_reason = choice["finish_reason"]
        .as_str()
        .map(FinishReason::parse)
        .unwrap_or_default();

    let usage = body
        .get("usage")
        .map(|u| {
            Usage::new(
                u["prompt_tokens"].as_u64().unwrap_or(0),
                u["completion_tokens"].as_u64().unwrap_or(0),
            )
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        tool_calls,
        finish_reason,
        usage,
    })
}
