//! Streaming chat client for OpenAI-compatible services (DashScope, vLLM, OpenAI)

use super::{ChatModel, IncrementStream, SseDecoder, ToolSpec};
use crate::config::LLMServiceConfig;
use crate::error::{MedAssistError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Author of a message in the model-facing history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function part of a tool call as it travels on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFunction {
    pub name: String,
    pub arguments: String,
}

/// Tool call attached to an assistant message in the request history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: WireFunction,
}

/// Chat message for completion requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            name: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant turn that requested tools
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<WireToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// Result of a tool call, linked back by id
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// One chat-completion request: full history plus the tools on offer
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: ToolSpec::all(),
        }
    }
}

/// Join a base URL and an API path. Bare hosts get `/v1`, bases that already
/// end in a version segment (`.../v1`, `.../compatible-mode/v1`) are kept.
pub fn endpoint_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let versioned = base
        .rsplit('/')
        .next()
        .map(|last| {
            last.len() > 1
                && last.starts_with('v')
                && last[1..].chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or(false);

    if versioned {
        format!("{}/{}", base, path.trim_start_matches('/'))
    } else {
        format!("{}/v1/{}", base, path.trim_start_matches('/'))
    }
}

/// API metrics for monitoring
#[derive(Debug, Default)]
pub struct APIMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

/// Snapshot of API metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub avg_latency_ms: f64,
}

/// OpenAI-compatible streaming chat client
pub struct OpenAICompatClient {
    http_client: reqwest::Client,
    config: LLMServiceConfig,
    metrics: Arc<APIMetrics>,
}

impl OpenAICompatClient {
    /// Create new client from configuration
    pub fn new(config: LLMServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedAssistError::ModelCall(format!("failed to build client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
            metrics: Arc::new(APIMetrics::default()),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(LLMServiceConfig::default())
    }

    /// Get current API metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        let total = self.metrics.total_requests.load(Ordering::Relaxed);
        MetricsSnapshot {
            total_requests: total,
            total_errors: self.metrics.total_errors.load(Ordering::Relaxed),
            avg_latency_ms: if total > 0 {
                self.metrics.total_latency_ms.load(Ordering::Relaxed) as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    fn record_error(&self) {
        self.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    stream: bool,
}

struct StreamState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<super::ModelIncrement>,
    finished: bool,
    metrics: Arc<APIMetrics>,
}

#[async_trait]
impl ChatModel for OpenAICompatClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<IncrementStream> {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let tools: Vec<serde_json::Value> = request.tools.iter().map(ToolSpec::to_wire).collect();
        let body = WireRequest {
            model: &self.config.model,
            messages: &request.messages,
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
            tools,
            stream: true,
        };

        let url = endpoint_url(&self.config.url, "chat/completions");
        tracing::debug!(
            "Chat completion: {} messages, {} tools -> {}",
            request.messages.len(),
            request.tools.len(),
            url
        );

        let mut req = self.http_client.post(&url).json(&body);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(|e| {
            self.record_error();
            MedAssistError::ModelCall(format!("request failed: {}", e))
        })?;

        if !response.status().is_success() {
            self.record_error();
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MedAssistError::ModelCall(format!(
                "LLM service error (HTTP {}): {}",
                status, body
            )));
        }

        let elapsed = start.elapsed().as_millis() as u64;
        self.metrics
            .total_latency_ms
            .fetch_add(elapsed, Ordering::Relaxed);

        let state = StreamState {
            bytes: Box::pin(response.bytes_stream()),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
            metrics: Arc::clone(&self.metrics),
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(increment) = state.pending.pop_front() {
                    return Some((Ok(increment), state));
                }
                if state.finished {
                    return None;
                }

                let next = if state.decoder.is_done() {
                    None
                } else {
                    state.bytes.next().await
                };

                let decoded = match next {
                    Some(Ok(chunk)) => state.decoder.feed(&chunk[..]),
                    Some(Err(e)) => {
                        state.finished = true;
                        state.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
                        return Some((
                            Err(MedAssistError::ModelCall(format!("stream interrupted: {}", e))),
                            state,
                        ));
                    }
                    None => {
                        state.finished = true;
                        state.decoder.finish()
                    }
                };

                match decoded {
                    Ok(increments) => state.pending.extend(increments),
                    Err(e) => {
                        state.finished = true;
                        state.pending.clear();
                        state.metrics.total_errors.fetch_add(1, Ordering::Relaxed);
                        return Some((Err(e), state));
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
