//! Anthropic-Style Provider Implementation
//!
//! Client for an Anthropic-compatible messages API:
//!
//! - `POST /v1/messages`: chat completions, blocking or streamed
//!
//! Streaming responses arrive as server-sent events; the deltas worth
//! forwarding are `content_block_delta` events carrying `text_delta`
//! payloads, and the stream terminates on `message_stop`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{ChatProvider, ProviderEvent, ProviderReply, ProviderRequest};

/// Anthropic API version header value
const API_VERSION: &str = "2023-06-01";

/// Default request timeout for the underlying HTTP client
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Anthropic-style provider client
#[derive(Clone)]
pub struct AnthropicProvider {
    /// API base URL (no trailing slash)
    base_url: String,
    /// API key sent in the `x-api-key` header
    api_key: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider against the public Anthropic endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.anthropic.com")
    }

    /// Create a provider against a custom endpoint
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            api_key: api_key.into(),
            http_client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Messages endpoint URL
    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    /// Build the request body
    fn build_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
            "temperature": request.temperature,
        });
        if !request.system.is_empty() {
            body["system"] = serde_json::Value::String(request.system.clone());
        }
        if stream {
            body["stream"] = serde_json::Value::Bool(true);
        }
        body
    }

    /// Issue the POST and fail on non-success status
    async fn post(&self, body: &serde_json::Value) -> anyhow::Result<reqwest::Response> {
        let response = self
            .http_client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("provider returned {status}: {body}");
        }
        Ok(response)
    }
}

// ============================================================================
// SSE Parsing
// ============================================================================

/// Decoded payload of one SSE `data:` line
#[derive(Clone, Debug, PartialEq, Eq)]
enum SseEvent {
    /// Text delta to forward
    Delta(String),
    /// Message finished
    Stop,
    /// Upstream reported an error
    Error(String),
}

/// Decode one SSE data payload; returns `None` for events we skip
/// (pings, block boundaries, malformed JSON).
fn parse_sse_data(data: &str) -> Option<SseEvent> {
    let event: serde_json::Value = serde_json::from_str(data).ok()?;
    match event.get("type").and_then(|t| t.as_str())? {
        "content_block_delta" => {
            let delta = event.get("delta")?;
            if delta.get("type").and_then(|t| t.as_str()) == Some("text_delta") {
                let text = delta.get("text").and_then(|t| t.as_str())?;
                if text.is_empty() {
                    None
                } else {
                    Some(SseEvent::Delta(text.to_string()))
                }
            } else {
                None
            }
        }
        "message_stop" => Some(SseEvent::Stop),
        "error" => {
            let message = event
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown provider error");
            Some(SseEvent::Error(message.to_string()))
        }
        _ => None,
    }
}

/// Pull the payload out of one SSE line, if it is a data line
fn sse_data_line(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

// ============================================================================
// Trait Implementation
// ============================================================================

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "Anthropic"
    }

    async fn health_check(&self) -> bool {
        // Any HTTP response means the endpoint is reachable
        self.http_client
            .get(&self.base_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }

    async fn complete(&self, request: &ProviderRequest) -> anyhow::Result<ProviderReply> {
        let start = Instant::now();
        let body = Self::build_body(request, false);
        let response = self.post(&body).await?;

        let data: serde_json::Value = response.json().await?;

        // Concatenate the text content blocks
        let text = data
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<String>()
            })
            .unwrap_or_default();

        let tokens_used = data
            .get("usage")
            .and_then(|u| u.get("output_tokens"))
            .and_then(serde_json::Value::as_u64)
            .map(|c| u32::try_from(c).unwrap_or(u32::MAX));

        Ok(ProviderReply {
            text,
            model: request.model.clone(),
            tokens_used,
            duration_ms: Some(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)),
        })
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
    ) -> anyhow::Result<mpsc::Receiver<ProviderEvent>> {
        let (tx, rx) = mpsc::channel(100);

        let body = Self::build_body(request, true);
        let response = self.post(&body).await?;
        let mut byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();
            let mut full_text = String::new();

            while let Some(chunk) = byte_stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        // Process complete lines; SSE events are line-delimited
                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim_end_matches('\r').to_string();
                            buffer.drain(..=pos);

                            let Some(data) = sse_data_line(&line) else {
                                continue;
                            };
                            match parse_sse_data(data) {
                                Some(SseEvent::Delta(text)) => {
                                    full_text.push_str(&text);
                                    if tx.send(ProviderEvent::Delta(text)).await.is_err() {
                                        // Receiver dropped: caller cancelled, stop streaming
                                        return;
                                    }
                                }
                                Some(SseEvent::Stop) => {
                                    let _ = tx
                                        .send(ProviderEvent::Done { text: full_text })
                                        .await;
                                    return;
                                }
                                Some(SseEvent::Error(message)) => {
                                    let _ = tx.send(ProviderEvent::Error(message)).await;
                                    return;
                                }
                                None => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(ProviderEvent::Error(e.to_string())).await;
                        return;
                    }
                }
            }

            // Stream ended without a stop event
            if full_text.is_empty() {
                let _ = tx
                    .send(ProviderEvent::Error(
                        "stream ended before message_stop".to_string(),
                    ))
                    .await;
            } else {
                let _ = tx.send(ProviderEvent::Done { text: full_text }).await;
            }
        });

        Ok(rx)
    }
}

// ============================================================================
// Tests
// ============================================================================
