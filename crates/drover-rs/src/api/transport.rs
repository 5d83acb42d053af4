//! Chat transport seam and the default OpenRouter SSE client.
//!
//! The [`ChatTransport`] trait is the boundary between the agent loop and
//! the chat backend: a request goes in, an incremental stream of
//! [`StreamEvent`]s comes out. The [`StreamingRouter`](super::router::StreamingRouter)
//! consumes deltas as they arrive, so text can be surfaced before tool-call
//! argument fragments finish accumulating.
//!
//! [`OpenRouterClient`] is the production implementation: it speaks the
//! OpenRouter chat-completions SSE wire format over `reqwest`, retries
//! transient connection failures per [`RetryConfig`](super::retry::RetryConfig),
//! and feeds parsed events through a channel-backed stream.

use crate::api::retry::{self, RetryConfig};
use crate::{ChatRequest, OPENROUTER_URL, UsageInfo};
use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

// ── Stream events ──────────────────────────────────────────────────

/// A single event from a streaming chat completion.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// An incremental text content delta.
    TextDelta(String),
    /// A tool call chunk. Fragments are keyed by `index` (not id — the id
    /// may be assigned late) and accumulated by the router.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments_delta: String,
    },
    /// Token usage information (sent with the terminal chunk).
    Usage(UsageInfo),
    /// The finish reason for the current choice (`stop`, `tool_calls`, ...).
    Finish(String),
    /// The stream is complete.
    Done,
}

/// An incremental stream of chat events. Errors are transport-level
/// failures and terminate the turn.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, String>> + Send>>;

/// The chat backend seam consumed by the agent loop.
///
/// Implementors carry their own retry policy — the loop never retries.
pub trait ChatTransport: Send + Sync {
    /// Open one streaming chat completion for the given request.
    fn chat_stream(&self, request: ChatRequest) -> EventStream;
}

// ── SSE wire format ────────────────────────────────────────────────

/// Raw SSE data chunk from the OpenRouter API.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Deserialize, Debug)]
struct StreamToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<StreamFunctionDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Parse a single SSE `data:` payload into stream events.
fn parse_sse_data(data: &str, events: &mut Vec<StreamEvent>) {
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(usage) = chunk.usage {
                events.push(StreamEvent::Usage(usage));
            }
            if let Some(choices) = chunk.choices {
                for choice in choices {
                    if let Some(delta) = choice.delta {
                        if let Some(content) = delta.content
                            && !content.is_empty()
                        {
                            events.push(StreamEvent::TextDelta(content));
                        }
                        if let Some(tool_calls) = delta.tool_calls {
                            for tc in tool_calls {
                                let func = tc.function.unwrap_or(StreamFunctionDelta {
                                    name: None,
                                    arguments: None,
                                });
                                events.push(StreamEvent::ToolCallDelta {
                                    index: tc.index.unwrap_or(0),
                                    id: tc.id,
                                    name: func.name,
                                    arguments_delta: func.arguments.unwrap_or_default(),
                                });
                            }
                        }
                    }
                    if let Some(reason) = choice.finish_reason {
                        trace!("Stream finish_reason: {reason}");
                        events.push(StreamEvent::Finish(reason));
                    }
                }
            }
        }
        Err(e) => {
            warn!("Failed to parse SSE chunk: {e} — data: {data}");
        }
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async SSE client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    referer: String,
    title: String,
    retry: RetryConfig,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/drover-rs", "drover-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("drover-rs/0.3")
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
            retry: RetryConfig::default(),
        })
    }

    /// Set the retry policy for opening the streaming connection.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Open the SSE connection, retrying transient failures per the retry
    /// config. Only the connection attempt is retried — once bytes have
    /// flowed, a mid-stream failure terminates the turn.
    async fn connect(&self, body: &serde_json::Value) -> Result<reqwest::Response, String> {
        let mut attempt = 0;
        loop {
            let result = self
                .client
                .post(OPENROUTER_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("HTTP-Referer", &self.referer)
                .header("X-Title", &self.title)
                .json(body)
                .send()
                .await
                .map_err(|e| format!("streaming request failed: {e}"));

            let error = match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    format!("OpenRouter API HTTP {status}: {text}")
                }
                Err(e) => e,
            };

            if attempt < self.retry.max_retries
                && retry::is_transient_error(&error)
                && !retry::is_permanent_error(&error)
            {
                let delay = self.retry.delay_for_attempt(attempt);
                warn!(
                    "Transient API error (attempt {}/{}): {error}. Retrying in {delay:?}...",
                    attempt + 1,
                    self.retry.max_retries,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            } else {
                return Err(error);
            }
        }
    }
}

impl ChatTransport for OpenRouterClient {
    fn chat_stream(&self, request: ChatRequest) -> EventStream {
        let (tx, rx) = mpsc::channel::<Result<StreamEvent, String>>(64);

        let mut body = match serde_json::to_value(&request) {
            Ok(v) => v,
            Err(e) => {
                // Serialization can't suspend, so report through the stream.
                let _ = tx.try_send(Err(format!("failed to serialize request: {e}")));
                return Box::pin(ReceiverStream::new(rx));
            }
        };
        body["stream"] = serde_json::Value::Bool(true);

        let client = self.clone_for_task();
        tokio::spawn(async move {
            debug!("Opening streaming chat request");
            let mut resp = match client.connect(&body).await {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            // Read the SSE stream incrementally via chunk() so long
            // responses don't hit a single-body timeout.
            let mut buffer = String::new();
            let mut sent = 0usize;
            loop {
                let chunk = match resp.chunk().await {
                    Ok(Some(c)) => c,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx
                            .send(Err(format!("failed to read streaming chunk: {e}")))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Process all complete lines in the buffer.
                while let Some(newline_pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline_pos).collect();
                    let line = line.trim();
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    if line == "data: [DONE]" {
                        let _ = tx.send(Ok(StreamEvent::Done)).await;
                        debug!("Stream completed with {sent} events");
                        return;
                    }
                    if let Some(data) = line.strip_prefix("data: ") {
                        let mut events = Vec::new();
                        parse_sse_data(data, &mut events);
                        sent += events.len();
                        for ev in events {
                            if tx.send(Ok(ev)).await.is_err() {
                                return; // Consumer dropped the stream.
                            }
                        }
                    }
                }
            }

            // Process any remaining data in the buffer (incomplete final line).
            let remaining = buffer.trim();
            if !remaining.is_empty()
                && remaining != "data: [DONE]"
                && let Some(data) = remaining.strip_prefix("data: ")
            {
                let mut events = Vec::new();
                parse_sse_data(data, &mut events);
                for ev in events {
                    let _ = tx.send(Ok(ev)).await;
                }
            }

            let _ = tx.send(Ok(StreamEvent::Done)).await;
            debug!("Stream completed with {sent} events");
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

impl OpenRouterClient {
    /// Cheap clone for moving into the reader task. `reqwest::Client` is an
    /// `Arc` internally.
    fn clone_for_task(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            referer: self.referer.clone(),
            title: self.title.clone(),
            retry: self.retry.clone(),
        }
    }
}
