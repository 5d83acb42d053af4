//! Opinionated Rust core for an LLM-backed coding-assistant agent.
//!
//! `drover-rs` implements the control logic of a tool-using coding agent:
//! the [`StreamingRouter`](api::router::StreamingRouter) classifies a request
//! into a model tier, drives a streaming chat completion over a pluggable
//! [`ChatTransport`](api::transport::ChatTransport), and multiplexes text
//! output against sandboxed tool execution through a
//! [`ToolRegistry`](tools::registry::ToolRegistry) gated by a
//! [`PermissionManager`](tools::permission::PermissionManager). Conversation
//! state, token accounting, and compaction live in the
//! [`SessionManager`](session::SessionManager).
//!
//! # Getting started
//!
//! ```ignore
//! use drover_rs::api::router::StreamingRouter;
//! use drover_rs::api::transport::OpenRouterClient;
//! use drover_rs::config::RouterConfig;
//! use drover_rs::tools::registry::ToolRegistry;
//! use drover_rs::Message;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let client = OpenRouterClient::new(api_key)?;
//!
//!     let router = StreamingRouter::new(Arc::new(client), RouterConfig::default())
//!         .with_tools(ToolRegistry::new().with_common_tools("."));
//!
//!     let outcome = router
//!         .run(vec![Message::user("Read src/main.rs and summarize it.")])
//!         .await
//!         .map_err(|e| e.to_string())?;
//!
//!     println!("{}", outcome.text);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Route and stream a turn:** [`api::router`] — the agent loop state
//!   machine, turn events, and cancellation semantics.
//! - **Classify a request into a tier:** [`api::classifier`] — the ordered
//!   complex/simple pattern gate.
//! - **Define tools:** the [`Tool`](tools::registry::Tool) trait and
//!   [`tools::common`] for the built-in file and shell tools.
//! - **Gate tool execution:** [`tools::permission`] — allow/ask/deny rules
//!   with first-match-wins ordering and an injected human prompter.
//! - **Persist conversations:** [`session`] — durable session records,
//!   token budget tracking, and compaction.
//! - **Track sub-agents:** [`agent::sub_agent`] — the Task-tool bookkeeping
//!   registry.
//!
//! # Design principles
//!
//! 1. **Ordering is the contract.** Text deltas are emitted in arrival
//!    order; tool-call fragments are concatenated in arrival order per call
//!    index; dispatch within a batch is strictly sequential.
//! 2. **Failures are values.** Tools return [`ToolResult`](tools::registry::ToolResult)
//!    rather than panicking, denials are explained rather than thrown, and
//!    the model can self-correct from any failure text.
//! 3. **Suspension points take injected resolvers.** The human prompter,
//!    the summarizer, and the chat transport are all capabilities passed at
//!    construction time — never ambient globals.
//! 4. **One writer per session.** A session record is mutated only by its
//!    owning manager and only from the turn in progress; persistence is
//!    whole-record replace.

pub mod agent;
pub mod api;
pub mod config;
pub mod session;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Approximate characters per token used for all local estimates.
pub const CHARS_PER_TOKEN: f64 = 3.5;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types
/// and the `serde_json::Value` the function-calling API expects.
///
/// # Example
///
/// ```
/// use drover_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ShellArgs {
///     command: String,
/// }
///
/// let schema = json_schema_for::<ShellArgs>();
/// assert_eq!(schema["type"], "object");
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Tier ───────────────────────────────────────────────────────────

/// A model-selection bucket chosen by heuristic classification.
///
/// Tiers trade capability for latency and cost: `Superfast` for short
/// factual questions, `Fast` for longer simple asks, `Smart` for anything
/// that smells like implementation, refactoring, or debugging work.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Superfast,
    Fast,
    Smart,
}

impl Tier {
    /// Context window size (in tokens) assumed for models in this tier.
    /// Used by the session manager's compaction trigger.
    pub fn context_window_tokens(&self) -> usize {
        match self {
            Tier::Superfast => 32_000,
            Tier::Fast => 128_000,
            Tier::Smart => 200_000,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Superfast => write!(f, "superfast"),
            Tier::Fast => write!(f, "fast"),
            Tier::Smart => write!(f, "smart"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "superfast" => Ok(Tier::Superfast),
            "fast" => Ok(Tier::Fast),
            "smart" => Ok(Tier::Smart),
            other => Err(format!(
                "unknown tier '{other}' (expected superfast, fast, or smart)"
            )),
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Message content: either plain text or an ordered list of parts
/// (text fragments and image references).
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multi-part message body.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageRef },
}

/// Reference to an image attached to a message.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ImageRef {
    pub url: String,
}

/// A message in the conversation. Immutable once appended to a session —
/// message order is the sole sequencing authority.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// A user message carrying text plus attached images.
    pub fn user_with_images(text: impl Into<String>, image_urls: Vec<String>) -> Self {
        let mut parts = vec![ContentPart::Text { text: text.into() }];
        parts.extend(
            image_urls
                .into_iter()
                .map(|url| ContentPart::ImageUrl {
                    image_url: ImageRef { url },
                }),
        );
        Self {
            role: MessageRole::User,
            content: Some(MessageContent::Parts(parts)),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Synthetic assistant message carrying a raw tool call.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// Tool-role message carrying a tool result back to the model.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Plain text view of the content. Multi-part bodies are flattened to
    /// their text parts; image references contribute nothing.
    pub fn text(&self) -> String {
        match &self.content {
            Some(MessageContent::Text(s)) => s.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            None => String::new(),
        }
    }

    /// Character count of the content, for token estimation.
    pub fn char_len(&self) -> usize {
        match &self.content {
            Some(MessageContent::Text(s)) => s.len(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::ImageUrl { image_url } => image_url.url.len(),
                })
                .sum(),
            None => 0,
        }
    }

    /// Whether this message carries at least one image reference.
    pub fn has_images(&self) -> bool {
        matches!(&self.content, Some(MessageContent::Parts(parts))
            if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }
}

// ── Tool wire types ────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition. `ToolType` is always
    /// `Function` in the current API, so there's no reason to specify it.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call requested by the model. The id is unique within its turn
/// and never reused.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Request / usage types ──────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderPreferences>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// Provider routing preferences: an optional hint steering the request to a
/// specific upstream backend for latency/cost reasons.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProviderPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_fallbacks: Option<bool>,
}

impl ProviderPreferences {
    /// A hint that prefers one named provider but allows fallbacks.
    pub fn prefer(provider: impl Into<String>) -> Self {
        Self {
            order: Some(vec![provider.into()]),
            allow_fallbacks: Some(true),
        }
    }
}

/// Token usage statistics reported by the API.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}
