//! The streaming agent loop: classify, stream, dispatch tools, repeat.
//!
//! One turn moves through `CLASSIFYING → STREAMING → (TOOL_DISPATCH ⇄
//! STREAMING) → DONE | ABORTED | ERROR`. Classification picks the model
//! tier (an explicit override or attached images short-circuit it);
//! streaming surfaces text deltas to the [`TurnHandler`] the moment they
//! arrive while tool-call argument fragments accumulate by index; a
//! `tool_calls` finish dispatches the accumulated batch sequentially
//! through the [`ToolRegistry`](crate::tools::registry::ToolRegistry) and
//! loops back into streaming with the extended message list. Cancellation
//! is observed at the top of every round and before every dispatch — a
//! tool is never dispatched after the token is set.

use crate::api::classifier::Classifier;
use crate::api::transport::{ChatTransport, StreamEvent};
use crate::config::RouterConfig;
use crate::tools::registry::{ToolRegistry, ToolResult};
use crate::{ChatRequest, FunctionCallData, Message, ProviderPreferences, Tier, ToolCall, UsageInfo};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ── Errors ─────────────────────────────────────────────────────────

/// Terminal failure of an agent turn.
///
/// Cancellation and transport failure are distinct terminations: an
/// aborted turn is the user's doing, a transport failure is not, and
/// callers render them differently.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The turn's cancellation token was set.
    #[error("turn aborted")]
    Aborted,
    /// The streaming transport failed. Not retried here — retry policy
    /// belongs to the transport.
    #[error("transport error: {0}")]
    Transport(String),
}

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted during a turn, in order of occurrence.
#[derive(Debug)]
pub enum TurnEvent<'a> {
    /// An incremental text delta, emitted as it arrives.
    Text { delta: &'a str },
    /// A tool call is about to be dispatched.
    ToolCall { call: &'a ToolCall, round: usize },
    /// A tool call finished (success or normalized failure).
    ToolResult {
        call: &'a ToolCall,
        result: &'a ToolResult,
    },
    /// The turn completed normally.
    Done {
        tier: Tier,
        model: &'a str,
        usage: &'a UsageInfo,
        rounds_used: usize,
    },
}

/// Observer for [`TurnEvent`]s — rendering, logging, metrics.
///
/// Handlers run synchronously on the turn's flow of control; keep them
/// fast.
pub trait TurnHandler: Send + Sync {
    fn on_event(&self, event: &TurnEvent<'_>);
}

/// A handler that ignores every event.
pub struct NoopHandler;

impl TurnHandler for NoopHandler {
    fn on_event(&self, _event: &TurnEvent<'_>) {}
}

// ── Outcome ────────────────────────────────────────────────────────

/// The result of a completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Concatenated assistant text across all rounds.
    pub text: String,
    /// The tier the turn ran under.
    pub tier: Tier,
    /// The model id actually used.
    pub model: String,
    /// The full working message list, including synthetic assistant and
    /// tool messages appended during dispatch.
    pub messages: Vec<Message>,
    /// Accumulated token usage across rounds, when the upstream supplied it.
    pub usage: UsageInfo,
    /// Streaming rounds consumed.
    pub rounds_used: usize,
    /// Total tool calls dispatched.
    pub tools_dispatched: usize,
}

// ── Router ─────────────────────────────────────────────────────────

/// One accumulating tool-call slot, keyed by stream index.
#[derive(Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// The streaming agent loop.
pub struct StreamingRouter {
    transport: Arc<dyn ChatTransport>,
    tools: ToolRegistry,
    config: RouterConfig,
    classifier: Classifier,
    handler: Box<dyn TurnHandler>,
    cancel: CancellationToken,
}

impl StreamingRouter {
    pub fn new(transport: Arc<dyn ChatTransport>, config: RouterConfig) -> Self {
        Self {
            transport,
            tools: ToolRegistry::new(),
            config,
            classifier: Classifier::new(),
            handler: Box::new(NoopHandler),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach the tool registry advertised to the model.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Attach a turn event handler.
    pub fn with_handler(mut self, handler: impl TurnHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Use an externally owned cancellation token (e.g. wired to Ctrl-C).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The turn's cancellation token, for wiring into signal handlers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Pick the tier for this turn: explicit override, else classifier
    /// verdict, else the configured default.
    fn select_tier(&self, messages: &[Message]) -> Tier {
        if let Some(tier) = self.config.tier_override {
            debug!("Tier override: {tier}");
            return tier;
        }
        let latest = messages
            .iter()
            .rev()
            .find(|m| m.role == crate::MessageRole::User)
            .map(|m| m.text())
            .unwrap_or_default();
        match self.classifier.classify(&latest) {
            Some(tier) => tier,
            None => {
                debug!("No heuristic verdict; using default tier");
                self.config.default_tier
            }
        }
    }

    /// Run one agent turn to completion.
    ///
    /// Streams rounds against the selected model, dispatching tool batches
    /// sequentially between rounds, until the model stops asking for tools
    /// or the round limit is hit.
    pub async fn run(&self, mut messages: Vec<Message>) -> Result<TurnOutcome, RunError> {
        let tier = self.select_tier(&messages);
        let has_images = messages.iter().any(|m| m.has_images());

        // Images override routing entirely: vision model, no provider hint.
        let (model, provider) = if has_images {
            info!("Turn carries images; routing to vision model");
            (self.config.vision_model.clone(), None)
        } else {
            let provider = self.config.providers_for(tier).map(|order| {
                ProviderPreferences {
                    order: Some(order.to_vec()),
                    allow_fallbacks: Some(true),
                }
            });
            (self.config.model_for(tier).to_string(), provider)
        };
        info!("Turn routed to {model} (tier: {tier})");

        let definitions = self.tools.definitions();
        let mut text = String::new();
        let mut usage = UsageInfo::default();
        let mut rounds_used = 0;
        let mut tools_dispatched = 0;

        for round in 0..self.config.max_rounds {
            if self.cancel.is_cancelled() {
                info!("Turn aborted before round {}", round + 1);
                return Err(RunError::Aborted);
            }
            rounds_used = round + 1;

            let request = ChatRequest {
                model: Some(model.clone()),
                messages: messages.clone(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                tools: if definitions.is_empty() {
                    None
                } else {
                    Some(definitions.clone())
                },
                provider: provider.clone(),
            };

            // STREAMING: surface text immediately, accumulate tool-call
            // fragments by index. The slot map is fresh per round, so a
            // new batch never inherits stale fragments.
            let mut stream = self.transport.chat_stream(request);
            let mut pending: BTreeMap<usize, PendingCall> = BTreeMap::new();
            let mut round_text = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(StreamEvent::TextDelta(delta)) => {
                        self.handler.on_event(&TurnEvent::Text { delta: &delta });
                        round_text.push_str(&delta);
                    }
                    Ok(StreamEvent::ToolCallDelta {
                        index,
                        id,
                        name,
                        arguments_delta,
                    }) => {
                        let slot = pending.entry(index).or_default();
                        if let Some(id) = id {
                            slot.id = Some(id);
                        }
                        if let Some(name) = name {
                            slot.name = Some(name);
                        }
                        slot.arguments.push_str(&arguments_delta);
                    }
                    Ok(StreamEvent::Usage(u)) => {
                        accumulate_usage(&mut usage, &u);
                    }
                    Ok(StreamEvent::Finish(reason)) => {
                        debug!("Round {} finished: {reason}", round + 1);
                    }
                    Ok(StreamEvent::Done) => break,
                    Err(e) => {
                        warn!("Transport failure mid-stream: {e}");
                        return Err(RunError::Transport(e));
                    }
                }
            }

            if !round_text.is_empty() {
                text.push_str(&round_text);
            }

            let calls = assemble_calls(pending);
            if calls.is_empty() {
                // DONE: no pending tool work.
                if !round_text.is_empty() {
                    messages.push(Message::assistant_text(round_text));
                }
                self.handler.on_event(&TurnEvent::Done {
                    tier,
                    model: &model,
                    usage: &usage,
                    rounds_used,
                });
                return Ok(TurnOutcome {
                    text,
                    tier,
                    model,
                    messages,
                    usage,
                    rounds_used,
                    tools_dispatched,
                });
            }

            // TOOL_DISPATCH: strictly sequential, in first-observed order.
            // Later calls may depend on side effects of earlier ones.
            if !round_text.is_empty() {
                messages.push(Message::assistant_text(round_text));
            }
            for call in calls {
                if self.cancel.is_cancelled() {
                    info!("Turn aborted before dispatching {}", call.function.name);
                    return Err(RunError::Aborted);
                }
                self.handler.on_event(&TurnEvent::ToolCall {
                    call: &call,
                    round: rounds_used,
                });
                let result = self
                    .tools
                    .execute(&call.function.name, &call.function.arguments, &self.cancel)
                    .await;
                tools_dispatched += 1;
                self.handler.on_event(&TurnEvent::ToolResult {
                    call: &call,
                    result: &result,
                });

                // Record the exchange: the raw call on an assistant
                // message, the rendered result on a tool message.
                let rendered = result.render();
                messages.push(Message::assistant_tool_calls(vec![call.clone()]));
                messages.push(Message::tool_result(call.id.clone(), rendered));
            }
        }

        // Round limit reached with the model still asking for tools.
        warn!(
            "Turn hit the round limit ({}) with tool calls still pending",
            self.config.max_rounds
        );
        self.handler.on_event(&TurnEvent::Done {
            tier,
            model: &model,
            usage: &usage,
            rounds_used,
        });
        Ok(TurnOutcome {
            text,
            tier,
            model,
            messages,
            usage,
            rounds_used,
            tools_dispatched,
        })
    }
}

/// Assemble completed calls from the slot map, dropping slots that never
/// received an id or name (a truncated stream can leave those behind).
fn assemble_calls(pending: BTreeMap<usize, PendingCall>) -> Vec<ToolCall> {
    pending
        .into_values()
        .filter_map(|slot| {
            let id = slot.id?;
            let name = slot.name?;
            Some(ToolCall {
                id,
                call_type: crate::CallType::Function,
                function: FunctionCallData {
                    name,
                    arguments: slot.arguments,
                },
            })
        })
        .collect()
}

fn accumulate_usage(total: &mut UsageInfo, round: &UsageInfo) {
    let add = |acc: &mut Option<u32>, v: Option<u32>| {
        if let Some(v) = v {
            *acc = Some(acc.unwrap_or(0) + v);
        }
    };
    add(&mut total.prompt_tokens, round.prompt_tokens);
    add(&mut total.completion_tokens, round.completion_tokens);
    add(&mut total.total_tokens, round.total_tokens);
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::EventStream;
    use crate::tools::registry::{Tool, ToolFuture};
    use crate::{MessageRole, ToolDef};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A transport that replays scripted event sequences, one per round,
    /// and records every request it sees.
    struct ScriptedTransport {
        rounds: Mutex<VecDeque<Vec<Result<StreamEvent, String>>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn new(rounds: Vec<Vec<Result<StreamEvent, String>>>) -> Arc<Self> {
            Arc::new(Self {
                rounds: Mutex::new(rounds.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_models(&self) -> Vec<Option<String>> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.model.clone())
                .collect()
        }
    }

    impl ChatTransport for ScriptedTransport {
        fn chat_stream(&self, request: ChatRequest) -> EventStream {
            self.requests.lock().unwrap().push(request);
            let script = self
                .rounds
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| vec![Ok(StreamEvent::Done)]);
            Box::pin(tokio_stream::iter(script))
        }
    }

    /// Records a compact trace of events; optionally cancels a token when
    /// the first tool result arrives.
    struct Recorder {
        trace: Mutex<Vec<String>>,
        cancel_on_tool_result: Option<CancellationToken>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                trace: Mutex::new(Vec::new()),
                cancel_on_tool_result: None,
            }
        }

        fn trace(&self) -> Vec<String> {
            self.trace.lock().unwrap().clone()
        }
    }

    impl TurnHandler for Arc<Recorder> {
        fn on_event(&self, event: &TurnEvent<'_>) {
            let entry = match event {
                TurnEvent::Text { delta } => format!("text({delta})"),
                TurnEvent::ToolCall { call, .. } => {
                    format!("tool_call({})", call.function.name)
                }
                TurnEvent::ToolResult { call, result } => {
                    if let Some(cancel) = &self.cancel_on_tool_result {
                        cancel.cancel();
                    }
                    format!("tool_result({}: {})", call.function.name, result.success)
                }
                TurnEvent::Done { rounds_used, .. } => format!("done({rounds_used})"),
            };
            self.trace.lock().unwrap().push(entry);
        }
    }

    struct EchoTool;

    impl Tool for EchoTool {
        fn definition(&self) -> ToolDef {
            ToolDef::new(
                "echo",
                "Echo the input",
                serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } }
                }),
            )
        }

        fn execute(&self, arguments: &str, _cancel: CancellationToken) -> ToolFuture<'_> {
            let arguments = arguments.to_string();
            Box::pin(async move {
                let args: serde_json::Value =
                    serde_json::from_str(&arguments).unwrap_or_default();
                ToolResult::ok(
                    args.get("text")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                )
            })
        }
    }

    fn tool_delta(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        args: &str,
    ) -> Result<StreamEvent, String> {
        Ok(StreamEvent::ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments_delta: args.to_string(),
        })
    }

    #[tokio::test]
    async fn text_only_turn_completes() {
        let transport = ScriptedTransport::new(vec![vec![
            Ok(StreamEvent::TextDelta("Hello".into())),
            Ok(StreamEvent::Finish("stop".into())),
            Ok(StreamEvent::Done),
        ]]);
        let router = StreamingRouter::new(transport.clone(), RouterConfig::default());

        let outcome = router.run(vec![Message::user("hi there")]).await.unwrap();
        assert_eq!(outcome.text, "Hello");
        assert_eq!(outcome.rounds_used, 1);
        assert_eq!(outcome.tools_dispatched, 0);
        // The assistant reply is appended to the working list.
        let last = outcome.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(last.text(), "Hello");
    }

    #[tokio::test]
    async fn tool_round_trip_event_order_and_messages() {
        let transport = ScriptedTransport::new(vec![
            vec![
                Ok(StreamEvent::TextDelta("Hello".into())),
                // Arguments split across deltas; id arrives late.
                tool_delta(0, None, Some("echo"), r#"{"te"#),
                tool_delta(0, Some("call-1"), None, r#"xt": "hi"}"#),
                Ok(StreamEvent::Finish("tool_calls".into())),
                Ok(StreamEvent::Done),
            ],
            vec![
                Ok(StreamEvent::TextDelta("All done".into())),
                Ok(StreamEvent::Finish("stop".into())),
                Ok(StreamEvent::Done),
            ],
        ]);
        let recorder = Arc::new(Recorder::new());
        let router = StreamingRouter::new(transport.clone(), RouterConfig::default())
            .with_tools(ToolRegistry::new().with(EchoTool))
            .with_handler(recorder.clone());

        let outcome = router.run(vec![Message::user("say hi")]).await.unwrap();

        assert_eq!(
            recorder.trace(),
            vec![
                "text(Hello)",
                "tool_call(echo)",
                "tool_result(echo: true)",
                "text(All done)",
                "done(2)",
            ]
        );
        assert_eq!(outcome.text, "HelloAll done");
        assert_eq!(outcome.tools_dispatched, 1);

        // Message order: user, assistant text, assistant call, tool
        // result, final assistant text.
        let roles: Vec<MessageRole> = outcome.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant,
            ]
        );
        let call_msg = &outcome.messages[2];
        let calls = call_msg.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call-1");
        // Fragments concatenated in arrival order.
        assert_eq!(calls[0].function.arguments, r#"{"text": "hi"}"#);
        let tool_msg = &outcome.messages[3];
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(tool_msg.text(), "hi");
    }

    #[tokio::test]
    async fn interleaved_fragments_dispatch_in_index_order() {
        let transport = ScriptedTransport::new(vec![
            vec![
                tool_delta(1, Some("call-b"), Some("echo"), r#"{"text": "#),
                tool_delta(0, Some("call-a"), Some("echo"), r#"{"text": "first"}"#),
                tool_delta(1, None, None, r#""second"}"#),
                Ok(StreamEvent::Finish("tool_calls".into())),
                Ok(StreamEvent::Done),
            ],
            vec![Ok(StreamEvent::Done)],
        ]);
        let router = StreamingRouter::new(transport.clone(), RouterConfig::default())
            .with_tools(ToolRegistry::new().with(EchoTool));

        let outcome = router.run(vec![Message::user("run both")]).await.unwrap();
        let tool_msgs: Vec<&Message> = outcome
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .collect();
        assert_eq!(tool_msgs.len(), 2);
        assert_eq!(tool_msgs[0].tool_call_id.as_deref(), Some("call-a"));
        assert_eq!(tool_msgs[0].text(), "first");
        assert_eq!(tool_msgs[1].tool_call_id.as_deref(), Some("call-b"));
        assert_eq!(tool_msgs[1].text(), "second");
    }

    #[tokio::test]
    async fn precancelled_turn_aborts_without_streaming() {
        let transport = ScriptedTransport::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let router = StreamingRouter::new(transport.clone(), RouterConfig::default())
            .with_cancellation(cancel);

        let result = router.run(vec![Message::user("hi")]).await;
        assert!(matches!(result, Err(RunError::Aborted)));
        assert!(transport.request_models().is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_batch_stops_before_next_dispatch() {
        let transport = ScriptedTransport::new(vec![vec![
            tool_delta(0, Some("call-a"), Some("echo"), r#"{"text": "one"}"#),
            tool_delta(1, Some("call-b"), Some("echo"), r#"{"text": "two"}"#),
            Ok(StreamEvent::Finish("tool_calls".into())),
            Ok(StreamEvent::Done),
        ]]);
        let cancel = CancellationToken::new();
        let recorder = Arc::new(Recorder {
            trace: Mutex::new(Vec::new()),
            cancel_on_tool_result: Some(cancel.clone()),
        });
        let router = StreamingRouter::new(transport.clone(), RouterConfig::default())
            .with_tools(ToolRegistry::new().with(EchoTool))
            .with_handler(recorder.clone())
            .with_cancellation(cancel);

        let result = router.run(vec![Message::user("run both")]).await;
        assert!(matches!(result, Err(RunError::Aborted)));
        // The first call completed; the second was never dispatched.
        assert_eq!(
            recorder.trace(),
            vec!["tool_call(echo)", "tool_result(echo: true)"]
        );
    }

    #[tokio::test]
    async fn transport_failure_is_distinct_from_abort() {
        let transport = ScriptedTransport::new(vec![vec![
            Ok(StreamEvent::TextDelta("par".into())),
            Err("connection reset".to_string()),
        ]]);
        let router = StreamingRouter::new(transport.clone(), RouterConfig::default());

        let result = router.run(vec![Message::user("hi")]).await;
        match result {
            Err(RunError::Transport(e)) => assert!(e.contains("connection reset")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn images_route_to_vision_model_without_provider_hint() {
        let transport = ScriptedTransport::new(vec![vec![Ok(StreamEvent::Done)]]);
        let mut config = RouterConfig::default();
        config
            .providers
            .insert(Tier::Smart, vec!["Anthropic".to_string()]);
        config.tier_override = Some(Tier::Smart);
        let vision = config.vision_model.clone();
        let router = StreamingRouter::new(transport.clone(), config);

        router
            .run(vec![Message::user_with_images(
                "what is in this picture?",
                vec!["data:image/png;base64,AAAA".to_string()],
            )])
            .await
            .unwrap();

        assert_eq!(transport.request_models(), vec![Some(vision)]);
        let requests = transport.requests.lock().unwrap();
        assert!(requests[0].provider.is_none());
    }

    #[tokio::test]
    async fn complex_request_routes_to_smart_model() {
        let transport = ScriptedTransport::new(vec![vec![Ok(StreamEvent::Done)]]);
        let config = RouterConfig::default();
        let smart = config.models.smart.clone();
        let router = StreamingRouter::new(transport.clone(), config);

        router
            .run(vec![Message::user("Refactor the parser module")])
            .await
            .unwrap();
        assert_eq!(transport.request_models(), vec![Some(smart)]);
    }

    #[tokio::test]
    async fn usage_accumulates_across_rounds() {
        let usage_chunk = |p: u32, c: u32| {
            Ok(StreamEvent::Usage(UsageInfo {
                prompt_tokens: Some(p),
                completion_tokens: Some(c),
                total_tokens: Some(p + c),
            }))
        };
        let transport = ScriptedTransport::new(vec![
            vec![
                tool_delta(0, Some("call-1"), Some("echo"), r#"{"text": "x"}"#),
                Ok(StreamEvent::Finish("tool_calls".into())),
                usage_chunk(100, 20),
                Ok(StreamEvent::Done),
            ],
            vec![usage_chunk(150, 10), Ok(StreamEvent::Done)],
        ]);
        let router = StreamingRouter::new(transport.clone(), RouterConfig::default())
            .with_tools(ToolRegistry::new().with(EchoTool));

        let outcome = router.run(vec![Message::user("go")]).await.unwrap();
        assert_eq!(outcome.usage.prompt_tokens, Some(250));
        assert_eq!(outcome.usage.completion_tokens, Some(30));
        assert_eq!(outcome.usage.total_tokens, Some(280));
    }

    #[tokio::test]
    async fn round_limit_terminates_tool_loops() {
        // Every round asks for another tool call; the loop must stop at
        // max_rounds instead of spinning forever.
        let round: Vec<Result<StreamEvent, String>> = vec![
            tool_delta(0, Some("call-x"), Some("echo"), r#"{"text": "again"}"#),
            Ok(StreamEvent::Finish("tool_calls".into())),
            Ok(StreamEvent::Done),
        ];
        let transport = ScriptedTransport::new(vec![round.clone(), round.clone(), round]);
        let mut config = RouterConfig::default();
        config.max_rounds = 3;
        let router = StreamingRouter::new(transport.clone(), config)
            .with_tools(ToolRegistry::new().with(EchoTool));

        let outcome = router.run(vec![Message::user("loop")]).await.unwrap();
        assert_eq!(outcome.rounds_used, 3);
        assert_eq!(outcome.tools_dispatched, 3);
    }
}
