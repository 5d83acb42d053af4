//! Tool abstraction and the dispatch gate.
//!
//! The [`Tool`] trait defines the interface every tool implements: a static
//! API definition (name, description, JSON Schema) and an async `execute`
//! method receiving the raw arguments and the turn's cancellation token.
//! Tools are collected into a [`ToolRegistry`] which handles permission
//! gating, argument validation, dispatch, timeouts, and result truncation.
//! Failures are values ([`ToolResult`]), never panics: every outcome is
//! rendered into a tool-result message the model can read and self-correct
//! from.

use crate::ToolDef;
use crate::tools::permission::PermissionManager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Default timeout for tool execution (60 seconds).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// The failure text reserved for cancellation, distinguished from generic
/// faults by [`ToolResult::is_aborted`].
pub const ABORTED_MESSAGE: &str = "execution aborted";

/// Boxed future returned by [`Tool::execute`].
///
/// Type alias to keep trait signatures and implementations readable.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolResult> + Send + 'a>>;

// ── ToolResult ─────────────────────────────────────────────────────

/// The outcome of one tool invocation.
///
/// Failures carry a human-readable reason usable directly as the next
/// tool-result message back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// A successful result with output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    /// A failed result with a reason.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// The distinguished cancellation failure.
    pub fn aborted() -> Self {
        Self::fail(ABORTED_MESSAGE)
    }

    /// Whether this failure is a cancellation.
    pub fn is_aborted(&self) -> bool {
        !self.success && self.error.as_deref() == Some(ABORTED_MESSAGE)
    }

    /// Render into the text content of a tool-role message.
    pub fn render(&self) -> String {
        if self.success {
            self.output.clone().unwrap_or_default()
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("tool execution failed")
            )
        }
    }
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool the model can invoke via function-calling.
///
/// Implementors provide a static definition ([`Tool::definition`]) and an
/// async [`Tool::execute`] receiving the raw JSON arguments string and the
/// turn's cancellation token. Long-running tools (subprocesses in
/// particular) should observe the token and terminate on cancellation; the
/// registry also races the future against it, but a killed subprocess
/// beats an orphaned one.
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model API.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    ///
    /// Errors are returned as failed [`ToolResult`]s rather than panics.
    /// Uses a boxed future so the trait stays dyn-compatible (object-safe).
    fn execute(&self, arguments: &str, cancel: CancellationToken) -> ToolFuture<'_>;

    /// The tool's name (convenience — delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name.clone()
    }

    /// Project the raw arguments into the string the permission rules
    /// match against: a shell tool projects its command line, file tools
    /// their path, a search tool its pattern. Defaults to the raw
    /// arguments.
    fn permission_scope(&self, arguments: &str) -> String {
        arguments.to_string()
    }
}

// ── ToolRegistry ───────────────────────────────────────────────────

/// A collection of tools dispatched by name.
///
/// Registration order is preserved: [`definitions`](Self::definitions)
/// projects tools into the wire schema in the order they were registered,
/// so the model-facing advertisement is stable across runs.
pub struct ToolRegistry {
    /// Registration order.
    order: Vec<String>,
    tools: HashMap<String, Box<dyn Tool>>,
    permissions: Option<PermissionManager>,
    max_result_bytes: usize,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
    /// Default timeout for tool execution. `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .field("max_result_bytes", &self.max_result_bytes)
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            tools: HashMap::new(),
            permissions: None,
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: false,
            default_timeout: None,
        }
    }

    /// Attach a permission manager. Without one, every tool runs.
    pub fn with_permissions(mut self, permissions: PermissionManager) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Set the maximum result size in bytes before truncation.
    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    /// Enable JSON Schema argument validation before tool execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Set a default timeout for tool execution. Applies to all tools.
    /// Pass `None` to disable timeouts.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name
    /// (keeping its original position in the advertisement order).
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name();
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, Box::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Conditionally register a tool (builder pattern).
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// Register the built-in file, shell, and search tools rooted at
    /// `workdir`. Common tools inherit the registry's `max_result_bytes`.
    pub fn with_common_tools(self, workdir: impl Into<String>) -> Self {
        use crate::tools::common::{Grep, ReadFile, Shell, WriteFile};
        let workdir = workdir.into();
        let max = self.max_result_bytes;
        self.with(ReadFile::new(workdir.clone()).max_result_bytes(max))
            .with(WriteFile::new(workdir.clone()))
            .with(Shell::new(workdir.clone()).max_result_bytes(max))
            .with(Grep::new(workdir).max_result_bytes(max))
    }

    /// All tool definitions for the model API, in registration order.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition())
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call by name.
    ///
    /// Every fault is normalized into a failed [`ToolResult`]: unknown
    /// tool, permission denial, invalid arguments, timeout, and
    /// cancellation (reported distinctly, never as a generic failure).
    /// A token that is already cancelled short-circuits before the tool
    /// is touched.
    pub async fn execute(
        &self,
        name: &str,
        arguments: &str,
        cancel: &CancellationToken,
    ) -> ToolResult {
        if cancel.is_cancelled() {
            debug!("Tool {name} skipped: cancellation already requested");
            return ToolResult::aborted();
        }

        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => return ToolResult::fail(format!("unknown tool '{name}'")),
        };

        if let Some(permissions) = &self.permissions {
            let scope = tool.permission_scope(arguments);
            if let Err(reason) = permissions.authorize(name, &scope).await {
                return ToolResult::fail(reason);
            }
        }

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), arguments)
        {
            return ToolResult::fail(error);
        }

        log_tool_call(name, arguments);
        let start = std::time::Instant::now();

        let execution = tool.execute(arguments, cancel.clone());
        let mut result = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Tool {name} aborted by cancellation");
                ToolResult::aborted()
            }
            outcome = run_with_timeout(execution, self.default_timeout) => match outcome {
                Some(r) => r,
                None => {
                    let limit = self.default_timeout.unwrap_or_default();
                    info!(
                        "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                        start.elapsed().as_secs_f64(),
                        limit.as_secs_f64(),
                    );
                    ToolResult::fail(format!(
                        "tool '{name}' timed out after {:.0} seconds. Consider \
                         breaking the task into smaller steps or using different \
                         arguments.",
                        limit.as_secs_f64(),
                    ))
                }
            },
        };

        let elapsed = start.elapsed();
        debug!(
            "Tool {name} completed in {:.0}ms (success: {})",
            elapsed.as_secs_f64() * 1000.0,
            result.success,
        );
        if let Some(output) = &result.output {
            trace!(
                "Tool {name} result preview: {}",
                output.chars().take(300).collect::<String>()
            );
        }

        if let Some(output) = result.output.take() {
            result.output = Some(truncate_result(output, self.max_result_bytes));
        }
        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a future under an optional timeout. `None` on timeout.
async fn run_with_timeout<F: Future<Output = ToolResult>>(
    fut: F,
    timeout: Option<Duration>,
) -> Option<ToolResult> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate tool arguments against the tool's declared JSON Schema.
///
/// Returns `None` if valid, or `Some(error_string)` if validation fails.
/// The error string is formatted for the model to understand and
/// self-correct.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Option<String> {
    let args_value: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "invalid JSON arguments for tool '{}': {e}. \
                 Please provide valid JSON matching the tool's parameter schema.",
                tool.name()
            ));
        }
    };

    let schema = tool.definition().function.parameters;

    let validator = match jsonschema::validator_for(&schema) {
        Ok(v) => v,
        Err(e) => {
            // An invalid schema is the tool author's bug, not the model's.
            warn!("Skipping argument validation for '{}': {e}", tool.name());
            return None;
        }
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "argument validation failed for tool '{}':\n{}\n\
             Please fix the arguments and try again.",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.len() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate a string to at most `max` bytes on a char boundary, appending
/// a notice if trimmed.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = s.get(..cut).unwrap_or_default();
    format!("{head}...\n[truncated: {} bytes total]", s.len())
}

/// Parse raw JSON arguments into a typed struct.
///
/// The error is a failed [`ToolResult`] suitable for returning directly
/// from [`Tool::execute`] — the model will see it and self-correct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, ToolResult> {
    serde_json::from_str(arguments).map_err(|e| {
        ToolResult::fail(format!(
            "invalid tool arguments: {e}. \
             Please provide valid JSON matching the tool's parameter schema."
        ))
    })
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::permission::{PermissionAction, ToolPermissions};

    struct EchoTool;

    impl Tool for EchoTool {
        fn definition(&self) -> ToolDef {
            ToolDef::new(
                "echo",
                "Echo the input",
                serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            )
        }

        fn execute(&self, arguments: &str, _cancel: CancellationToken) -> ToolFuture<'_> {
            let arguments = arguments.to_string();
            Box::pin(async move {
                let args: serde_json::Value =
                    serde_json::from_str(&arguments).unwrap_or_default();
                match args.get("text").and_then(|v| v.as_str()) {
                    Some(text) => ToolResult::ok(text),
                    None => ToolResult::fail("no text"),
                }
            })
        }
    }

    struct SlowTool;

    impl Tool for SlowTool {
        fn definition(&self) -> ToolDef {
            ToolDef::new(
                "slow",
                "Sleeps forever",
                serde_json::json!({"type": "object", "properties": {}}),
            )
        }

        fn execute(&self, _arguments: &str, _cancel: CancellationToken) -> ToolFuture<'_> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(600)).await;
                ToolResult::ok("done")
            })
        }
    }

    #[test]
    fn tool_name_from_definition() {
        assert_eq!(EchoTool.name(), "echo");
    }

    #[test]
    fn definitions_preserve_registration_order() {
        let registry = ToolRegistry::new().with(SlowTool).with(EchoTool);
        let names: Vec<String> = registry
            .definitions()
            .iter()
            .map(|d| d.function.name.clone())
            .collect();
        assert_eq!(names, vec!["slow".to_string(), "echo".to_string()]);
    }

    #[tokio::test]
    async fn execute_known_tool() {
        let registry = ToolRegistry::new().with(EchoTool);
        let result = registry
            .execute("echo", r#"{"text": "hello"}"#, &CancellationToken::new())
            .await;
        assert!(result.success);
        assert_eq!(result.render(), "hello");
    }

    #[tokio::test]
    async fn execute_unknown_tool() {
        let registry = ToolRegistry::new().with(EchoTool);
        let result = registry
            .execute("nonexistent", "{}", &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(result.render().contains("unknown tool"));
    }

    #[tokio::test]
    async fn precancelled_token_never_touches_tool() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let registry = ToolRegistry::new().with(EchoTool);
        let result = registry
            .execute("echo", r#"{"text": "hello"}"#, &cancel)
            .await;
        assert!(result.is_aborted());
    }

    #[tokio::test]
    async fn cancellation_mid_execution_is_distinguished() {
        let cancel = CancellationToken::new();
        let registry = ToolRegistry::new().with(SlowTool);
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let result = registry.execute("slow", "{}", &cancel).await;
        assert!(result.is_aborted());
        assert_eq!(result.render(), format!("Error: {ABORTED_MESSAGE}"));
    }

    #[tokio::test]
    async fn timeout_is_reported_distinctly() {
        let registry = ToolRegistry::new()
            .with(SlowTool)
            .with_default_timeout(Some(Duration::from_millis(20)));
        let result = registry
            .execute("slow", "{}", &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(!result.is_aborted());
        assert!(result.render().contains("timed out"));
    }

    #[tokio::test]
    async fn denied_tool_is_never_invoked() {
        let permissions = PermissionManager::new().with_user_permissions(
            "echo",
            ToolPermissions::new(PermissionAction::Deny),
        );
        let registry = ToolRegistry::new()
            .with(EchoTool)
            .with_permissions(permissions);
        let result = registry
            .execute("echo", r#"{"text": "hello"}"#, &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(result.render().contains("Permission denied"));
    }

    #[tokio::test]
    async fn invalid_arguments_fail_validation() {
        let registry = ToolRegistry::new().with(EchoTool).with_arg_validation(true);
        let result = registry
            .execute("echo", r#"{"wrong": 1}"#, &CancellationToken::new())
            .await;
        assert!(!result.success);
        assert!(result.render().contains("validation failed"));
    }

    #[tokio::test]
    async fn long_results_are_truncated() {
        struct BigTool;
        impl Tool for BigTool {
            fn definition(&self) -> ToolDef {
                ToolDef::new(
                    "big",
                    "Returns a big result",
                    serde_json::json!({"type": "object", "properties": {}}),
                )
            }
            fn execute(&self, _arguments: &str, _cancel: CancellationToken) -> ToolFuture<'_> {
                Box::pin(async { ToolResult::ok("a".repeat(200)) })
            }
        }

        let registry = ToolRegistry::new().with_max_result_bytes(50).with(BigTool);
        let result = registry
            .execute("big", "{}", &CancellationToken::new())
            .await;
        assert!(result.render().contains("[truncated: 200 bytes total]"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "é".repeat(40); // 2 bytes per char
        let result = truncate_result(s, 51);
        assert!(result.contains("[truncated: 80 bytes total]"));
    }

    #[test]
    fn render_failure_carries_reason() {
        assert_eq!(ToolResult::fail("boom").render(), "Error: boom");
        assert!(ToolResult::aborted().is_aborted());
        assert!(!ToolResult::fail("boom").is_aborted());
    }
}
