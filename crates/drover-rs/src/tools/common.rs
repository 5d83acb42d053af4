//! Built-in file, shell, and search tools.
//!
//! Each tool guards against path traversal (`..`), inherits result
//! truncation from the registry, and projects the permission-relevant part
//! of its arguments via [`Tool::permission_scope`]: the shell tool its
//! command line, the file tools their path, grep its pattern. The shell
//! tool races its subprocess against the turn's cancellation token and
//! kills the child on cancel.

use crate::ToolDef;
use crate::json_schema_for;
use crate::tools::registry::{DEFAULT_MAX_RESULT_BYTES, Tool, ToolFuture, ToolResult, parse_tool_args, truncate_result};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ── Argument structs ───────────────────────────────────────────────

/// Typed arguments for the `read_file` tool.
#[derive(Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// File path relative to the working directory (e.g. 'src/main.rs').
    pub path: String,
}

/// Typed arguments for the `write_file` tool.
#[derive(Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// File path relative to the working directory.
    pub path: String,
    /// Full file content to write. Replaces any existing content.
    pub content: String,
}

/// Typed arguments for the `shell` tool.
#[derive(Deserialize, JsonSchema)]
pub struct ShellArgs {
    /// The shell command to run (executed via `sh -c`).
    pub command: String,
}

/// Typed arguments for the `grep` tool.
#[derive(Deserialize, JsonSchema)]
pub struct GrepArgs {
    /// Regex pattern to search for.
    pub pattern: String,
    /// Directory or file to search, relative to the working directory.
    /// Defaults to the whole working directory.
    #[serde(default)]
    pub path: Option<String>,
    /// Case-insensitive matching. Defaults to false.
    #[serde(default)]
    pub case_insensitive: Option<bool>,
}

/// Extract one string field from raw arguments for permission matching.
/// Falls back to the raw string when the arguments don't parse — a rule
/// then matches against everything it can see.
fn scope_field(arguments: &str, field: &str) -> String {
    serde_json::from_str::<serde_json::Value>(arguments)
        .ok()
        .and_then(|v| v.get(field).and_then(|f| f.as_str()).map(String::from))
        .unwrap_or_else(|| arguments.to_string())
}

// ── ReadFile ───────────────────────────────────────────────────────

/// Read a file's contents relative to the working directory.
///
/// Path traversal (`..`) is blocked. Results longer than the configured
/// limit are truncated with a notice.
pub struct ReadFile {
    workdir: String,
    max_result_bytes: usize,
}

impl ReadFile {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    pub fn max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}

impl Tool for ReadFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "read_file",
            "Read the full content of a file at a path relative to the \
             working directory. Use when you already know the file path; \
             use grep to search across files instead.",
            json_schema_for::<ReadFileArgs>(),
        )
    }

    fn permission_scope(&self, arguments: &str) -> String {
        scope_field(arguments, "path")
    }

    fn execute(&self, arguments: &str, _cancel: CancellationToken) -> ToolFuture<'_> {
        let workdir = self.workdir.clone();
        let max = self.max_result_bytes;
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: ReadFileArgs = match parse_tool_args(&arguments) {
                Ok(a) => a,
                Err(e) => return e,
            };
            if args.path.contains("..") {
                return ToolResult::fail("path traversal not allowed");
            }
            let full_path = Path::new(&workdir).join(&args.path);
            match fs::read_to_string(&full_path).await {
                Ok(content) => ToolResult::ok(truncate_result(content, max)),
                Err(e) => ToolResult::fail(format!(
                    "reading '{}' failed: {e}",
                    full_path.display()
                )),
            }
        })
    }
}

// ── WriteFile ──────────────────────────────────────────────────────

/// Write (replace) a file's contents relative to the working directory.
///
/// Creates parent directories as needed. Writes go through a temp file
/// renamed into place, so a crash mid-write never leaves a half-written
/// file.
pub struct WriteFile {
    workdir: String,
}

impl WriteFile {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for WriteFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "write_file",
            "Write the given content to a file at a path relative to the \
             working directory, replacing any existing content. Parent \
             directories are created as needed.",
            json_schema_for::<WriteFileArgs>(),
        )
    }

    fn permission_scope(&self, arguments: &str) -> String {
        scope_field(arguments, "path")
    }

    fn execute(&self, arguments: &str, _cancel: CancellationToken) -> ToolFuture<'_> {
        let workdir = self.workdir.clone();
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: WriteFileArgs = match parse_tool_args(&arguments) {
                Ok(a) => a,
                Err(e) => return e,
            };
            if args.path.contains("..") {
                return ToolResult::fail("path traversal not allowed");
            }
            let full_path = Path::new(&workdir).join(&args.path);
            if let Some(parent) = full_path.parent()
                && let Err(e) = fs::create_dir_all(parent).await
            {
                return ToolResult::fail(format!(
                    "creating '{}' failed: {e}",
                    parent.display()
                ));
            }

            // Atomic write: temp file in the same directory, then rename.
            let tmp_path = full_path.with_extension("tmp");
            if let Err(e) = fs::write(&tmp_path, &args.content).await {
                return ToolResult::fail(format!(
                    "writing '{}' failed: {e}",
                    full_path.display()
                ));
            }
            if let Err(e) = fs::rename(&tmp_path, &full_path).await {
                return ToolResult::fail(format!(
                    "writing '{}' failed: {e}",
                    full_path.display()
                ));
            }
            ToolResult::ok(format!(
                "Wrote {} bytes to {}",
                args.content.len(),
                args.path
            ))
        })
    }
}

// ── Shell ──────────────────────────────────────────────────────────

/// Execute shell commands in the working directory.
///
/// The subprocess is raced against the turn's cancellation token: on
/// cancel the child is killed and the distinguished aborted result is
/// returned. Permission gating happens in the registry before this tool
/// is ever invoked; the command line is the permission scope.
pub struct Shell {
    workdir: String,
    max_result_bytes: usize,
}

impl Shell {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    pub fn max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}

impl Tool for Shell {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "shell",
            "Run a shell command in the working directory and return its \
             output. Use for operations not covered by other tools: git \
             commands, builds, data processing. Prefer read_file and grep \
             for reading and searching files.",
            json_schema_for::<ShellArgs>(),
        )
    }

    fn permission_scope(&self, arguments: &str) -> String {
        scope_field(arguments, "command")
    }

    fn execute(&self, arguments: &str, cancel: CancellationToken) -> ToolFuture<'_> {
        let workdir = self.workdir.clone();
        let max = self.max_result_bytes;
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: ShellArgs = match parse_tool_args(&arguments) {
                Ok(a) => a,
                Err(e) => return e,
            };

            let mut child = match Command::new("sh")
                .arg("-c")
                .arg(&args.command)
                .current_dir(&workdir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
            {
                Ok(c) => c,
                Err(e) => return ToolResult::fail(format!("spawning command failed: {e}")),
            };

            // Drain the pipes concurrently so a chatty child can't fill
            // them and deadlock against wait().
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            let stdout_task = tokio::spawn(read_pipe(stdout));
            let stderr_task = tokio::spawn(read_pipe(stderr));

            let status = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Killing shell child on cancellation");
                    let _ = child.kill().await;
                    return ToolResult::aborted();
                }
                status = child.wait() => match status {
                    Ok(s) => s,
                    Err(e) => return ToolResult::fail(format!("waiting for command failed: {e}")),
                },
            };

            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();

            if status.success() {
                let out = if stderr.trim().is_empty() {
                    stdout
                } else {
                    format!("{stdout}\n[stderr]\n{stderr}")
                };
                ToolResult::ok(truncate_result(out, max))
            } else {
                ToolResult::fail(truncate_result(
                    format!("command failed ({status}):\n{stdout}\n{stderr}"),
                    max,
                ))
            }
        })
    }
}

async fn read_pipe<R: tokio::io::AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

// ── Grep ───────────────────────────────────────────────────────────

/// Search file contents for a regex pattern under the working directory.
///
/// Shells out to `grep -rn`; exit code 1 ("no matches") is not an error.
pub struct Grep {
    workdir: String,
    max_result_bytes: usize,
}

impl Grep {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    pub fn max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}

impl Tool for Grep {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "grep",
            "Search for a regex pattern in file contents under the working \
             directory. Returns matching lines prefixed with \
             file_path:line_number. Use read_file when you already know the \
             file path.",
            json_schema_for::<GrepArgs>(),
        )
    }

    fn permission_scope(&self, arguments: &str) -> String {
        scope_field(arguments, "pattern")
    }

    fn execute(&self, arguments: &str, _cancel: CancellationToken) -> ToolFuture<'_> {
        let workdir = self.workdir.clone();
        let max = self.max_result_bytes;
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: GrepArgs = match parse_tool_args(&arguments) {
                Ok(a) => a,
                Err(e) => return e,
            };
            let search_path = args.path.as_deref().unwrap_or(".");
            if search_path.contains("..") {
                return ToolResult::fail("path traversal not allowed");
            }
            let full_path = Path::new(&workdir).join(search_path);

            let mut cmd = Command::new("grep");
            cmd.arg("-rn").arg("--color=never");
            if args.case_insensitive.unwrap_or(false) {
                cmd.arg("-i");
            }
            cmd.arg(&args.pattern).arg(full_path.as_os_str());

            let output = match cmd.output().await {
                Ok(o) => o,
                Err(e) => return ToolResult::fail(format!("running grep failed: {e}")),
            };
            // Exit code 1 is "no matches", not a failure.
            let code = output.status.code().unwrap_or(-1);
            if code > 1 {
                return ToolResult::fail(format!(
                    "grep failed ({}): {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ));
            }
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            if stdout.trim().is_empty() {
                ToolResult::ok(format!("No matches for '{}'", args.pattern))
            } else {
                ToolResult::ok(truncate_result(stdout, max))
            }
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn read_file_returns_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();
        let tool = ReadFile::new(dir.path().to_string_lossy());
        let result = tool
            .execute(r#"{"path": "hello.txt"}"#, token())
            .await;
        assert!(result.success);
        assert_eq!(result.render(), "hi there");
    }

    #[tokio::test]
    async fn read_file_blocks_traversal() {
        let tool = ReadFile::new("/tmp");
        let result = tool
            .execute(r#"{"path": "../etc/passwd"}"#, token())
            .await;
        assert!(!result.success);
        assert!(result.render().contains("traversal"));
    }

    #[tokio::test]
    async fn write_file_creates_parents_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFile::new(dir.path().to_string_lossy());
        let result = tool
            .execute(r#"{"path": "a/b/out.txt", "content": "data"}"#, token())
            .await;
        assert!(result.success, "{:?}", result);
        let written = std::fs::read_to_string(dir.path().join("a/b/out.txt")).unwrap();
        assert_eq!(written, "data");
    }

    #[tokio::test]
    async fn shell_runs_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Shell::new(dir.path().to_string_lossy());
        let result = tool
            .execute(r#"{"command": "echo hello"}"#, token())
            .await;
        assert!(result.success);
        assert_eq!(result.render().trim(), "hello");
    }

    #[tokio::test]
    async fn shell_failure_is_a_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Shell::new(dir.path().to_string_lossy());
        let result = tool.execute(r#"{"command": "exit 3"}"#, token()).await;
        assert!(!result.success);
        assert!(result.render().contains("command failed"));
    }

    #[tokio::test]
    async fn shell_child_is_killed_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Shell::new(dir.path().to_string_lossy());
        let cancel = token();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });
        let start = std::time::Instant::now();
        let result = tool
            .execute(r#"{"command": "sleep 30"}"#, cancel)
            .await;
        assert!(result.is_aborted());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn grep_finds_matches_and_reports_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("code.rs"), "fn main() {}\n").unwrap();
        let tool = Grep::new(dir.path().to_string_lossy());

        let hit = tool
            .execute(r#"{"pattern": "fn main"}"#, token())
            .await;
        assert!(hit.success);
        assert!(hit.render().contains("code.rs"));

        let miss = tool
            .execute(r#"{"pattern": "no_such_symbol"}"#, token())
            .await;
        assert!(miss.success);
        assert!(miss.render().contains("No matches"));
    }

    #[test]
    fn permission_scopes_project_the_relevant_field() {
        let shell = Shell::new("/tmp");
        assert_eq!(
            shell.permission_scope(r#"{"command": "git status"}"#),
            "git status"
        );
        let read = ReadFile::new("/tmp");
        assert_eq!(read.permission_scope(r#"{"path": "src/lib.rs"}"#), "src/lib.rs");
        let grep = Grep::new("/tmp");
        assert_eq!(grep.permission_scope(r#"{"pattern": "TODO"}"#), "TODO");
        // Unparseable arguments fall back to the raw string.
        assert_eq!(shell.permission_scope("not json"), "not json");
    }
}
