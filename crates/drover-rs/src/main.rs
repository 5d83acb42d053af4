//! Run an agent turn against OpenRouter with tool execution and session
//! recording.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # One-shot turn in a throwaway session
//! drover run "What does the retry module do?"
//!
//! # Named session, resumed across invocations
//! drover run --session refactor "Refactor the parser module"
//!
//! # Resume the most recent session
//! drover run --resume "Continue where we left off"
//!
//! # Force a tier, skip classification
//! drover run --tier smart "Quick question about lifetimes"
//!
//! # Session management
//! drover sessions list
//! drover sessions fork <id> --name experiment
//! drover sessions delete <id>
//! ```

use clap::{Parser, Subcommand};
use drover_rs::api::router::{RunError, StreamingRouter, TurnEvent, TurnHandler};
use drover_rs::api::transport::OpenRouterClient;
use drover_rs::config::Config;
use drover_rs::session::manager::SessionManager;
use drover_rs::session::store::FileSessionStore;
use drover_rs::tools::permission::PermissionManager;
use drover_rs::tools::prompt::{Answer, Prompter, PromptFuture, Question};
use drover_rs::tools::registry::ToolRegistry;
use drover_rs::{Message, Tier};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drover", version, about = "A tiered, tool-using coding agent")]
struct Cli {
    /// Config file path (JSON). Defaults to ~/.drover/config.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one agent turn.
    Run {
        /// The user prompt.
        prompt: String,

        /// Record the turn into the named session (created on first use).
        #[arg(long)]
        session: Option<String>,

        /// Resume the most recently updated session.
        #[arg(long)]
        resume: bool,

        /// Force a tier (superfast, fast, smart), skipping classification.
        #[arg(long)]
        tier: Option<Tier>,

        /// Working directory for the built-in tools. Defaults to the
        /// session's recorded directory, or the current directory.
        #[arg(long)]
        workdir: Option<String>,

        /// Approve permission prompts automatically.
        #[arg(long)]
        yes: bool,

        /// Attach an image URL (or data: URI); routes to the vision model.
        #[arg(long = "image")]
        images: Vec<String>,
    },
    /// Inspect and manage saved sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// List sessions, most recent first.
    List,
    /// Rename a session.
    Rename { id: String, name: String },
    /// Delete a session.
    Delete { id: String },
    /// Fork a session into a new one sharing its history.
    Fork {
        id: String,
        #[arg(long)]
        name: Option<String>,
    },
}

// ── Prompter ───────────────────────────────────────────────────────

/// Asks for approval on stderr and reads a line from stdin.
struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn confirm(&self, tool_name: &str, input: &str) -> PromptFuture<'_, bool> {
        let tool_name = tool_name.to_string();
        let input = input.to_string();
        Box::pin(async move {
            let answer = tokio::task::spawn_blocking(move || {
                eprint!("\n  Allow {tool_name} to run `{input}`? [y/N] ");
                let _ = std::io::stderr().flush();
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
                matches!(line.trim(), "y" | "Y" | "yes")
            })
            .await;
            answer.unwrap_or(false)
        })
    }

    fn choose(&self, question: &Question) -> PromptFuture<'_, Answer> {
        let prompt = question.prompt.clone();
        let labels: Vec<String> = question.choices.iter().map(|c| c.label.clone()).collect();
        Box::pin(async move {
            let answer = tokio::task::spawn_blocking(move || {
                eprintln!("\n  {prompt}");
                for (i, label) in labels.iter().enumerate() {
                    eprintln!("    {}. {label}", i + 1);
                }
                eprint!("  Choice (empty to skip): ");
                let _ = std::io::stderr().flush();
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
                match line.trim().parse::<usize>() {
                    Ok(n) if n >= 1 && n <= labels.len() => Answer::Selected(n - 1),
                    _ => Answer::Skipped,
                }
            })
            .await;
            answer.unwrap_or(Answer::Skipped)
        })
    }
}

// ── Event rendering ────────────────────────────────────────────────

/// Streams text to stdout as it arrives; tool activity goes to stderr.
struct CliHandler;

impl TurnHandler for CliHandler {
    fn on_event(&self, event: &TurnEvent<'_>) {
        match event {
            TurnEvent::Text { delta } => {
                print!("{delta}");
                let _ = std::io::stdout().flush();
            }
            TurnEvent::ToolCall { call, .. } => {
                eprintln!("\n  [tool] {}({})", call.function.name, call.function.arguments);
            }
            TurnEvent::ToolResult { call, result } => {
                if !result.success {
                    eprintln!("  [tool] {} failed: {}", call.function.name, result.render());
                }
            }
            TurnEvent::Done {
                tier,
                model,
                usage,
                rounds_used,
            } => {
                eprintln!(
                    "\n  [{tier} via {model}, {rounds_used} round(s), {} tokens]",
                    usage.total_tokens.unwrap_or(0)
                );
            }
        }
    }
}

// ── Entry points ───────────────────────────────────────────────────

fn data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".drover")
}

fn session_manager() -> Result<SessionManager, String> {
    Ok(SessionManager::new(FileSessionStore::new(
        data_dir().join("sessions"),
    )?))
}

#[allow(clippy::too_many_arguments)]
async fn run_turn(
    config: Config,
    prompt: String,
    session_name: Option<String>,
    resume: bool,
    tier: Option<Tier>,
    workdir: Option<String>,
    yes: bool,
    images: Vec<String>,
) -> Result<(), String> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;
    let client = OpenRouterClient::new(api_key)?;

    let mut router_config = config.router;
    if let Some(tier) = tier {
        router_config = router_config.with_tier_override(tier);
    }

    let mut permissions = PermissionManager::new();
    for (tool, perms) in config.permissions {
        permissions = permissions.with_user_permissions(&tool, perms);
    }
    permissions = if yes {
        permissions.allow_unattended()
    } else {
        permissions.with_prompter(Arc::new(StdinPrompter))
    };

    let manager = session_manager()?;
    let mut session = if resume {
        match manager.resume_last()? {
            Some(s) => s,
            None => manager.create(None, Tier::Fast)?,
        }
    } else if let Some(name) = session_name {
        manager.get_or_create(&name, Tier::Fast)?
    } else {
        manager.create(None, Tier::Fast)?
    };

    // An explicit --workdir wins and is recorded; otherwise the session's
    // remembered directory applies.
    let workdir = match workdir {
        Some(dir) => {
            manager.set_workdir(&mut session, dir.clone())?;
            dir
        }
        None => session.workdir.clone().unwrap_or_else(|| ".".to_string()),
    };

    let tools = ToolRegistry::new()
        .with_common_tools(workdir)
        .with_permissions(permissions)
        .with_arg_validation(true)
        .with_default_timeout(Some(std::time::Duration::from_secs(120)));

    let router = StreamingRouter::new(Arc::new(client), router_config)
        .with_tools(tools)
        .with_handler(CliHandler);

    // Ctrl-C sets the turn's cancellation token; the loop and any running
    // subprocess observe it.
    let cancel = router.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Interrupting...");
            cancel.cancel();
        }
    });

    let user_message = if images.is_empty() {
        Message::user(&prompt)
    } else {
        Message::user_with_images(&prompt, images)
    };
    manager.add_message(&mut session, user_message)?;

    let outcome = match router.run(session.messages.clone()).await {
        Ok(outcome) => outcome,
        Err(RunError::Aborted) => {
            eprintln!("  Turn aborted.");
            return Ok(());
        }
        Err(RunError::Transport(e)) => return Err(e),
    };

    // Record everything the turn appended past the input we sent.
    let new_messages = outcome.messages.into_iter().skip(session.messages.len());
    for message in new_messages {
        manager.add_message(&mut session, message)?;
    }

    if manager.needs_compaction(&session) {
        eprintln!(
            "  Note: session {} is near its context limit; consider compacting.",
            session.id
        );
    }
    println!();
    Ok(())
}

fn run_sessions(command: SessionCommand) -> Result<(), String> {
    let manager = session_manager()?;
    match command {
        SessionCommand::List => {
            let sessions = manager.list()?;
            if sessions.is_empty() {
                println!("No sessions.");
                return Ok(());
            }
            for s in sessions {
                println!(
                    "{}  {:>9}  {:>6} msgs  {:>8} tok  {}",
                    s.id,
                    format!("{:?}", s.state).to_lowercase(),
                    s.messages.len(),
                    s.total_tokens(),
                    s.name.as_deref().unwrap_or("-"),
                );
            }
        }
        SessionCommand::Rename { id, name } => {
            let mut session = manager
                .load(&id)?
                .ok_or_else(|| format!("no session '{id}'"))?;
            manager.rename(&mut session, name)?;
            println!("Renamed {id}.");
        }
        SessionCommand::Delete { id } => {
            manager.delete(&id)?;
            println!("Deleted {id}.");
        }
        SessionCommand::Fork { id, name } => {
            let parent = manager
                .load(&id)?
                .ok_or_else(|| format!("no session '{id}'"))?;
            let child = manager.fork(&parent, name)?;
            println!("Forked {id} into {}.", child.id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir().join("config.json"));
    let config = Config::load(&config_path);

    let result = match cli.command {
        Command::Run {
            prompt,
            session,
            resume,
            tier,
            workdir,
            yes,
            images,
        } => run_turn(config, prompt, session, resume, tier, workdir, yes, images).await,
        Command::Sessions { command } => run_sessions(command),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
