//! Session lifecycle management: create, resume, fork, and compaction.
//!
//! Every mutation updates `updated_at` and persists the whole record
//! synchronously — the store is last-writer-wins and the design assumes
//! one active writer per session id. Token accounting is approximate: a
//! fixed characters-per-token ratio ([`CHARS_PER_TOKEN`]) added to the
//! input or output counter depending on the message role.

use crate::session::store::{Session, SessionState, SessionStore};
use crate::{CHARS_PER_TOKEN, Message, MessageRole, Tier};
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

/// Fraction of the tier's context window at which compaction is advised.
pub const COMPACTION_THRESHOLD: f64 = 0.8;

/// Number of trailing messages kept verbatim through compaction.
pub const KEEP_RECENT_MESSAGES: usize = 4;

/// Boxed future returned by [`Summarizer::summarize`].
pub type SummarizeFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// External summarization capability consumed by
/// [`compact`](SessionManager::compact). Typically backed by a cheap-tier
/// model call.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, messages: &[Message]) -> SummarizeFuture<'_>;
}

/// Approximate token count for a character count.
pub fn estimate_tokens(chars: usize) -> u64 {
    (chars as f64 / CHARS_PER_TOKEN).ceil() as u64
}

/// Owns session records and their persistence.
pub struct SessionManager {
    store: Box<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: impl SessionStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    // ── Creation and lookup ────────────────────────────────────────

    /// Create and persist a fresh session.
    pub fn create(&self, name: Option<String>, tier: Tier) -> Result<Session, String> {
        let now = Utc::now();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            parent_id: None,
            workdir: None,
            tier,
            state: SessionState::Active,
            messages: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.save(&session)?;
        info!("Created session {}", session.id);
        Ok(session)
    }

    /// Load the session with this name, or create one.
    pub fn get_or_create(&self, name: &str, tier: Tier) -> Result<Session, String> {
        match self.load_by_name(name)? {
            Some(session) => Ok(session),
            None => self.create(Some(name.to_string()), tier),
        }
    }

    /// Load a session by id.
    pub fn load(&self, id: &str) -> Result<Option<Session>, String> {
        self.store.load(id)
    }

    /// Load the most recently updated session with this name.
    pub fn load_by_name(&self, name: &str) -> Result<Option<Session>, String> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|s| s.name.as_deref() == Some(name))
            .max_by_key(|s| s.updated_at))
    }

    /// Resume the most recently updated non-archived session.
    pub fn resume_last(&self) -> Result<Option<Session>, String> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|s| s.state != SessionState::Archived)
            .max_by_key(|s| s.updated_at))
    }

    /// All sessions, most recently updated first.
    pub fn list(&self) -> Result<Vec<Session>, String> {
        let mut sessions = self.store.list()?;
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Append a message, update the token estimate for its role, and
    /// persist.
    pub fn add_message(&self, session: &mut Session, message: Message) -> Result<(), String> {
        let tokens = estimate_tokens(message.char_len());
        match message.role {
            MessageRole::Assistant => session.output_tokens += tokens,
            _ => session.input_tokens += tokens,
        }
        session.messages.push(message);
        self.touch(session)
    }

    /// Rename a session and persist.
    pub fn rename(&self, session: &mut Session, name: impl Into<String>) -> Result<(), String> {
        session.name = Some(name.into());
        self.touch(session)
    }

    /// Record the working directory the session's tools operate in.
    pub fn set_workdir(
        &self,
        session: &mut Session,
        workdir: impl Into<String>,
    ) -> Result<(), String> {
        session.workdir = Some(workdir.into());
        self.touch(session)
    }

    /// Delete a session by id.
    pub fn delete(&self, id: &str) -> Result<(), String> {
        self.store.delete(id)
    }

    /// Mark a session archived and persist. Archived sessions are skipped
    /// by [`resume_last`](Self::resume_last).
    pub fn archive(&self, session: &mut Session) -> Result<(), String> {
        session.state = SessionState::Archived;
        self.touch(session)
    }

    /// Fork a session: a new id sharing the full message history and
    /// counters at fork time, with a back-reference to the parent. The
    /// parent is never mutated.
    pub fn fork(&self, parent: &Session, name: Option<String>) -> Result<Session, String> {
        let now = Utc::now();
        let child = Session {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            parent_id: Some(parent.id.clone()),
            workdir: parent.workdir.clone(),
            tier: parent.tier,
            state: SessionState::Active,
            messages: parent.messages.clone(),
            input_tokens: parent.input_tokens,
            output_tokens: parent.output_tokens,
            created_at: now,
            updated_at: now,
        };
        self.store.save(&child)?;
        info!("Forked session {} from {}", child.id, parent.id);
        Ok(child)
    }

    /// Drop all messages and reset counters. The lifecycle state is left
    /// untouched: it only ever advances, so an archived or compacted
    /// session stays that way.
    pub fn clear(&self, session: &mut Session) -> Result<(), String> {
        session.messages.clear();
        session.input_tokens = 0;
        session.output_tokens = 0;
        self.touch(session)
    }

    // ── Compaction ─────────────────────────────────────────────────

    /// Whether the session's token estimate has crossed the compaction
    /// threshold for its tier. Advisory only — nothing is enforced here.
    pub fn needs_compaction(&self, session: &Session) -> bool {
        let window = session.tier.context_window_tokens() as f64;
        session.total_tokens() as f64 >= window * COMPACTION_THRESHOLD
    }

    /// Compact the session: summarize the older prefix of the log and
    /// replace it with a single system summary message, keeping the last
    /// [`KEEP_RECENT_MESSAGES`] verbatim.
    ///
    /// Token counters are re-estimated from the new, much shorter content;
    /// historical counts are not retroactively corrected. Returns `false`
    /// without touching anything when there is no prefix to summarize.
    pub async fn compact(
        &self,
        session: &mut Session,
        summarizer: &dyn Summarizer,
    ) -> Result<bool, String> {
        if session.messages.len() <= KEEP_RECENT_MESSAGES {
            debug!("Session {} too short to compact", session.id);
            return Ok(false);
        }
        let split = session.messages.len() - KEEP_RECENT_MESSAGES;
        let prefix = &session.messages[..split];

        let summary = summarizer.summarize(prefix).await?;
        let suffix = session.messages.split_off(split);

        let mut compacted = Vec::with_capacity(1 + suffix.len());
        compacted.push(Message::system(format!(
            "[Conversation summary]\n{summary}"
        )));
        compacted.extend(suffix);
        session.messages = compacted;

        // Reset the estimate from the surviving content.
        session.input_tokens = session
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::Assistant)
            .map(|m| estimate_tokens(m.char_len()))
            .sum();
        session.output_tokens = session
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| estimate_tokens(m.char_len()))
            .sum();

        session.state = SessionState::Compacted;
        self.touch(session)?;
        info!(
            "Compacted session {} to {} messages",
            session.id,
            session.messages.len()
        );
        Ok(true)
    }

    fn touch(&self, session: &mut Session) -> Result<(), String> {
        session.updated_at = Utc::now();
        self.store.save(session)
    }
}
