//! The persisted session record and its keyed store.
//!
//! Persistence writes are whole-record replaces (last-writer-wins): one
//! JSON file per session id, written atomically via a temp file renamed
//! into place. Malformed records encountered while listing are skipped
//! with a warning, never fatal.

use crate::{Message, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

// ── Session record ─────────────────────────────────────────────────

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting messages normally.
    Active,
    /// The log has been replaced by a summary plus a recent suffix.
    Compacted,
    /// Retired; excluded from resume-last.
    Archived,
}

/// One persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Back-reference set by forking; never mutated afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Working directory the session's tools operate in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    pub tier: Tier,
    pub state: SessionState,
    pub messages: Vec<Message>,
    /// Approximate tokens consumed by user/system/tool content.
    pub input_tokens: u64,
    /// Approximate tokens produced as assistant content.
    pub output_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Approximate total token footprint of the session.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

// ── Store seam ─────────────────────────────────────────────────────

/// Keyed persistence for sessions: id → full record, whole-record
/// replace on save.
pub trait SessionStore: Send + Sync {
    fn save(&self, session: &Session) -> Result<(), String>;
    fn load(&self, id: &str) -> Result<Option<Session>, String>;
    /// All readable sessions, unordered. Malformed records are skipped.
    fn list(&self) -> Result<Vec<Session>, String>;
    fn delete(&self, id: &str) -> Result<(), String>;
}

// ── File store ─────────────────────────────────────────────────────

/// One JSON file per session under a root directory.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `dir`, creating the directory as needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, String> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create sessions dir: {e}"))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl SessionStore for FileSessionStore {
    /// Atomic write: serialize to a temp file, then rename into place.
    fn save(&self, session: &Session) -> Result<(), String> {
        let final_path = self.session_path(&session.id);
        let tmp_path = self.dir.join(format!(".{}.json.tmp", session.id));

        let json = serde_json::to_string_pretty(session)
            .map_err(|e| format!("Failed to serialize session: {e}"))?;
        std::fs::write(&tmp_path, json)
            .map_err(|e| format!("Failed to write temp session: {e}"))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| format!("Failed to rename session: {e}"))?;
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<Session>, String> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let json =
            std::fs::read_to_string(&path).map_err(|e| format!("Failed to read session: {e}"))?;
        let session =
            serde_json::from_str(&json).map_err(|e| format!("Failed to parse session: {e}"))?;
        Ok(Some(session))
    }

    fn list(&self) -> Result<Vec<Session>, String> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| format!("Failed to read sessions dir: {e}"))?;

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("Failed to read entry: {e}"))?;
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(json) => match serde_json::from_str::<Session>(&json) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        warn!("Skipping malformed session at {}: {e}", path.display());
                    }
                },
                Err(e) => {
                    warn!("Skipping unreadable session at {}: {e}", path.display());
                }
            }
        }
        Ok(sessions)
    }

    fn delete(&self, id: &str) -> Result<(), String> {
        let path = self.session_path(id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| format!("Failed to delete session: {e}"))?;
        }
        Ok(())
    }
}
