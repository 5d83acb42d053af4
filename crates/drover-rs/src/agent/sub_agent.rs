//! Sub-agent state registry.
//!
//! Every delegated task gets one [`AgentState`] keyed by id, with an
//! explicit lifecycle: created on launch, updated on completion or
//! failure. State is persisted to one JSON file per agent so a
//! long-running or backgrounded sub-agent can be resumed by id after a
//! restart. The registry is an explicit map — no closures capturing
//! mutable outer state.

use crate::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Lifecycle status of a sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Launched and working.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Error,
    /// Detached; the parent turn moved on, result collected later.
    Background,
}

/// The full state of one sub-agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub id: String,
    /// What kind of agent this is (e.g. "explore", "implement").
    pub agent_type: String,
    /// The launch parameters, kept verbatim for resumption.
    pub params: serde_json::Value,
    /// The sub-agent's own message log.
    pub messages: Vec<Message>,
    pub status: AgentStatus,
    /// Final output once `Completed`, or the error text once `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registry of sub-agent states keyed by id, persisted per agent.
pub struct AgentRegistry {
    dir: PathBuf,
    agents: Mutex<HashMap<String, AgentState>>,
}

impl AgentRegistry {
    /// Open a registry rooted at `dir`, loading any persisted agent
    /// records. Malformed records are skipped with a warning.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, String> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create agents dir: {e}"))?;

        let mut agents = HashMap::new();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| format!("Failed to read agents dir: {e}"))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(json) => match serde_json::from_str::<AgentState>(&json) {
                    Ok(state) => {
                        agents.insert(state.id.clone(), state);
                    }
                    Err(e) => warn!("Skipping malformed agent at {}: {e}", path.display()),
                },
                Err(e) => warn!("Skipping unreadable agent at {}: {e}", path.display()),
            }
        }
        Ok(Self {
            dir,
            agents: Mutex::new(agents),
        })
    }

    fn agent_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Atomic write: temp file, then rename into place.
    fn persist(&self, state: &AgentState) -> Result<(), String> {
        let final_path = self.agent_path(&state.id);
        let tmp_path = self.dir.join(format!(".{}.json.tmp", state.id));
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| format!("Failed to serialize agent state: {e}"))?;
        std::fs::write(&tmp_path, json)
            .map_err(|e| format!("Failed to write temp agent state: {e}"))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| format!("Failed to rename agent state: {e}"))?;
        Ok(())
    }

    /// Create a `Running` agent record and persist it. Returns the new id.
    pub fn launch(
        &self,
        agent_type: impl Into<String>,
        params: serde_json::Value,
    ) -> Result<AgentState, String> {
        let now = Utc::now();
        let state = AgentState {
            id: uuid::Uuid::new_v4().to_string(),
            agent_type: agent_type.into(),
            params,
            messages: Vec::new(),
            status: AgentStatus::Running,
            result: None,
            created_at: now,
            updated_at: now,
        };
        self.persist(&state)?;
        info!("Launched {} agent {}", state.agent_type, state.id);
        self.agents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(state.id.clone(), state.clone());
        Ok(state)
    }

    /// Append a message to an agent's log and persist.
    pub fn append_message(&self, id: &str, message: Message) -> Result<(), String> {
        self.update(id, |state| {
            state.messages.push(message);
        })
    }

    /// Mark an agent `Completed` with its result.
    pub fn complete(&self, id: &str, result: impl Into<String>) -> Result<(), String> {
        let result = result.into();
        self.update(id, |state| {
            state.status = AgentStatus::Completed;
            state.result = Some(result);
        })
    }

    /// Mark an agent `Error` with the failure text.
    pub fn fail(&self, id: &str, error: impl Into<String>) -> Result<(), String> {
        let error = error.into();
        self.update(id, |state| {
            state.status = AgentStatus::Error;
            state.result = Some(error);
        })
    }

    /// Detach an agent into the background.
    pub fn background(&self, id: &str) -> Result<(), String> {
        self.update(id, |state| {
            state.status = AgentStatus::Background;
        })
    }

    /// Look up an agent by id.
    pub fn get(&self, id: &str) -> Option<AgentState> {
        self.agents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// All known agents, most recently updated first.
    pub fn list(&self) -> Vec<AgentState> {
        let mut agents: Vec<AgentState> = self
            .agents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        agents
    }

    /// Remove an agent record and its persisted file.
    pub fn remove(&self, id: &str) -> Result<(), String> {
        self.agents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        let path = self.agent_path(id);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| format!("Failed to delete agent state: {e}"))?;
        }
        Ok(())
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut AgentState)) -> Result<(), String> {
        let mut agents = self.agents.lock().unwrap_or_else(|e| e.into_inner());
        let state = agents
            .get_mut(id)
            .ok_or_else(|| format!("unknown agent '{id}'"))?;
        apply(state);
        state.updated_at = Utc::now();
        self.persist(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_complete_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::open(dir.path()).unwrap();
        let state = registry
            .launch("explore", serde_json::json!({"target": "src/"}))
            .unwrap();
        assert_eq!(state.status, AgentStatus::Running);

        registry
            .append_message(&state.id, Message::assistant_text("found it"))
            .unwrap();
        registry.complete(&state.id, "done: 3 files").unwrap();

        let loaded = registry.get(&state.id).unwrap();
        assert_eq!(loaded.status, AgentStatus::Completed);
        assert_eq!(loaded.result.as_deref(), Some("done: 3 files"));
        assert_eq!(loaded.messages.len(), 1);
    }

    #[test]
    fn state_survives_reopen_for_resumption() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let registry = AgentRegistry::open(dir.path()).unwrap();
            let state = registry
                .launch("implement", serde_json::json!({"task": "retry layer"}))
                .unwrap();
            registry.background(&state.id).unwrap();
            state.id
        };

        // A fresh registry over the same directory sees the agent.
        let reopened = AgentRegistry::open(dir.path()).unwrap();
        let resumed = reopened.get(&id).unwrap();
        assert_eq!(resumed.status, AgentStatus::Background);
        assert_eq!(resumed.params["task"], "retry layer");
    }

    #[test]
    fn failure_is_recorded_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::open(dir.path()).unwrap();
        let state = registry.launch("explore", serde_json::json!({})).unwrap();
        registry.fail(&state.id, "model unavailable").unwrap();

        let loaded = registry.get(&state.id).unwrap();
        assert_eq!(loaded.status, AgentStatus::Error);
        assert_eq!(loaded.result.as_deref(), Some("model unavailable"));
    }

    #[test]
    fn unknown_agent_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::open(dir.path()).unwrap();
        assert!(registry.complete("nope", "x").is_err());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn remove_deletes_record_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::open(dir.path()).unwrap();
        let state = registry.launch("explore", serde_json::json!({})).unwrap();
        registry.remove(&state.id).unwrap();
        assert!(registry.get(&state.id).is_none());
        assert!(!dir.path().join(format!("{}.json", state.id)).exists());
    }

    #[test]
    fn malformed_records_are_skipped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = AgentRegistry::open(dir.path()).unwrap();
            registry.launch("explore", serde_json::json!({})).unwrap();
        }
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let reopened = AgentRegistry::open(dir.path()).unwrap();
        assert_eq!(reopened.list().len(), 1);
    }
}
