//! The human-prompt capability: an externally supplied resolver for
//! suspension points.
//!
//! An `ask` permission check and a structured multi-choice question are the
//! same shape: the agent suspends until a human answers. Both are modeled
//! as methods on the [`Prompter`] trait, passed into the
//! [`PermissionManager`](super::permission::PermissionManager) at
//! construction time — never a settable global, so concurrent agent
//! instances (tests, multi-session use) cannot interfere.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Prompter`] methods.
///
/// Type alias to keep the trait dyn-compatible (object-safe).
pub type PromptFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A structured multi-choice question presented to the user mid-run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
    /// Short prompt displayed as a header.
    pub prompt: String,
    /// Available choices.
    pub choices: Vec<Choice>,
}

/// A single selectable choice within a [`Question`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Choice {
    /// Short label (e.g. "Overwrite the file").
    pub label: String,
    /// Full body text displayed when this choice is focused.
    pub body: String,
}

/// The user's response to a [`Question`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Answer {
    /// User selected a choice (by index).
    Selected(usize),
    /// User explicitly skipped / dismissed the question.
    Skipped,
}

/// Resolver for human-in-the-loop suspension points.
pub trait Prompter: Send + Sync {
    /// Ask the user to approve or reject a pending tool invocation.
    /// Resolves to `true` to proceed.
    fn confirm(&self, tool_name: &str, input: &str) -> PromptFuture<'_, bool>;

    /// Ask the user a structured multi-choice question.
    fn choose(&self, question: &Question) -> PromptFuture<'_, Answer>;
}

/// A prompter with a fixed answer, for tests and non-interactive runs.
pub struct StaticPrompter {
    approve: bool,
}

impl StaticPrompter {
    /// Approves every confirmation.
    pub fn approve_all() -> Self {
        Self { approve: true }
    }

    /// Rejects every confirmation.
    pub fn deny_all() -> Self {
        Self { approve: false }
    }
}

impl Prompter for StaticPrompter {
    fn confirm(&self, _tool_name: &str, _input: &str) -> PromptFuture<'_, bool> {
        let answer = self.approve;
        Box::pin(async move { answer })
    }

    fn choose(&self, question: &Question) -> PromptFuture<'_, Answer> {
        let answer = if self.approve && !question.choices.is_empty() {
            Answer::Selected(0)
        } else {
            Answer::Skipped
        };
        Box::pin(async move { answer })
    }
}
