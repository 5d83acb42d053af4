//! Tool execution gate: registry, permission rules, and built-in tools.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`registry`] | [`Tool`](registry::Tool) trait, [`ToolRegistry`](registry::ToolRegistry) dispatch with cancellation and permission gating |
//! | [`permission`] | allow/ask/deny rule engine with first-match-wins ordering |
//! | [`prompt`] | the injected human-prompt capability for `ask` suspensions |
//! | [`common`] | built-in file, shell, and search tools |

pub mod common;
pub mod permission;
pub mod prompt;
pub mod registry;
