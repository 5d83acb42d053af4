//! Sub-agent bookkeeping.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`sub_agent`] | [`AgentRegistry`](sub_agent::AgentRegistry): per-id sub-agent state with persistence for resumption |

pub mod sub_agent;
