//! Transport seam, tier classification, and the streaming agent loop.
//!
//! - [`transport`] — the [`ChatTransport`](transport::ChatTransport) trait
//!   and the default OpenRouter SSE client.
//! - [`classifier`] — the heuristic tier gate.
//! - [`router`] — the [`StreamingRouter`](router::StreamingRouter) turn loop.
//! - [`retry`] — backoff used inside the transport (the router never
//!   retries).

pub mod classifier;
pub mod retry;
pub mod router;
pub mod transport;
