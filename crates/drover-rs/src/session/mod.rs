//! Session lifecycle: persistent conversation records and their manager.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`store`] | [`Session`](store::Session) record and the keyed persistence seam |
//! | [`manager`] | [`SessionManager`](manager::SessionManager): create/load/fork/compact lifecycle |

pub mod manager;
pub mod store;

pub use manager::SessionManager;
pub use store::{Session, SessionState};
