//! Core abstractions for the panel bridge.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionState` - Durable session record (dashboard, thread, cooldowns)
//! - Opaque reference and status types shared across crates
//! - Collaborator traits (control API, credentials, chat threads, storage)
//! - Clock abstraction and the daily thread rotation predicate

pub mod clock;
pub mod config;
pub mod rotation;
pub mod state;
pub mod traits;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use config::BridgeConfig;
pub use state::SessionState;
pub use traits::{Authorizer, ControlApi, CredentialProvider, StateStore, ThreadProvider};
pub use types::{ActionKind, LogLine, MessageRef, RoleId, ServerStatus, ThreadRef, UserId};
