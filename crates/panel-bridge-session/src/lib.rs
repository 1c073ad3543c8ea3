//! Session orchestration: durable state, cooldowns, the log thread
//! lifecycle, and the controller exposed to the command layer.

pub mod controller;
pub mod cooldown;
pub mod storage;
pub mod sync;

#[cfg(test)]
pub(crate) mod testkit;

pub use controller::{ActionError, ControlOutcome, DashboardSnapshot, SessionController};
pub use cooldown::{CooldownGate, Verdict};
pub use storage::{JsonStateStore, MemoryStateStore, load_or_default};
pub use sync::{LogSyncManager, SyncError, SyncTransition};
