//! Session state storage backends.

mod json;
mod memory;

pub use json::JsonStateStore;
pub use memory::MemoryStateStore;

use panel_bridge_core::SessionState;
use panel_bridge_core::traits::StateStore;

/// Flush `state`, logging instead of failing.
///
/// The design tolerates losing state on a crash but never fails a completed
/// user action because the disk write did not land.
pub(crate) async fn persist(store: &dyn StateStore, state: &SessionState) {
    if let Err(e) = store.save(state).await {
        tracing::error!(error = %e, "failed to persist session state");
    }
}

/// Load the stored record, falling back to defaults when absent.
pub async fn load_or_default(store: &dyn StateStore) -> SessionState {
    match store.load().await {
        Ok(Some(state)) => state,
        Ok(None) => SessionState::default(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to load session state, starting fresh");
            SessionState::default()
        }
    }
}
