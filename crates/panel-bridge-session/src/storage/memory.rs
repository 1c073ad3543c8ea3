//! In-memory session state storage.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use panel_bridge_core::SessionState;
use panel_bridge_core::traits::{StateStore, StoreError};

/// In-memory storage implementation.
///
/// Useful for tests and ephemeral deployments. Data is lost on restart.
#[derive(Default)]
pub struct MemoryStateStore {
    stored: RwLock<Option<SessionState>>,
    fail_saves: AtomicBool,
}

impl MemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with `state`.
    #[must_use]
    pub fn with_state(state: SessionState) -> Self {
        Self {
            stored: RwLock::new(Some(state)),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `save` fail, to exercise the
    /// persistence-failure tolerance path.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<SessionState>, StoreError> {
        Ok(self
            .stored
            .read()
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?
            .clone())
    }

    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("save disabled")));
        }

        *self
            .stored
            .write()
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))? = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use panel_bridge_core::types::ServerStatus;

    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStateStore::new();
        assert!(store.load().await.unwrap().is_none());

        let state = SessionState {
            server_status: ServerStatus::Running,
            ..SessionState::default()
        };
        store.save(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap(), state);
    }

    #[tokio::test]
    async fn test_fail_saves_switch() {
        let store = MemoryStateStore::new();
        store.set_fail_saves(true);
        assert!(store.save(&SessionState::default()).await.is_err());

        store.set_fail_saves(false);
        assert!(store.save(&SessionState::default()).await.is_ok());
    }
}
