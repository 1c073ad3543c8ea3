//! User-facing session operations.
//!
//! Every gated operation runs authorize, cooldown check, dispatch, cooldown
//! record, persist as one sequence under the session state lock, so two
//! requests for the same user and action cannot both pass the gate.

use std::sync::Arc;

use panel_bridge_core::SessionState;
use panel_bridge_core::clock::Clock;
use panel_bridge_core::config::{BridgeConfig, RestartConfig};
use panel_bridge_core::traits::{Authorizer, ChatError, ControlApi, ControlError, StateStore};
use panel_bridge_core::types::{ActionKind, MessageRef, ServerStatus, ThreadRef, UserId};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cooldown::{CooldownGate, Verdict};
use crate::storage::persist;
use crate::sync::{LogSyncManager, SyncError, SyncTransition};

/// Why a user-facing operation was refused.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("user is not authorized")]
    Unauthorized,
    #[error("action is on cooldown for another {}s", .remaining.as_secs())]
    Cooldown { remaining: std::time::Duration },
    #[error("cannot {action} while the server is {status:?}")]
    InvalidTransition {
        action: ActionKind,
        status: ServerStatus,
    },
    #[error("log stream failed: {0}")]
    StreamFatal(String),
    #[error("upstream request failed: {0}")]
    UpstreamUnavailable(String),
}

impl From<ControlError> for ActionError {
    fn from(e: ControlError) -> Self {
        Self::UpstreamUnavailable(e.to_string())
    }
}

impl From<ChatError> for ActionError {
    fn from(e: ChatError) -> Self {
        Self::UpstreamUnavailable(e.to_string())
    }
}

impl From<SyncError> for ActionError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Chat(e) => Self::UpstreamUnavailable(e.to_string()),
            SyncError::Stream(e) => Self::StreamFatal(e.to_string()),
        }
    }
}

/// Result of a lifecycle action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The panel accepted the dispatch; `expected` is the transitional
    /// status the process should now report.
    Dispatched {
        action: ActionKind,
        expected: ServerStatus,
    },
    /// The process was already where the action would put it; nothing was
    /// dispatched and no cooldown opened.
    AlreadyInState { status: ServerStatus },
}

/// Everything a dashboard rendering needs, in one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSnapshot {
    pub server_status: ServerStatus,
    pub sync_enabled: bool,
    pub active_thread: Option<ThreadRef>,
    pub dashboard_message: Option<MessageRef>,
}

/// Orchestrates panel control, log sync and the session record.
pub struct SessionController {
    control: Arc<dyn ControlApi>,
    authorizer: Arc<dyn Authorizer>,
    sync: Arc<LogSyncManager>,
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    gate: CooldownGate,
    restart: RestartConfig,
    auto_resume: bool,
    // Serializes the sync toggle, which cannot run under the state lock
    // because the manager takes that lock itself.
    toggle_lock: Mutex<()>,
}

impl SessionController {
    /// Wire a controller over shared state and collaborators.
    #[must_use]
    pub fn new(
        control: Arc<dyn ControlApi>,
        authorizer: Arc<dyn Authorizer>,
        sync: Arc<LogSyncManager>,
        state: Arc<Mutex<SessionState>>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            control,
            authorizer,
            sync,
            state,
            store,
            clock,
            gate: CooldownGate::new(config.actions.clone()),
            restart: config.actions.restart.clone(),
            auto_resume: config.logs.auto_resume,
            toggle_lock: Mutex::new(()),
        }
    }

    /// Bring the session back up after a restart of the bridge itself.
    ///
    /// Refreshes the process status from the panel and, when configured,
    /// re-enables log sync if the persisted record says it was on.
    pub async fn resume(&self) {
        match self.control.status().await {
            Ok(status) => {
                let mut state = self.state.lock().await;
                state.server_status = status;
                persist(self.store.as_ref(), &state).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "status refresh failed during resume");
            }
        }

        let was_on = self.state.lock().await.sync_enabled();
        if self.auto_resume && was_on {
            match self.sync.enable().await {
                Ok(transition) => tracing::info!(?transition, "log sync resumed"),
                Err(e) => tracing::error!(error = %e, "failed to resume log sync"),
            }
        }
    }

    /// Start the managed process.
    ///
    /// # Errors
    /// Refused when the user lacks the role, the start cooldown is open, or
    /// the panel rejects the dispatch.
    pub async fn start(&self, user: &UserId) -> Result<ControlOutcome, ActionError> {
        self.authorize(user).await?;

        let mut state = self.state.lock().await;
        self.check_cooldown(&mut state, user, ActionKind::Start)?;

        let status = self.control.status().await?;
        state.server_status = status;
        if matches!(status, ServerStatus::Running | ServerStatus::Starting) {
            persist(self.store.as_ref(), &state).await;
            return Ok(ControlOutcome::AlreadyInState { status });
        }

        self.control.start().await?;
        state.server_status = ServerStatus::Starting;
        self.gate
            .record(&mut state, user, ActionKind::Start, self.clock.now());
        persist(self.store.as_ref(), &state).await;

        tracing::info!(%user, "start dispatched");
        Ok(ControlOutcome::Dispatched {
            action: ActionKind::Start,
            expected: ServerStatus::Starting,
        })
    }

    /// Stop the managed process.
    ///
    /// # Errors
    /// Refused when the user lacks the role, the stop cooldown is open, or
    /// the panel rejects the dispatch.
    pub async fn stop(&self, user: &UserId) -> Result<ControlOutcome, ActionError> {
        self.authorize(user).await?;

        let mut state = self.state.lock().await;
        self.check_cooldown(&mut state, user, ActionKind::Stop)?;

        let status = self.control.status().await?;
        state.server_status = status;
        if matches!(status, ServerStatus::Stopped | ServerStatus::Stopping) {
            persist(self.store.as_ref(), &state).await;
            return Ok(ControlOutcome::AlreadyInState { status });
        }

        self.control.stop().await?;
        state.server_status = ServerStatus::Stopping;
        self.gate
            .record(&mut state, user, ActionKind::Stop, self.clock.now());
        persist(self.store.as_ref(), &state).await;

        tracing::info!(%user, "stop dispatched");
        Ok(ControlOutcome::Dispatched {
            action: ActionKind::Stop,
            expected: ServerStatus::Stopping,
        })
    }

    /// Restart: stop, wait for the process to report Stopped, then start.
    ///
    /// The cooldown opens only once the final start is dispatched, so a
    /// restart that stalls mid-sequence can be retried immediately.
    ///
    /// # Errors
    /// Refused like `start`; additionally refused when the process is not
    /// running, and fails without a start dispatch when the process does not
    /// stop within the configured window.
    pub async fn restart(&self, user: &UserId) -> Result<ControlOutcome, ActionError> {
        self.authorize(user).await?;

        let mut state = self.state.lock().await;
        self.check_cooldown(&mut state, user, ActionKind::Restart)?;

        let status = self.control.status().await?;
        state.server_status = status;
        if status == ServerStatus::Stopped {
            persist(self.store.as_ref(), &state).await;
            return Err(ActionError::InvalidTransition {
                action: ActionKind::Restart,
                status,
            });
        }

        self.control.stop().await?;
        state.server_status = ServerStatus::Stopping;
        self.wait_for_stopped(&mut state).await?;

        self.control.start().await?;
        state.server_status = ServerStatus::Starting;
        self.gate
            .record(&mut state, user, ActionKind::Restart, self.clock.now());
        persist(self.store.as_ref(), &state).await;

        tracing::info!(%user, "restart dispatched");
        Ok(ControlOutcome::Dispatched {
            action: ActionKind::Restart,
            expected: ServerStatus::Starting,
        })
    }

    /// Turn the log stream on.
    ///
    /// # Errors
    /// Refused when the user lacks the role or the toggle cooldown is open;
    /// fails when the thread or stream cannot be set up.
    pub async fn enable_log_sync(&self, user: &UserId) -> Result<SyncTransition, ActionError> {
        self.authorize(user).await?;
        let _toggle = self.toggle_lock.lock().await;

        {
            let mut state = self.state.lock().await;
            self.check_cooldown(&mut state, user, ActionKind::LogsToggle)?;
        }

        let transition = self.sync.enable().await?;
        if matches!(transition, SyncTransition::Enabled { .. }) {
            self.record_toggle(user).await;
        }
        Ok(transition)
    }

    /// Turn the log stream off.
    ///
    /// # Errors
    /// Refused when the user lacks the role or the toggle cooldown is open.
    pub async fn disable_log_sync(&self, user: &UserId) -> Result<SyncTransition, ActionError> {
        self.authorize(user).await?;
        let _toggle = self.toggle_lock.lock().await;

        {
            let mut state = self.state.lock().await;
            self.check_cooldown(&mut state, user, ActionKind::LogsToggle)?;
        }

        let transition = self.sync.disable().await;
        if transition == SyncTransition::Disabled {
            self.record_toggle(user).await;
        }
        Ok(transition)
    }

    /// Forward a raw console command to the managed process.
    ///
    /// # Errors
    /// Refused when the user lacks the role or the panel rejects the command.
    pub async fn run_console_command(
        &self,
        user: &UserId,
        command: &str,
    ) -> Result<(), ActionError> {
        self.authorize(user).await?;
        self.control.send_command(command).await?;
        tracing::info!(%user, command, "console command forwarded");
        Ok(())
    }

    /// Query the panel for a fresh status and return a dashboard snapshot.
    ///
    /// An unreachable panel degrades the status to `Unknown` instead of
    /// failing the refresh.
    ///
    /// # Errors
    /// Refused when the user lacks the role.
    pub async fn refresh_dashboard(&self, user: &UserId) -> Result<DashboardSnapshot, ActionError> {
        self.authorize(user).await?;
        let status = match self.control.status().await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "status refresh failed");
                ServerStatus::Unknown
            }
        };

        let mut state = self.state.lock().await;
        state.server_status = status;
        persist(self.store.as_ref(), &state).await;
        Ok(self.snapshot_of(&state))
    }

    /// Snapshot the session without touching the panel.
    pub async fn dashboard(&self) -> DashboardSnapshot {
        let state = self.state.lock().await;
        self.snapshot_of(&state)
    }

    /// Remember which chat message renders the dashboard.
    pub async fn bind_dashboard(&self, message: MessageRef) {
        let mut state = self.state.lock().await;
        state.dashboard_message = Some(message);
        persist(self.store.as_ref(), &state).await;
    }

    /// Forget the rendered dashboard message, forcing a repost next time.
    pub async fn reset_dashboard(&self) {
        let mut state = self.state.lock().await;
        state.dashboard_message = None;
        persist(self.store.as_ref(), &state).await;
    }

    /// The currently bound dashboard message, if any.
    pub async fn dashboard_message(&self) -> Option<MessageRef> {
        self.state.lock().await.dashboard_message.clone()
    }

    /// Record a status observed out of band (for example from the stream).
    pub async fn note_status(&self, status: ServerStatus) {
        let mut state = self.state.lock().await;
        state.server_status = status;
        persist(self.store.as_ref(), &state).await;
    }

    async fn authorize(&self, user: &UserId) -> Result<(), ActionError> {
        if self.authorizer.is_authorized(user).await {
            Ok(())
        } else {
            tracing::warn!(%user, "unauthorized action refused");
            Err(ActionError::Unauthorized)
        }
    }

    fn check_cooldown(
        &self,
        state: &mut SessionState,
        user: &UserId,
        action: ActionKind,
    ) -> Result<(), ActionError> {
        match self.gate.check(state, user, action, self.clock.now()) {
            Verdict::Allowed => Ok(()),
            Verdict::Denied { remaining } => Err(ActionError::Cooldown { remaining }),
        }
    }

    async fn record_toggle(&self, user: &UserId) {
        let mut state = self.state.lock().await;
        self.gate
            .record(&mut state, user, ActionKind::LogsToggle, self.clock.now());
        persist(self.store.as_ref(), &state).await;
    }

    /// Poll until the process reports Stopped, bounded by the restart window.
    async fn wait_for_stopped(&self, state: &mut SessionState) -> Result<(), ActionError> {
        let deadline = tokio::time::Instant::now() + self.restart.stop_timeout();
        loop {
            let status = self.control.status().await?;
            state.server_status = status;
            if status == ServerStatus::Stopped {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ActionError::UpstreamUnavailable(
                    "process did not stop within the restart window".into(),
                ));
            }
            tokio::time::sleep(self.restart.poll_interval()).await;
        }
    }

    fn snapshot_of(&self, state: &SessionState) -> DashboardSnapshot {
        DashboardSnapshot {
            server_status: state.server_status,
            sync_enabled: state.sync_enabled(),
            active_thread: state.active_thread.clone(),
            dashboard_message: state.dashboard_message.clone(),
        }
    }
}
