//! Log thread lifecycle: daily threads, line routing, rotation.

use std::sync::Arc;

use chrono::NaiveDate;
use panel_bridge_core::SessionState;
use panel_bridge_core::clock::Clock;
use panel_bridge_core::config::{ChatConfig, LogSyncConfig};
use panel_bridge_core::rotation::{local_date, needs_rotation};
use panel_bridge_core::traits::{ChatError, StateStore, ThreadProvider};
use panel_bridge_core::types::{LogLine, ThreadRef};
use panel_bridge_stream::{LogSource, StreamError, StreamEvent, StreamHandle};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::storage::persist;

/// Lifecycle error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("chat platform error: {0}")]
    Chat(#[from] ChatError),
    #[error("log stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Result of an enable/disable call. Repeats are explicit no-ops, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTransition {
    Enabled { thread: ThreadRef },
    AlreadyEnabled,
    Disabled,
    AlreadyDisabled,
}

struct ActiveSync {
    handle: StreamHandle,
    router: JoinHandle<()>,
}

/// Owns the mapping from "log sync enabled" to a concrete chat thread and
/// routes streamed lines into it.
///
/// Singleton per deployment; Off/On transitions go through `enable` and
/// `disable`, daily rotation happens internally while staying On.
pub struct LogSyncManager {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn StateStore>,
    threads: Arc<dyn ThreadProvider>,
    source: Arc<dyn LogSource>,
    clock: Arc<dyn Clock>,
    chat: ChatConfig,
    logs: LogSyncConfig,
    active: Mutex<Option<ActiveSync>>,
}

impl LogSyncManager {
    /// Create a manager over the shared session state.
    #[must_use]
    pub fn new(
        state: Arc<Mutex<SessionState>>,
        store: Arc<dyn StateStore>,
        threads: Arc<dyn ThreadProvider>,
        source: Arc<dyn LogSource>,
        clock: Arc<dyn Clock>,
        chat: ChatConfig,
        logs: LogSyncConfig,
    ) -> Self {
        Self {
            state,
            store,
            threads,
            source,
            clock,
            chat,
            logs,
            active: Mutex::new(None),
        }
    }

    /// Whether sync is On with a live stream behind it.
    pub async fn is_enabled(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|a| !a.router.is_finished())
    }

    /// Turn log sync on.
    ///
    /// Resumes today's persisted thread when one exists, otherwise creates a
    /// new thread for today and invites the configured role.
    ///
    /// # Errors
    /// Returns an error if thread creation or stream opening fails; the
    /// manager stays Off in that case.
    pub async fn enable(&self) -> Result<SyncTransition, SyncError> {
        let mut active = self.active.lock().await;
        match active.as_ref() {
            // The stream died fatally; reap it before re-enabling.
            Some(current) if current.router.is_finished() => {
                if let Some(dead) = active.take() {
                    dead.handle.close().await;
                }
            }
            Some(_) => return Ok(SyncTransition::AlreadyEnabled),
            None => {}
        }

        let today = local_date(self.clock.now(), self.logs.timezone());

        let resumable = {
            let state = self.state.lock().await;
            match (&state.active_thread, state.active_thread_date) {
                (Some(thread), Some(date)) if date == today => Some(thread.clone()),
                _ => None,
            }
        };
        let thread = match resumable {
            Some(thread) => {
                tracing::info!(%thread, "resuming today's log thread");
                thread
            }
            None => open_thread(self.threads.as_ref(), &self.chat, today).await?,
        };

        let (tx, rx) = mpsc::channel(self.logs.buffer_capacity.max(1));
        let handle = self.source.open(tx).await?;

        {
            let mut state = self.state.lock().await;
            state.set_active_thread(thread.clone(), today);
            persist(self.store.as_ref(), &state).await;
        }

        let router = Router {
            state: Arc::clone(&self.state),
            store: Arc::clone(&self.store),
            threads: Arc::clone(&self.threads),
            clock: Arc::clone(&self.clock),
            chat: self.chat.clone(),
            logs: self.logs.clone(),
            thread: thread.clone(),
            date: today,
        };
        let router = tokio::spawn(router.run(rx));
        *active = Some(ActiveSync { handle, router });

        tracing::info!(%thread, "log sync enabled");
        Ok(SyncTransition::Enabled { thread })
    }

    /// Turn log sync off. The chat thread is left intact for archival.
    ///
    /// Stream cancellation is propagated before this returns, so callers can
    /// re-enable immediately without risking two live streams.
    pub async fn disable(&self) -> SyncTransition {
        let mut active = self.active.lock().await;
        let Some(current) = active.take() else {
            return SyncTransition::AlreadyDisabled;
        };

        current.handle.close().await;
        if let Err(e) = current.router.await {
            tracing::warn!(error = %e, "log router panicked");
        }

        let mut state = self.state.lock().await;
        if state.sync_enabled() {
            state.clear_active_thread();
            persist(self.store.as_ref(), &state).await;
            tracing::info!("log sync disabled");
            SyncTransition::Disabled
        } else {
            // The stream already died fatally and flipped us Off.
            SyncTransition::AlreadyDisabled
        }
    }
}

/// Create a thread for `date` and invite the operator role.
async fn open_thread(
    threads: &dyn ThreadProvider,
    chat: &ChatConfig,
    date: NaiveDate,
) -> Result<ThreadRef, ChatError> {
    let name = chat.thread_name(date);
    let thread = threads.create_thread(&name).await?;
    if let Err(e) = threads.invite_role(&thread, &chat.role_id).await {
        tracing::warn!(error = %e, %thread, "failed to invite role members");
    }
    tracing::info!(%thread, name, "created log thread");
    Ok(thread)
}

/// Per-subscription routing task. Exits when the stream closes (disable)
/// or turns fatal.
struct Router {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn StateStore>,
    threads: Arc<dyn ThreadProvider>,
    clock: Arc<dyn Clock>,
    chat: ChatConfig,
    logs: LogSyncConfig,
    thread: ThreadRef,
    date: NaiveDate,
}

impl Router {
    async fn run(mut self, mut events: mpsc::Receiver<StreamEvent>) {
        let mut poll = tokio::time::interval(self.logs.rotation_poll());
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    None => return,
                    Some(StreamEvent::Line(line)) => self.on_line(line).await,
                    Some(StreamEvent::Status(status)) => {
                        self.state.lock().await.server_status = status;
                    }
                    Some(StreamEvent::Fatal(err)) => {
                        self.on_fatal(&err).await;
                        return;
                    }
                },
                _ = poll.tick() => {
                    if let Err(e) = self.rotate_if_stale().await {
                        tracing::error!(error = %e, "scheduled thread rotation failed");
                    }
                }
            }
        }
    }

    /// Post one line, rotating first if the date rolled over.
    ///
    /// Each post is awaited before the next event is read; a slow chat
    /// platform slows consumption instead of growing a queue.
    async fn on_line(&mut self, line: LogLine) {
        if line.is_blank() {
            return;
        }
        if let Err(e) = self.rotate_if_stale().await {
            tracing::error!(error = %e, "thread rotation failed, dropping line");
            return;
        }

        for chunk in split_chunks(&line.text, self.logs.max_chars_per_post) {
            if let Err(e) = self
                .threads
                .post_message(&self.thread, &format!("```\n{chunk}\n```"))
                .await
            {
                tracing::warn!(error = %e, thread = %self.thread, "failed to post log line");
                break;
            }
        }
    }

    async fn rotate_if_stale(&mut self) -> Result<(), ChatError> {
        let now = self.clock.now();
        let tz = self.logs.timezone();
        if !needs_rotation(self.date, now, tz) {
            return Ok(());
        }

        let today = local_date(now, tz);
        let thread = open_thread(self.threads.as_ref(), &self.chat, today).await?;
        let previous = std::mem::replace(&mut self.thread, thread.clone());
        self.date = today;

        if let Err(e) = self.threads.archive_thread(&previous).await {
            tracing::warn!(error = %e, thread = %previous, "failed to archive rotated thread");
        }

        let mut state = self.state.lock().await;
        state.set_active_thread(thread, today);
        persist(self.store.as_ref(), &state).await;
        Ok(())
    }

    async fn on_fatal(&self, err: &StreamError) {
        tracing::error!(error = %err, "log stream failed permanently, sync disabled");
        let mut state = self.state.lock().await;
        state.clear_active_thread();
        persist(self.store.as_ref(), &state).await;
    }
}

/// Split one line into chat-sized chunks on char boundaries.
fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0_usize;

    for ch in text.chars() {
        if count == max_chars {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
