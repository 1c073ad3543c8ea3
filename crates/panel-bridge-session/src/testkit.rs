//! Shared scripted collaborators for session tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use panel_bridge_core::traits::{Authorizer, ChatError, ControlApi, ControlError, ThreadProvider};
use panel_bridge_core::types::{RoleId, ServerStatus, ThreadRef, UserId};
use panel_bridge_stream::{LogSource, StreamError, StreamEvent, StreamHandle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Thread provider that records every call and mints `thread-N` references.
#[derive(Default)]
pub(crate) struct RecordingThreads {
    created: Mutex<Vec<String>>,
    invites: Mutex<Vec<(ThreadRef, RoleId)>>,
    posts: Mutex<Vec<(ThreadRef, String)>>,
    post_attempts: AtomicUsize,
    archived: Mutex<Vec<ThreadRef>>,
    fail_create: AtomicBool,
    fail_posts: AtomicBool,
}

impl RecordingThreads {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn invites(&self) -> Vec<(ThreadRef, RoleId)> {
        self.invites.lock().unwrap().clone()
    }

    pub(crate) fn posts(&self) -> Vec<(ThreadRef, String)> {
        self.posts.lock().unwrap().clone()
    }

    /// Post calls made, including failed ones.
    pub(crate) fn post_attempts(&self) -> usize {
        self.post_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn archived(&self) -> Vec<ThreadRef> {
        self.archived.lock().unwrap().clone()
    }

    pub(crate) fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ThreadProvider for RecordingThreads {
    async fn create_thread(&self, name: &str) -> Result<ThreadRef, ChatError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ChatError::Platform("create disabled".into()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(name.to_owned());
        Ok(ThreadRef::new(format!("thread-{}", created.len())))
    }

    async fn invite_role(&self, thread: &ThreadRef, role: &RoleId) -> Result<(), ChatError> {
        self.invites
            .lock()
            .unwrap()
            .push((thread.clone(), role.clone()));
        Ok(())
    }

    async fn post_message(&self, thread: &ThreadRef, text: &str) -> Result<(), ChatError> {
        self.post_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(ChatError::Platform("post disabled".into()));
        }
        self.posts
            .lock()
            .unwrap()
            .push((thread.clone(), text.to_owned()));
        Ok(())
    }

    async fn archive_thread(&self, thread: &ThreadRef) -> Result<(), ChatError> {
        self.archived.lock().unwrap().push(thread.clone());
        Ok(())
    }
}

/// Log source whose sessions are driven by the test through a channel.
///
/// Each `push_session` queues one future `open` call; the returned sender
/// feeds events through to whatever sink the manager passes in.
#[derive(Default)]
pub(crate) struct StubSource {
    sessions: Mutex<VecDeque<mpsc::Receiver<StreamEvent>>>,
    fail_open: AtomicBool,
}

impl StubSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_session(&self) -> mpsc::Sender<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.sessions.lock().unwrap().push_back(rx);
        tx
    }

    pub(crate) fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogSource for StubSource {
    async fn open(&self, sink: mpsc::Sender<StreamEvent>) -> Result<StreamHandle, StreamError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(StreamError::Connect("open disabled".into()));
        }
        let mut events = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted session queued; call push_session first");

        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = child.cancelled() => return,
                    event = events.recv() => match event {
                        Some(event) => {
                            if sink.send(event).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    },
                }
            }
        });
        Ok(StreamHandle::new(cancel, task))
    }
}

/// Control API returning scripted statuses and recording dispatches.
#[derive(Default)]
pub(crate) struct ScriptedControl {
    statuses: Mutex<VecDeque<ServerStatus>>,
    calls: Mutex<Vec<String>>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
}

impl ScriptedControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue statuses returned by successive `status` calls. The last one
    /// repeats once the queue drains.
    pub(crate) fn script_statuses(&self, statuses: impl IntoIterator<Item = ServerStatus>) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ControlApi for ScriptedControl {
    async fn status(&self) -> Result<ServerStatus, ControlError> {
        self.calls.lock().unwrap().push("status".into());
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front().unwrap_or_default()
        } else {
            statuses.front().copied().unwrap_or_default()
        };
        Ok(status)
    }

    async fn start(&self) -> Result<(), ControlError> {
        self.calls.lock().unwrap().push("start".into());
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ControlError::Api {
                status: 500,
                message: "start disabled".into(),
            });
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ControlError> {
        self.calls.lock().unwrap().push("stop".into());
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ControlError::Api {
                status: 500,
                message: "stop disabled".into(),
            });
        }
        Ok(())
    }

    async fn send_command(&self, command: &str) -> Result<(), ControlError> {
        self.calls.lock().unwrap().push(format!("command:{command}"));
        Ok(())
    }
}

/// Authorizer with a fixed allow list.
pub(crate) struct StaticAuth {
    allowed: Vec<UserId>,
}

impl StaticAuth {
    pub(crate) fn allowing(users: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            allowed: users.into_iter().map(UserId::new).collect(),
        }
    }
}

#[async_trait]
impl Authorizer for StaticAuth {
    async fn is_authorized(&self, user: &UserId) -> bool {
        self.allowed.contains(user)
    }
}

/// Poll `cond` until it holds, yielding to background tasks in between.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
