//! Opaque references and shared value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a rendered dashboard message on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub String);

/// Opaque identifier of a communication thread on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadRef(pub String);

/// Opaque identifier of a chat platform user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Opaque identifier of the role whose members may operate the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub String);

impl MessageRef {
    /// Create a reference from any string-like id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl ThreadRef {
    /// Create a reference from any string-like id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl UserId {
    /// Create a user id from any string-like id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl RoleId {
    /// Create a role id from any string-like id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Managed process status as reported by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Status has not been observed yet, or the panel was unreachable.
    #[default]
    Unknown,
    /// Process is not running.
    Stopped,
    /// Start was dispatched; process is coming up.
    Starting,
    /// Process is running.
    Running,
    /// Stop was dispatched; process is shutting down.
    Stopping,
}

/// Cooldown-gated action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Start,
    Stop,
    Restart,
    /// Either direction of the log sync toggle.
    LogsToggle,
}

impl ActionKind {
    /// Stable name used in logs and rendered cooldown messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::LogsToggle => "logs_toggle",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single console line received from the remote log stream.
///
/// Transient: produced by the stream client, consumed and discarded by the
/// thread lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Raw line text, without a trailing newline.
    pub text: String,
    /// Receipt timestamp (not the remote emission time).
    pub received_at: DateTime<Utc>,
}

impl LogLine {
    /// Create a line stamped with the given receipt time.
    #[must_use]
    pub fn new(text: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            received_at,
        }
    }

    /// Whether the line carries no visible content.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
