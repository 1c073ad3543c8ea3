//! Collaborator traits consumed by the session core.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::state::SessionState;
use crate::types::{RoleId, ServerStatus, ThreadRef, UserId};

/// Margin subtracted from token expiry so a token is refreshed before the
/// panel starts rejecting it.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Control API error.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("panel API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Credential acquisition error.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("token request failed: {0}")]
    Request(String),
    #[error("token rejected: {0}")]
    Rejected(String),
}

/// Chat platform error.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat platform error: {0}")]
    Platform(String),
    #[error("missing permissions: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Durable storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A bearer token for the panel API and log stream.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Whether the token should be considered expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS)
    }
}

/// Control surface of the remote server-management panel.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// Current status of the managed process.
    async fn status(&self) -> Result<ServerStatus, ControlError>;

    /// Dispatch a start of the managed process.
    async fn start(&self) -> Result<(), ControlError>;

    /// Dispatch a stop of the managed process.
    async fn stop(&self) -> Result<(), ControlError>;

    /// Forward a console command to the managed process.
    async fn send_command(&self, command: &str) -> Result<(), ControlError>;
}

/// Token acquisition for the panel API and log stream.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A currently valid token, acquiring one if necessary.
    async fn token(&self) -> Result<Token, CredentialError>;

    /// Force acquisition of a fresh token, discarding any cached one.
    async fn refresh(&self) -> Result<Token, CredentialError>;
}

/// Thread operations on the chat platform.
#[async_trait]
pub trait ThreadProvider: Send + Sync {
    /// Create a thread with the given name and return its durable reference.
    async fn create_thread(&self, name: &str) -> Result<ThreadRef, ChatError>;

    /// Invite every member of `role` to the thread.
    async fn invite_role(&self, thread: &ThreadRef, role: &RoleId) -> Result<(), ChatError>;

    /// Post a message into the thread.
    async fn post_message(&self, thread: &ThreadRef, text: &str) -> Result<(), ChatError>;

    /// Archive the thread.
    async fn archive_thread(&self, thread: &ThreadRef) -> Result<(), ChatError>;
}

/// Role-based authorization check.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Whether `user` holds the configured operator role.
    async fn is_authorized(&self, user: &UserId) -> bool;
}

/// Durable storage for the session state record.
///
/// `save` must have atomic replace semantics: a crash mid-write never
/// corrupts the previously stored record.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the stored record, or `None` if nothing was ever stored.
    async fn load(&self) -> Result<Option<SessionState>, StoreError>;

    /// Atomically replace the stored record.
    async fn save(&self, state: &SessionState) -> Result<(), StoreError>;
}
