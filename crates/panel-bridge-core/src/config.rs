//! Configuration model.
//!
//! Deserializable with serde; how the file reaches disk is the embedding
//! application's concern. Every field has a default so partial configs load.

use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::types::{ActionKind, RoleId};

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub panel: PanelConfig,
    pub chat: ChatConfig,
    pub logs: LogSyncConfig,
    pub stream: StreamConfig,
    pub actions: ActionConfig,
}

/// Remote panel endpoint and OAuth2 client credentials.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub base_url: String,
    pub server_id: String,
    pub oauth: OauthConfig,
}

impl PanelConfig {
    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// OAuth2 client-credentials grant settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OauthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
}

impl Default for OauthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_endpoint: "/oauth2/token".into(),
        }
    }
}

/// Chat platform settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Role whose members are authorized and invited to log threads.
    pub role_id: RoleId,
    /// Thread name pattern; `{date}` is replaced with the local date.
    pub thread_name_format: String,
    pub auto_archive_minutes: u32,
}

impl ChatConfig {
    /// Thread name for the given local date.
    #[must_use]
    pub fn thread_name(&self, date: chrono::NaiveDate) -> String {
        self.thread_name_format
            .replace("{date}", &date.format("%Y-%m-%d").to_string())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            role_id: RoleId::new(""),
            thread_name_format: "console-{date}".into(),
            auto_archive_minutes: 1440,
        }
    }
}

/// Log sync behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSyncConfig {
    /// Re-enable sync on startup when the persisted state says it was on.
    pub auto_resume: bool,
    /// Deployment time zone as minutes east of UTC (e.g. 540 for UTC+9).
    pub utc_offset_minutes: i32,
    /// Upper bound on rotation latency when no lines arrive.
    pub rotation_poll_secs: u64,
    /// Chat platform post size limit, minus code fence overhead.
    pub max_chars_per_post: usize,
    /// Bounded channel capacity between the stream and the router.
    pub buffer_capacity: usize,
}

impl LogSyncConfig {
    /// Configured offset, falling back to UTC on an out-of-range value.
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }

    #[must_use]
    pub const fn rotation_poll(&self) -> Duration {
        Duration::from_secs(self.rotation_poll_secs)
    }
}

impl Default for LogSyncConfig {
    fn default() -> Self {
        Self {
            auto_resume: false,
            utc_offset_minutes: 540,
            rotation_poll_secs: 60,
            max_chars_per_post: 1900,
            buffer_capacity: 256,
        }
    }
}

/// Stream reconnection policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
    /// Consecutive failed attempts tolerated before the stream is fatal.
    pub max_attempts: u32,
    pub connect_timeout_secs: u64,
    pub heartbeat_secs: u64,
}

impl StreamConfig {
    #[must_use]
    pub const fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }

    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_backoff_secs: 1,
            max_backoff_secs: 30,
            max_attempts: 10,
            connect_timeout_secs: 10,
            heartbeat_secs: 30,
        }
    }
}

/// Cooldown durations and restart sequencing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub start_cooldown_secs: u64,
    pub stop_cooldown_secs: u64,
    pub restart_cooldown_secs: u64,
    pub logs_toggle_cooldown_secs: u64,
    pub restart: RestartConfig,
}

impl ActionConfig {
    /// Cooldown duration for one action kind.
    #[must_use]
    pub const fn cooldown(&self, kind: ActionKind) -> Duration {
        let secs = match kind {
            ActionKind::Start => self.start_cooldown_secs,
            ActionKind::Stop => self.stop_cooldown_secs,
            ActionKind::Restart => self.restart_cooldown_secs,
            ActionKind::LogsToggle => self.logs_toggle_cooldown_secs,
        };
        Duration::from_secs(secs)
    }
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            start_cooldown_secs: 10,
            stop_cooldown_secs: 10,
            restart_cooldown_secs: 10,
            logs_toggle_cooldown_secs: 10,
            restart: RestartConfig::default(),
        }
    }
}

/// Restart = stop, wait for Stopped, then start.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// How long to wait for the process to report Stopped.
    pub stop_timeout_secs: u64,
    /// Status poll interval while waiting.
    pub poll_interval_secs: u64,
}

impl RestartConfig {
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 30,
            poll_interval_secs: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"panel": {"base_url": "https://panel.example/", "server_id": "srv1"}}"#;
        let config: BridgeConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.panel.base(), "https://panel.example");
        assert_eq!(config.panel.oauth.token_endpoint, "/oauth2/token");
        assert_eq!(config.stream.max_attempts, 10);
        assert_eq!(config.actions.cooldown(ActionKind::Start).as_secs(), 10);
    }

    #[test]
    fn test_thread_name_format() {
        let chat = ChatConfig::default();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(chat.thread_name(date), "console-2026-03-14");
    }

    #[test]
    fn test_timezone_fallback_to_utc() {
        let logs = LogSyncConfig {
            utc_offset_minutes: 100_000,
            ..LogSyncConfig::default()
        };
        assert_eq!(logs.timezone().local_minus_utc(), 0);

        let jst = LogSyncConfig::default();
        assert_eq!(jst.timezone().local_minus_utc(), 9 * 3600);
    }
}
