//! Durable session state record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActionKind, MessageRef, ServerStatus, ThreadRef, UserId};

/// One cooldown window: `user` may not repeat `action` until `until`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub user: UserId,
    pub action: ActionKind,
    pub until: DateTime<Utc>,
}

/// The singleton persisted record for one bridge deployment.
///
/// Loaded once at process start (absent file means all defaults), mutated
/// in place under the controller's lock, and flushed after every mutation
/// that must survive a crash.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Dashboard message created by the setup command; written once,
    /// cleared only on explicit reset.
    #[serde(default)]
    pub dashboard_message: Option<MessageRef>,

    /// Current log thread. Non-`None` iff log sync is enabled.
    #[serde(default)]
    pub active_thread: Option<ThreadRef>,

    /// Calendar date the active thread was created for, in the deployment's
    /// configured offset. Staleness triggers rotation.
    #[serde(default)]
    pub active_thread_date: Option<NaiveDate>,

    /// Per (user, action) cooldown windows; lazily pruned on read.
    #[serde(default)]
    pub cooldowns: Vec<CooldownEntry>,

    /// Last observed status of the managed process.
    #[serde(default)]
    pub server_status: ServerStatus,
}

impl SessionState {
    /// Whether log sync is currently enabled.
    #[must_use]
    pub const fn sync_enabled(&self) -> bool {
        self.active_thread.is_some()
    }

    /// Expiry of the cooldown window for `(user, action)`, if one is live.
    ///
    /// Absence means the action is permitted now.
    #[must_use]
    pub fn cooldown_until(&self, user: &UserId, action: ActionKind) -> Option<DateTime<Utc>> {
        self.cooldowns
            .iter()
            .find(|e| e.action == action && e.user == *user)
            .map(|e| e.until)
    }

    /// Replace (or insert) the cooldown window for `(user, action)`.
    pub fn set_cooldown(&mut self, user: UserId, action: ActionKind, until: DateTime<Utc>) {
        if let Some(entry) = self
            .cooldowns
            .iter_mut()
            .find(|e| e.action == action && e.user == user)
        {
            entry.until = until;
        } else {
            self.cooldowns.push(CooldownEntry {
                user,
                action,
                until,
            });
        }
    }

    /// Drop every cooldown entry whose window has already passed.
    pub fn prune_cooldowns(&mut self, now: DateTime<Utc>) {
        self.cooldowns.retain(|e| e.until > now);
    }

    /// Record the newly enabled (or rotated) log thread.
    pub fn set_active_thread(&mut self, thread: ThreadRef, date: NaiveDate) {
        self.active_thread = Some(thread);
        self.active_thread_date = Some(date);
    }

    /// Clear the log thread fields when sync turns off.
    ///
    /// The platform thread itself is left intact for archival.
    pub fn clear_active_thread(&mut self) {
        self.active_thread = None;
        self.active_thread_date = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_state_round_trip() {
        let mut state = SessionState {
            dashboard_message: Some(MessageRef::new("msg-1")),
            server_status: ServerStatus::Running,
            ..SessionState::default()
        };
        state.set_active_thread(
            ThreadRef::new("thread-9"),
            NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        );
        state.set_cooldown(UserId::new("alice"), ActionKind::Start, t(1_000));
        state.set_cooldown(UserId::new("bob"), ActionKind::LogsToggle, t(2_000));

        let json = serde_json::to_string(&state).unwrap();
        let loaded: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_defaults_from_empty_record() {
        let loaded: SessionState = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded, SessionState::default());
        assert!(!loaded.sync_enabled());
        assert_eq!(loaded.server_status, ServerStatus::Unknown);
    }

    #[test]
    fn test_set_cooldown_replaces_same_key() {
        let mut state = SessionState::default();
        let alice = UserId::new("alice");
        state.set_cooldown(alice.clone(), ActionKind::Stop, t(100));
        state.set_cooldown(alice.clone(), ActionKind::Stop, t(200));

        assert_eq!(state.cooldowns.len(), 1);
        assert_eq!(state.cooldown_until(&alice, ActionKind::Stop), Some(t(200)));
    }

    #[test]
    fn test_cooldowns_keyed_per_user_and_action() {
        let mut state = SessionState::default();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        state.set_cooldown(alice.clone(), ActionKind::Start, t(100));
        state.set_cooldown(bob.clone(), ActionKind::Start, t(300));

        assert_eq!(state.cooldown_until(&alice, ActionKind::Start), Some(t(100)));
        assert_eq!(state.cooldown_until(&bob, ActionKind::Start), Some(t(300)));
        assert_eq!(state.cooldown_until(&alice, ActionKind::Stop), None);
    }

    #[test]
    fn test_prune_drops_only_expired() {
        let mut state = SessionState::default();
        state.set_cooldown(UserId::new("a"), ActionKind::Start, t(100));
        state.set_cooldown(UserId::new("b"), ActionKind::Stop, t(300));

        state.prune_cooldowns(t(200));

        assert_eq!(state.cooldowns.len(), 1);
        assert_eq!(
            state.cooldown_until(&UserId::new("b"), ActionKind::Stop),
            Some(t(300))
        );
    }

    #[test]
    fn test_clear_active_thread() {
        let mut state = SessionState::default();
        state.set_active_thread(
            ThreadRef::new("t"),
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        );
        assert!(state.sync_enabled());

        state.clear_active_thread();
        assert!(!state.sync_enabled());
        assert_eq!(state.active_thread_date, None);
    }
}
