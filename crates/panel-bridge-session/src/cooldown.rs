//! Per-user, per-action cooldown enforcement.

use std::time::Duration;

use chrono::{DateTime, Utc};
use panel_bridge_core::SessionState;
use panel_bridge_core::config::ActionConfig;
use panel_bridge_core::types::{ActionKind, UserId};

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied { remaining: Duration },
}

/// Cooldown policy over the windows stored in `SessionState`.
///
/// `check` drops expired windows as it reads but never resets a live one;
/// callers call `record` only after the gated action was actually
/// dispatched, so a denied attempt never extends the window.
/// Serialization of same-key races is the controller's state lock.
pub struct CooldownGate {
    config: ActionConfig,
}

impl CooldownGate {
    /// Create a gate with the configured per-action durations.
    #[must_use]
    pub const fn new(config: ActionConfig) -> Self {
        Self { config }
    }

    /// Whether `user` may perform `action` at `now`.
    ///
    /// Entries whose windows have passed are pruned before the lookup, so
    /// stale windows never outlive the next read.
    pub fn check(
        &self,
        state: &mut SessionState,
        user: &UserId,
        action: ActionKind,
        now: DateTime<Utc>,
    ) -> Verdict {
        state.prune_cooldowns(now);
        match state.cooldown_until(user, action) {
            Some(until) => Verdict::Denied {
                remaining: (until - now).to_std().unwrap_or_default(),
            },
            None => Verdict::Allowed,
        }
    }

    /// Open a new cooldown window after a successful dispatch.
    pub fn record(
        &self,
        state: &mut SessionState,
        user: &UserId,
        action: ActionKind,
        now: DateTime<Utc>,
    ) {
        state.prune_cooldowns(now);
        let duration =
            chrono::Duration::from_std(self.config.cooldown(action)).unwrap_or_default();
        state.set_cooldown(user.clone(), action, now + duration);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn gate() -> CooldownGate {
        // Default config: 10s for every action kind.
        CooldownGate::new(ActionConfig::default())
    }

    #[test]
    fn test_unknown_key_is_allowed() {
        let mut state = SessionState::default();
        let verdict = gate().check(&mut state, &UserId::new("alice"), ActionKind::Start, t(0));
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn test_window_denies_until_exact_expiry() {
        let gate = gate();
        let mut state = SessionState::default();
        let alice = UserId::new("alice");

        gate.record(&mut state, &alice, ActionKind::Start, t(100));

        // Inside [T, T+D): denied with remaining = T+D - now.
        assert_eq!(
            gate.check(&mut state, &alice, ActionKind::Start, t(100)),
            Verdict::Denied {
                remaining: Duration::from_secs(10)
            }
        );
        assert_eq!(
            gate.check(&mut state, &alice, ActionKind::Start, t(107)),
            Verdict::Denied {
                remaining: Duration::from_secs(3)
            }
        );
        // At exactly T+D: allowed.
        assert_eq!(
            gate.check(&mut state, &alice, ActionKind::Start, t(110)),
            Verdict::Allowed
        );
    }

    #[test]
    fn test_denied_check_does_not_reset_window() {
        let gate = gate();
        let mut state = SessionState::default();
        let alice = UserId::new("alice");

        gate.record(&mut state, &alice, ActionKind::Stop, t(100));
        let before = state.clone();

        let _ = gate.check(&mut state, &alice, ActionKind::Stop, t(105));
        assert_eq!(state, before);
    }

    #[test]
    fn test_check_prunes_expired_entries() {
        let gate = gate();
        let mut state = SessionState::default();

        gate.record(&mut state, &UserId::new("alice"), ActionKind::Start, t(100));
        assert_eq!(state.cooldowns.len(), 1);

        // Any read past expiry drops the stale entry, even for another key.
        let verdict = gate.check(&mut state, &UserId::new("bob"), ActionKind::Stop, t(200));
        assert_eq!(verdict, Verdict::Allowed);
        assert!(state.cooldowns.is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let gate = gate();
        let mut state = SessionState::default();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        gate.record(&mut state, &alice, ActionKind::Start, t(100));

        assert_eq!(
            gate.check(&mut state, &bob, ActionKind::Start, t(101)),
            Verdict::Allowed
        );
        assert_eq!(
            gate.check(&mut state, &alice, ActionKind::Stop, t(101)),
            Verdict::Allowed
        );
    }

    #[test]
    fn test_record_prunes_expired_entries() {
        let gate = gate();
        let mut state = SessionState::default();

        gate.record(&mut state, &UserId::new("old"), ActionKind::Start, t(0));
        gate.record(&mut state, &UserId::new("new"), ActionKind::Start, t(1_000));

        assert_eq!(state.cooldowns.len(), 1);
        assert_eq!(state.cooldowns[0].user, UserId::new("new"));
    }
}
