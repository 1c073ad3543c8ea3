//! Exponential backoff schedule for reconnect attempts.

use std::time::Duration;

use rand::Rng;

/// Nominal delay before reconnect attempt `attempt` (1-based):
/// `base * 2^(attempt-1)`, capped at `cap`.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let delay = base.saturating_mul(1_u32.checked_shl(exponent).unwrap_or(u32::MAX));
    delay.min(cap)
}

/// Spread a nominal delay over `[delay/2, delay]` so simultaneous
/// reconnecting clients do not stampede the panel.
#[must_use]
pub fn with_jitter(delay: Duration, rng: &mut impl Rng) -> Duration {
    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return delay;
    }
    Duration::from_millis(rng.random_range(millis / 2..=millis))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    const BASE: Duration = Duration::from_secs(1);
    const CAP: Duration = Duration::from_secs(30);

    #[test]
    fn test_schedule_doubles_then_caps() {
        assert_eq!(backoff_delay(1, BASE, CAP), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, BASE, CAP), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, BASE, CAP), Duration::from_secs(4));
        assert_eq!(backoff_delay(5, BASE, CAP), Duration::from_secs(16));
        assert_eq!(backoff_delay(6, BASE, CAP), Duration::from_secs(30));
        assert_eq!(backoff_delay(100, BASE, CAP), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..=10 {
            let nominal = backoff_delay(attempt, BASE, CAP);
            let jittered = with_jitter(nominal, &mut rng);
            assert!(jittered >= nominal / 2, "attempt {attempt}");
            assert!(jittered <= nominal, "attempt {attempt}");
        }
    }

    #[test]
    fn test_zero_delay_passthrough() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            with_jitter(Duration::ZERO, &mut rng),
            Duration::ZERO
        );
    }
}
