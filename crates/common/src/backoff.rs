use rand::Rng;
use std::time::Duration;

use crate::config::ReconnectPolicy;

/// Delay schedule between reconnection attempts.
///
/// `delay(n) = min(max_delay, initial * 2^n)` widened by `±jitter` of itself.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy: ReconnectPolicy {
                jitter: policy.jitter.clamp(0.0, 1.0),
                ..policy
            },
            attempt: 0,
        }
    }

    /// Delay to wait before the next attempt. Advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let base = self
            .policy
            .initial_delay
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.policy.max_delay);

        let spread = base.as_secs_f64() * self.policy.jitter;
        let offset = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };

        self.attempt = self.attempt.saturating_add(1);
        Duration::from_secs_f64((base.as_secs_f64() + offset).max(0.0))
    }

    /// Forget past failures after a connection has proven stable.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the configured attempt budget is used up. `None` budget never exhausts.
    pub fn exhausted(&self) -> bool {
        self.policy
            .max_attempts
            .is_some_and(|max| self.attempt >= max)
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial: u64, max: u64, jitter: f64) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(initial),
            max_delay: Duration::from_millis(max),
            jitter,
            max_attempts: None,
        }
    }

    #[test]
    fn test_doubles_until_cap() {
        let mut backoff = ReconnectBackoff::new(policy(500, 3_000, 0.0));

        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![500, 1_000, 2_000, 3_000, 3_000]);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = ReconnectBackoff::new(policy(100, 10_000, 0.0));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let mut backoff = ReconnectBackoff::new(policy(10_000, 60_000, 0.25));
        let secs = backoff.next_delay().as_secs_f64();
        assert!((7.5..=12.5).contains(&secs), "delay was {}", secs);
    }

    #[test]
    fn test_out_of_range_jitter_is_clamped() {
        let mut backoff = ReconnectBackoff::new(policy(1_000, 60_000, -3.0));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_attempt_budget() {
        let mut backoff = ReconnectBackoff::new(ReconnectPolicy {
            max_attempts: Some(2),
            ..policy(1, 10, 0.0)
        });
        assert!(!backoff.exhausted());
        backoff.next_delay();
        backoff.next_delay();
        assert!(backoff.exhausted());
    }
}
