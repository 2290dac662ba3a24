//! Reconnect backoff.
//!
//! - [`ReconnectPolicy`]: base delay and attempt cap
//! - [`ReconnectState`]: the attempt counter a supervisor consults after each drop
//!
//! The delay before reconnect attempt `n` (1-based) is `base_delay * 2^(n-1)`.
//! The counter resets on every successful connect; once `max_attempts`
//! reconnects have failed in a row, [`ReconnectState::next_attempt`] returns
//! `None` and the caller gives up.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default number of consecutive reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Parameters for socket reconnects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt, in ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Consecutive failed reconnects allowed before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before 1-based reconnect `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exponent))
    }
}

/// Scheduled reconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// How long to wait before trying.
    pub delay: Duration,
}

/// Consecutive-failure counter driven by a connection supervisor.
#[derive(Clone, Debug)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectState {
    /// Fresh counter.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Reconnects attempted since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// A connection opened; start counting from zero again.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Schedule the next reconnect, or `None` once the cap is reached.
    pub fn next_attempt(&mut self) -> Option<Attempt> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(Attempt {
            number: self.attempts,
            delay: self.policy.delay_for(self.attempts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_delay_ms: u64, max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms,
            max_attempts,
        }
    }

    #[test]
    fn delay_doubles_from_base() {
        let p = policy(1000, 5);
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(2000));
        assert_eq!(p.delay_for(3), Duration::from_millis(4000));
        assert_eq!(p.delay_for(5), Duration::from_millis(16_000));
    }

    #[test]
    fn delay_for_zero_is_base() {
        assert_eq!(policy(250, 3).delay_for(0), Duration::from_millis(250));
    }

    #[test]
    fn delay_saturates() {
        let p = policy(u64::MAX / 2, 5);
        assert_eq!(p.delay_for(64), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut state = ReconnectState::new(policy(100, 3));
        let delays: Vec<u64> = std::iter::from_fn(|| state.next_attempt())
            .map(|a| u64::try_from(a.delay.as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![100, 200, 400]);
        assert_eq!(state.attempts(), 3);
        assert!(state.next_attempt().is_none());
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut state = ReconnectState::new(policy(100, 2));
        let _ = state.next_attempt();
        let _ = state.next_attempt();
        assert!(state.next_attempt().is_none());

        state.reset();
        assert_eq!(state.attempts(), 0);
        let attempt = state.next_attempt().unwrap();
        assert_eq!(attempt.number, 1);
        assert_eq!(attempt.delay, Duration::from_millis(100));
    }

    #[test]
    fn zero_max_attempts_never_reconnects() {
        let mut state = ReconnectState::new(policy(100, 0));
        assert!(state.next_attempt().is_none());
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let p: ReconnectPolicy = serde_json::from_str(r#"{"maxAttempts": 2}"#).unwrap();
        assert_eq!(p.max_attempts, 2);
        assert_eq!(p.base_delay_ms, DEFAULT_BASE_DELAY_MS);
    }
}
