//! Reconnect policy for DevTools sessions.

use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Exponential backoff with proportional jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    /// Upper bound for any single delay, jitter included.
    pub max_delay: Duration,
    /// Attempts before giving up (0 = infinite).
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }

    /// Delay before 1-based `attempt`: the base doubled per attempt, plus up
    /// to a tenth of that as jitter, never above `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        let spread = backoff.as_millis() as u64 / 10;
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        (backoff + Duration::from_millis(jitter)).min(self.max_delay)
    }

    /// Wait out the delay for `attempt`. Returns `false` if `token` fired first.
    pub async fn wait(&self, attempt: u32, token: &CancellationToken) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.delay(attempt)) => true,
            () = token.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_with_bounded_jitter() {
        let policy = ReconnectPolicy::default();
        for _ in 0..50 {
            let first = policy.delay(1).as_millis();
            let third = policy.delay(3).as_millis();
            assert!((1000..=1100).contains(&first), "first={first}");
            assert!((4000..=4400).contains(&third), "third={third}");
        }
    }

    #[test]
    fn test_delay_never_exceeds_cap() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3000),
            max_attempts: 0,
        };
        for attempt in [4, 5, 12, 40, u32::MAX] {
            assert_eq!(policy.delay(attempt), Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_exhausted() {
        let unlimited = ReconnectPolicy::default();
        assert!(!unlimited.exhausted(1_000));

        let limited = ReconnectPolicy {
            max_attempts: 3,
            ..ReconnectPolicy::default()
        };
        assert!(!limited.exhausted(2));
        assert!(limited.exhausted(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_stops_on_cancel() {
        let policy = ReconnectPolicy::default();
        let token = CancellationToken::new();
        assert!(policy.wait(1, &token).await);

        token.cancel();
        assert!(!policy.wait(10, &token).await);
    }
}
