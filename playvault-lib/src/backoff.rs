//! Per-platform retry backoff after fetch failures.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use playvault_core::{FetchError, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure; doubles on each consecutive one.
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max: Duration::from_secs(3600),
        }
    }
}

impl BackoffPolicy {
    /// Delay after `failures` consecutive failures (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(20);
        self.base.saturating_mul(1u32 << shift).min(self.max)
    }
}

#[derive(Debug, Clone, Copy)]
struct PlatformBackoff {
    failures: u32,
    retry_at: Instant,
}

/// Tracks which platforms are cooling down.
#[derive(Debug, Default)]
pub struct Backoff {
    policy: BackoffPolicy,
    platforms: BTreeMap<Platform, PlatformBackoff>,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            platforms: BTreeMap::new(),
        }
    }

    /// Time left before `platform` may be fetched again, if any.
    pub fn remaining(&self, platform: Platform, now: Instant) -> Option<Duration> {
        let state = self.platforms.get(&platform)?;
        let left = state.retry_at.saturating_duration_since(now);
        (!left.is_zero()).then_some(left)
    }

    /// Record a failure and return the delay before the next attempt.
    ///
    /// A server-supplied `retry_after` longer than the computed delay wins.
    pub fn record_failure(&mut self, error: &FetchError, now: Instant) -> Duration {
        let platform = error.platform();
        let failures = self
            .platforms
            .get(&platform)
            .map_or(1, |s| s.failures.saturating_add(1));
        let mut delay = self.policy.delay_for(failures);
        if let Some(after) = error.retry_after() {
            delay = delay.max(after);
        }
        self.platforms.insert(
            platform,
            PlatformBackoff {
                failures,
                retry_at: now + delay,
            },
        );
        log::debug!(
            "{}: failure #{}, next attempt in {}s",
            platform.short_name(),
            failures,
            delay.as_secs()
        );
        delay
    }

    pub fn record_success(&mut self, platform: Platform) {
        self.platforms.remove(&platform);
    }

    pub fn failures(&self, platform: Platform) -> u32 {
        self.platforms.get(&platform).map_or(0, |s| s.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(10),
            max: Duration::from_secs(60),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for(4), Duration::from_secs(60));
        assert_eq!(policy.delay_for(100), Duration::from_secs(60));
    }

    #[test]
    fn retry_after_extends_delay() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        let now = Instant::now();
        let err = FetchError::RateLimited {
            platform: Platform::Steam,
            retry_after: Some(Duration::from_secs(600)),
        };
        assert_eq!(backoff.record_failure(&err, now), Duration::from_secs(600));
        assert!(backoff.remaining(Platform::Steam, now).is_some());
        assert!(backoff.remaining(Platform::Epic, now).is_none());
        assert!(
            backoff
                .remaining(Platform::Steam, now + Duration::from_secs(601))
                .is_none()
        );
    }

    #[test]
    fn success_clears_state() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        let now = Instant::now();
        backoff.record_failure(&FetchError::AuthExpired { platform: Platform::Gog }, now);
        backoff.record_failure(&FetchError::AuthExpired { platform: Platform::Gog }, now);
        assert_eq!(backoff.failures(Platform::Gog), 2);
        backoff.record_success(Platform::Gog);
        assert_eq!(backoff.failures(Platform::Gog), 0);
        assert!(backoff.remaining(Platform::Gog, now).is_none());
    }
}
