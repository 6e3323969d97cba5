//! Per-user admission control.
//!
//! Each user gets a [`UserLimit`] entry tracking a fixed 60s counting window.
//! Going over the threshold inside one window blocks the user for the block
//! duration; idle entries are purged by a background sweep.
//!
//! All reads and writes of the map go through one `RwLock`. The admit-and-mutate
//! sequence in [`RateLimiter::allow`] holds the write lock for its whole
//! duration, diagnostics use the read lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::domain::traits::AdmissionPolicy;
use crate::infrastructure::config::RateLimitConfig;

/// Time source for the limiter, swappable so tests can move time by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.base + *offset
    }
}

/// Admission state for a single user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserLimit {
    pub last_request: Instant,
    pub count: u32,
    pub blocked: bool,
    /// Meaningful only while `blocked`
    pub blocked_at: Option<Instant>,
}

type LimitMap = HashMap<i64, UserLimit>;

/// Thread-safe per-user rate limiter
pub struct RateLimiter {
    limits: Arc<RwLock<LimitMap>>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits: Arc::new(RwLock::new(HashMap::new())),
            config,
            clock,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Check whether `user_id` may make a request now, recording the attempt.
    pub fn allow(&self, user_id: i64) -> bool {
        let mut limits = self.limits.write().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        let Some(limit) = limits.get_mut(&user_id) else {
            limits.insert(
                user_id,
                UserLimit {
                    last_request: now,
                    count: 1,
                    blocked: false,
                    blocked_at: None,
                },
            );
            return true;
        };

        if limit.blocked {
            let blocked_for = limit
                .blocked_at
                .map(|at| now.saturating_duration_since(at))
                .unwrap_or(Duration::MAX);
            if blocked_for > self.config.block_duration() {
                limit.blocked = false;
                limit.blocked_at = None;
                limit.count = 0;
                debug!(user_id, "Rate limit block expired");
            } else {
                return false;
            }
        }

        if now.saturating_duration_since(limit.last_request) > self.config.window() {
            limit.count = 0;
            limit.last_request = now;
        }

        limit.count += 1;
        limit.last_request = now;

        if limit.count > self.config.max_requests {
            limit.blocked = true;
            limit.blocked_at = Some(now);
            info!(
                user_id,
                count = limit.count,
                block_seconds = self.config.block_seconds,
                "User blocked by rate limiter"
            );
            return false;
        }

        true
    }

    /// Copy of the current entry for `user_id`, if any
    pub fn get_user_limit(&self, user_id: i64) -> Option<UserLimit> {
        let limits = self.limits.read().unwrap_or_else(PoisonError::into_inner);
        limits.get(&user_id).copied()
    }

    /// Number of users currently tracked
    pub fn tracked_users(&self) -> usize {
        self.limits.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop entries idle for longer than the retention horizon. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        sweep(&self.limits, self.clock.as_ref(), self.config.retention())
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    ///
    /// Calling this more than once, or after [`stop`](Self::stop), is a no-op.
    pub fn start_sweeper(&self) {
        if self.cancel.is_cancelled() || !self.tasks.is_empty() {
            return;
        }

        let limits = self.limits.clone();
        let clock = self.clock.clone();
        let retention = self.config.retention();
        let period = self.config.sweep_interval();
        let cancel = self.cancel.clone();

        self.tasks.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Rate limiter sweep received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = sweep(&limits, clock.as_ref(), retention);
                        if removed > 0 {
                            debug!(removed, "Rate limiter sweep purged idle entries");
                        }
                    }
                }
            }
        });
    }

    /// Signal the sweep task to stop. Safe to call repeatedly.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.tasks.close();
    }

    /// Stop the sweep and wait for it to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.tasks.wait().await;
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl AdmissionPolicy for RateLimiter {
    fn allow(&self, user_id: i64) -> bool {
        RateLimiter::allow(self, user_id)
    }
}

fn sweep(limits: &RwLock<LimitMap>, clock: &dyn Clock, retention: Duration) -> usize {
    let mut limits = limits.write().unwrap_or_else(PoisonError::into_inner);
    let now = clock.now();
    let before = limits.len();
    limits.retain(|_, limit| now.saturating_duration_since(limit.last_request) <= retention);
    before - limits.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(RateLimitConfig::default(), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_admits_twenty_then_blocks() {
        let (limiter, _clock) = limiter();

        for i in 1..=20 {
            assert!(limiter.allow(1), "call {} should be admitted", i);
        }
        assert!(!limiter.allow(1));

        let entry = limiter.get_user_limit(1).unwrap();
        assert!(entry.blocked);
        assert_eq!(entry.count, 21);
    }

    #[test]
    fn test_blocked_user_stays_blocked_until_expiry() {
        let (limiter, clock) = limiter();
        for _ in 0..21 {
            limiter.allow(1);
        }

        clock.advance(Duration::from_secs(9 * 60));
        assert!(!limiter.allow(1));

        clock.advance(Duration::from_secs(61));
        assert!(limiter.allow(1));
        let entry = limiter.get_user_limit(1).unwrap();
        assert!(!entry.blocked);
        assert_eq!(entry.count, 1);
    }

    #[test]
    fn test_exactly_block_duration_is_still_blocked() {
        let (limiter, clock) = limiter();
        for _ in 0..21 {
            limiter.allow(1);
        }
        clock.advance(Duration::from_secs(600));
        assert!(!limiter.allow(1));
    }

    #[test]
    fn test_window_resets_without_block() {
        let (limiter, clock) = limiter();
        for _ in 0..5 {
            assert!(limiter.allow(1));
            clock.advance(Duration::from_secs(61));
        }
        let entry = limiter.get_user_limit(1).unwrap();
        assert!(!entry.blocked);
        assert_eq!(entry.count, 1);
    }

    #[test]
    fn test_users_are_independent() {
        let (limiter, _clock) = limiter();
        for i in 0..30 {
            limiter.allow(1);
            if i < 20 {
                assert!(limiter.allow(2), "user 2 rejected on call {}", i + 1);
            }
        }
        assert!(limiter.get_user_limit(1).unwrap().blocked);
        assert!(!limiter.get_user_limit(2).unwrap().blocked);
    }

    #[test]
    fn test_cleanup_purges_idle_entries() {
        let (limiter, clock) = limiter();
        for _ in 0..10 {
            limiter.allow(1);
        }
        clock.advance(Duration::from_secs(30 * 60));
        limiter.allow(2);

        clock.advance(Duration::from_secs(31 * 60));
        assert_eq!(limiter.cleanup(), 1);
        assert!(limiter.get_user_limit(1).is_none());
        assert!(limiter.get_user_limit(2).is_some());

        assert!(limiter.allow(1));
        assert_eq!(limiter.get_user_limit(1).unwrap().count, 1);
    }

    #[test]
    fn test_concurrent_allow_counts_every_call() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests: 1000,
            ..RateLimitConfig::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        limiter.allow(9);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(limiter.get_user_limit(9).unwrap().count, 400);
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_stops() {
        let clock = Arc::new(ManualClock::new());
        let config = RateLimitConfig {
            sweep_interval_seconds: 1,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::with_clock(config, clock.clone());
        limiter.allow(5);
        clock.advance(Duration::from_secs(2 * 3600));

        limiter.start_sweeper();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(limiter.tracked_users(), 0);

        limiter.shutdown().await;
        limiter.stop();
        assert!(limiter.allow(5));
    }
}
