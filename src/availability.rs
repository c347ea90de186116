//! Cached, lazily refreshed answer to "is the OCR tool usable right now?".
//!
//! The check command runs on whichever caller first observes a stale value.
//! There is no background thread. Concurrent callers that cross the TTL
//! boundary together may each run the check; the state is replaced whole
//! under a mutex, so readers never see a torn `available`/`last_checked` pair.

use crate::command::{CommandRunner, CommandTemplate, Substitution};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityState {
    pub available: bool,
    /// `None` until the first check completes; always considered stale.
    pub last_checked: Option<Instant>,
}

impl AvailabilityState {
    /// Optimistic seed so pipeline startup never waits on the tool.
    pub fn seed() -> Self {
        Self {
            available: true,
            last_checked: None,
        }
    }

    fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        match self.last_checked {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= ttl,
        }
    }
}

pub struct AvailabilityMonitor<R: CommandRunner, C: Clock = SystemClock> {
    check: CommandTemplate,
    runner: R,
    clock: C,
    ttl: Duration,
    state: Mutex<AvailabilityState>,
}

impl<R: CommandRunner> AvailabilityMonitor<R, SystemClock> {
    pub fn new(check: CommandTemplate, runner: R, ttl: Duration) -> Self {
        Self::with_clock(check, runner, ttl, SystemClock)
    }
}

impl<R: CommandRunner, C: Clock> AvailabilityMonitor<R, C> {
    pub fn with_clock(check: CommandTemplate, runner: R, ttl: Duration, clock: C) -> Self {
        Self {
            check,
            runner,
            clock,
            ttl,
            state: Mutex::new(AvailabilityState::seed()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn check_command(&self) -> &CommandTemplate {
        &self.check
    }

    fn lock(&self) -> MutexGuard<'_, AvailabilityState> {
        // The guarded value is a plain Copy pair; a panic elsewhere can't
        // leave it half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> AvailabilityState {
        *self.lock()
    }

    /// Returns the cached value, refreshing first if it is older than the TTL.
    pub fn is_available(&self) -> bool {
        let current = self.snapshot();
        if current.is_stale(self.clock.now(), self.ttl) {
            return self.refresh();
        }
        current.available
    }

    /// Runs the check command now and records its outcome. Never fails:
    /// launch errors and timeouts count as unavailable.
    pub fn refresh(&self) -> bool {
        debug!("testing availability: {}", self.check);
        let available = match self.runner.run(&self.check, &Substitution::empty(), None) {
            Ok(result) => {
                if !result.success() {
                    debug!("check command reported {}", result);
                }
                result.success()
            }
            Err(err) => {
                warn!(
                    "check command [{}] failed: {}. Registering transform as unavailable for the next {} seconds",
                    self.check,
                    err,
                    self.ttl.as_secs()
                );
                false
            }
        };

        let now = self.clock.now();
        let mut state = self.lock();
        if matches!(state.last_checked, Some(prev) if prev > now) {
            // A check that completed later has already been recorded.
            debug!("discarding outdated check result: {}", available);
            return state.available;
        }
        *state = AvailabilityState {
            available,
            last_checked: Some(now),
        };
        drop(state);

        info!("is OCR tool available? {}", available);
        available
    }
}
