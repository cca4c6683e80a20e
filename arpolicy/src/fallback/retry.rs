//! Sliding-window retry budget.
//!
//! Each [`FailureKind`] gets its own window, so a run of transient network
//! failures cannot use up the retries for an unrelated rendering failure.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::failure::FailureKind;

// =============================================================================
// Recovery Constants
// =============================================================================

/// Default number of recovery attempts allowed per kind within the window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default sliding window for counting recovery attempts (30 seconds).
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(30);

/// Default backoff delays for the first, second and third attempt.
pub const DEFAULT_BACKOFF_SECS: [u64; 3] = [1, 3, 8];

/// Default number of failure events kept for diagnostics.
pub const DEFAULT_HISTORY_SIZE: usize = 32;

/// Tunables for automatic recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Attempts allowed per failure kind within `window`.
    pub max_attempts: u32,
    pub window: Duration,
    /// Delay before attempt `n` is `backoff[n - 1]`; the last entry repeats.
    pub backoff: Vec<Duration>,
    /// Capacity of the recent-failure ring.
    pub history_size: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_RETRY_WINDOW,
            backoff: DEFAULT_BACKOFF_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.window.is_zero() {
            return Err("retry window must be positive".to_string());
        }
        if self.max_attempts > 0 && self.backoff.is_empty() {
            return Err("backoff must list at least one delay".to_string());
        }
        Ok(())
    }

    /// Backoff before the 1-based `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let index = (attempt.max(1) as usize - 1).min(self.backoff.len().saturating_sub(1));
        self.backoff.get(index).copied().unwrap_or(Duration::ZERO)
    }
}

/// A granted recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryGrant {
    /// 1-based attempt number within the current window.
    pub attempt: u32,
    pub delay: Duration,
}

/// Per-kind record of recent recovery attempts.
#[derive(Debug)]
pub struct RetryBudget {
    config: RecoveryConfig,
    attempts: HashMap<FailureKind, VecDeque<Instant>>,
}

impl RetryBudget {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            attempts: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Consume one attempt for `kind` at `now`, if the window allows it.
    pub fn try_acquire(&mut self, kind: FailureKind, now: Instant) -> Option<RetryGrant> {
        let window = self.config.window;
        let attempts = self.attempts.entry(kind).or_default();
        while let Some(oldest) = attempts.front() {
            if now.saturating_duration_since(*oldest) >= window {
                attempts.pop_front();
            } else {
                break;
            }
        }

        if attempts.len() >= self.config.max_attempts as usize {
            return None;
        }
        attempts.push_back(now);
        let attempt = attempts.len() as u32;
        Some(RetryGrant {
            attempt,
            delay: self.config.delay_for_attempt(attempt),
        })
    }

    /// Attempts counted in the window ending at `now`.
    pub fn attempts_in_window(&self, kind: FailureKind, now: Instant) -> usize {
        self.attempts.get(&kind).map_or(0, |attempts| {
            attempts
                .iter()
                .filter(|at| now.saturating_duration_since(**at) < self.config.window)
                .count()
        })
    }

    /// Forget every recorded attempt.
    pub fn reset(&mut self) {
        self.attempts.clear();
    }
}
