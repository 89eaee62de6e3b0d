// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest backoff between two attempts.
pub const MIN_BACKOFF: Duration = Duration::from_millis(50);

/// Bounded exponential backoff for restarting whole transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: MIN_BACKOFF,
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy performing `max_attempts` attempts with default delays.
    #[must_use]
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
        .normalized()
    }

    /// Clamps the policy into a usable shape.
    ///
    /// At least one attempt is made, the initial delay is at least
    /// [`MIN_BACKOFF`], and the cap is never below the initial delay.
    #[must_use]
    pub fn normalized(self) -> Self {
        let initial_backoff: Duration = self.initial_backoff.max(MIN_BACKOFF);
        Self {
            max_attempts: self.max_attempts.max(1),
            initial_backoff,
            max_backoff: self.max_backoff.max(initial_backoff),
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Doubles per attempt starting from `initial_backoff`, capped at
    /// `max_backoff`.
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let policy: Self = self.normalized();
        let exponent: u32 = attempt.saturating_sub(1).min(31);
        policy
            .initial_backoff
            .checked_mul(1_u32 << exponent)
            .map_or(policy.max_backoff, |delay| delay.min(policy.max_backoff))
    }

    /// Whether another attempt is allowed after `attempt` attempts failed.
    #[must_use]
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.normalized().max_attempts
    }
}
