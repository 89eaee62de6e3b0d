// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use num_traits::ToPrimitive;
use regroup_domain::CounterKey;

use super::SequenceCounter;
use crate::error::PersistenceError;

/// One increment observed by a [`MemorySequenceCounter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterReservation {
    pub key: String,
    pub delta: u64,
    /// Counter total after the increment.
    pub end: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, i64>,
    reservations: Vec<CounterReservation>,
}

/// Process-local counter that records every increment.
#[derive(Debug, Default)]
pub struct MemorySequenceCounter {
    state: Mutex<MemoryState>,
}

impl MemorySequenceCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `key` at `value` instead of 0.
    #[must_use]
    pub fn with_value(self, key: &CounterKey, value: i64) -> Self {
        self.lock().values.insert(key.to_string(), value);
        self
    }

    /// Current total for `key`; 0 if it was never incremented.
    #[must_use]
    pub fn value(&self, key: &CounterKey) -> i64 {
        self.lock().values.get(key.as_str()).copied().unwrap_or(0)
    }

    /// Every increment so far, in order.
    #[must_use]
    pub fn reservations(&self) -> Vec<CounterReservation> {
        self.lock().reservations.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SequenceCounter for MemorySequenceCounter {
    fn increment_by(&self, key: &CounterKey, delta: u64) -> Result<i64, PersistenceError> {
        let overflow = || PersistenceError::CounterFailed {
            key: key.to_string(),
            message: format!("increment by {delta} overflows the counter"),
        };
        let delta_i64: i64 = delta.to_i64().ok_or_else(overflow)?;

        let mut state = self.lock();
        let current: i64 = state.values.get(key.as_str()).copied().unwrap_or(0);
        let end: i64 = current.checked_add(delta_i64).ok_or_else(overflow)?;
        state.values.insert(key.to_string(), end);
        state.reservations.push(CounterReservation {
            key: key.to_string(),
            delta,
            end,
        });
        Ok(end)
    }
}
