// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Version range reservations against an external atomic counter.
//!
//! A reservation is a single "increment by `count`" on a named counter.
//! The counter returns its new total `end`, and the caller owns the
//! versions `end - count + 1 ..= end`. Because the increment is atomic on
//! the counter's side, concurrent reservations for the same key never
//! overlap, whichever process makes them.

mod database;
mod memory;

pub use database::DbSequenceCounter;
pub use memory::{CounterReservation, MemorySequenceCounter};

use regroup_domain::{CounterKey, VersionRange};
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::tx::Cancellation;

/// An atomic, durable, named counter.
pub trait SequenceCounter: Send + Sync {
    /// Adds `delta` to the counter named `key` (starting from 0 if absent)
    /// and returns the new total.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::CounterFailed`] if the counter cannot be
    /// incremented. Callers treat this as fatal.
    fn increment_by(&self, key: &CounterKey, delta: u64) -> Result<i64, PersistenceError>;
}

/// Reserves contiguous version ranges from a [`SequenceCounter`].
pub struct VersionAllocator<'a> {
    counter: &'a dyn SequenceCounter,
    cancellation: Option<&'a Cancellation>,
}

impl<'a> VersionAllocator<'a> {
    #[must_use]
    pub const fn new(counter: &'a dyn SequenceCounter) -> Self {
        Self {
            counter,
            cancellation: None,
        }
    }

    /// Refuses to reserve once `cancellation` is set, so a cancelled run
    /// stops consuming versions.
    #[must_use]
    pub const fn with_cancellation(mut self, cancellation: &'a Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Reserves `count` versions for `key`.
    ///
    /// A zero count returns an empty range without touching the counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter fails or reports a total too small to
    /// hold the reservation, or [`PersistenceError::Cancelled`].
    pub fn reserve(&self, key: &CounterKey, count: u64) -> Result<VersionRange, PersistenceError> {
        if count == 0 {
            debug!(%key, "Nothing to reserve");
            return Ok(VersionRange::empty());
        }

        if self.cancellation.is_some_and(Cancellation::is_cancelled) {
            return Err(PersistenceError::Cancelled);
        }
        let end: i64 = self.counter.increment_by(key, count)?;
        let range: VersionRange = VersionRange::from_counter_total(end, count)?;
        info!(%key, start = range.start(), count, "Reserved version range");
        Ok(range)
    }
}
