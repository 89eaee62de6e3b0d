// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Contiguous version reservations and rank-to-version mapping.
//!
//! A reservation is the half-open interval `[start, start + count)` handed
//! out by a single atomic "increment by `count`" against an external counter.
//! Candidate rows are ordered by their identity key and the row of rank `r`
//! (1-based) receives version `start + r - 1`.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};

/// A reserved block of versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRange {
    start: i64,
    count: u64,
}

impl VersionRange {
    /// A range holding no versions; produced for zero-sized reservations.
    #[must_use]
    pub const fn empty() -> Self {
        Self { start: 0, count: 0 }
    }

    /// Builds the range from the counter's new total after `INCRBY count`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::VersionOverflow` if the range does not fit in `i64`.
    pub fn from_counter_total(end: i64, count: u64) -> Result<Self, DomainError> {
        if count == 0 {
            return Ok(Self::empty());
        }
        let overflow = || DomainError::VersionOverflow { end, count };
        let width: i64 = i64::try_from(count).map_err(|_| overflow())?;
        let start: i64 = end
            .checked_sub(width)
            .and_then(|v| v.checked_add(1))
            .ok_or_else(overflow)?;
        Ok(Self { start, count })
    }

    /// First version of the range. Meaningless for empty ranges.
    #[must_use]
    pub const fn start(&self) -> i64 {
        self.start
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Last version of the range, if any.
    #[must_use]
    pub fn last(&self) -> Option<i64> {
        if self.is_empty() {
            return None;
        }
        i64::try_from(self.count)
            .ok()
            .and_then(|width| self.start.checked_add(width - 1))
    }

    #[must_use]
    pub fn contains(&self, version: i64) -> bool {
        self.last()
            .is_some_and(|last| version >= self.start && version <= last)
    }

    /// Whether two ranges share at least one version.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self.last(), other.last()) {
            (Some(a_last), Some(b_last)) => self.start <= b_last && other.start <= a_last,
            _ => false,
        }
    }

    /// Version for the row of the given 1-based rank.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::RankOutOfRange` if `rank` is 0 or above `count`.
    pub fn version_for_rank(&self, rank: u64) -> Result<i64, DomainError> {
        if rank == 0 || rank > self.count {
            return Err(DomainError::RankOutOfRange {
                rank,
                count: self.count,
            });
        }
        let offset: i64 = i64::try_from(rank - 1).map_err(|_| DomainError::RankOutOfRange {
            rank,
            count: self.count,
        })?;
        Ok(self.start + offset)
    }

    /// Checks that a write stamped exactly one row per reserved version and
    /// returns the highest version it wrote.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StampedRowsMismatch` if `stamped` differs from
    /// the reservation size, or `DomainError::RankOutOfRange` for an empty
    /// range.
    pub fn confirm_stamped(&self, stamped: u64) -> Result<i64, DomainError> {
        if stamped != self.count {
            return Err(DomainError::StampedRowsMismatch {
                reserved: self.count,
                stamped,
            });
        }
        self.version_for_rank(stamped)
    }

    /// Iterates every version of the range in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = i64> + use<> {
        let start: i64 = self.start;
        (0..self.count).filter_map(move |offset| {
            i64::try_from(offset)
                .ok()
                .and_then(|o| start.checked_add(o))
        })
    }
}
