// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use thiserror::Error;

/// Errors raised while building or validating domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// A counter key was empty or contained only whitespace.
    #[error("Counter key must not be empty")]
    EmptyCounterKey,

    /// The two counter keys of a migration point at the same counter.
    #[error("Friend and friend group counters must use different keys (both are '{key}')")]
    DuplicateCounterKey { key: String },

    /// A group display name was empty or contained only whitespace.
    #[error("Default group name must not be empty")]
    EmptyGroupName,

    /// The seed source string is not one of the supported values.
    #[error("Unknown seed source '{0}' (expected users, friends or both)")]
    InvalidSeedSource(String),

    /// The isolation level string is not one of the supported values.
    #[error("Unknown isolation level '{0}'")]
    InvalidIsolationLevel(String),

    /// A version reservation does not fit in the signed 64-bit version space.
    #[error("Version range overflow: end={end}, count={count}")]
    VersionOverflow { end: i64, count: u64 },

    /// A rank outside of `1..=count` was mapped against a range.
    #[error("Rank {rank} is outside of a range holding {count} versions")]
    RankOutOfRange { rank: u64, count: u64 },

    /// A write stamped a different number of rows than versions were reserved.
    #[error("Reserved {reserved} versions but stamped {stamped} rows")]
    StampedRowsMismatch { reserved: u64, stamped: u64 },
}
