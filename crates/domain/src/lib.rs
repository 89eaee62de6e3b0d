// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Domain types for versioned bulk friend-group migrations.
//!
//! This crate holds the I/O-free vocabulary shared by the persistence layer
//! and the command line: transaction options, retry policy, version range
//! reservations, and the inputs and outputs of a migration run.

#![deny(
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all,
    clippy::suspicious,
    clippy::complexity,
    clippy::perf,
    clippy::unwrap_used,
    clippy::expect_used
)]

mod error;
mod migration;
mod retry_policy;
mod tx_options;
mod types;
mod version_range;

#[cfg(test)]
mod tests;

pub use error::DomainError;
pub use migration::{
    DEFAULT_FRIEND_GROUP_SEQ_KEY, DEFAULT_FRIEND_SEQ_KEY, DEFAULT_GROUP_NAME, MigrationOptions,
    MigrationReport,
};
pub use retry_policy::{MIN_BACKOFF, RetryPolicy};
pub use tx_options::{IsolationLevel, TxOptions};
pub use types::{CounterKey, FriendFilter, GroupName, SeedSource};
pub use version_range::VersionRange;
