// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use crate::error::DomainError;
use crate::types::{CounterKey, FriendFilter, GroupName, SeedSource};
use crate::version_range::VersionRange;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default display name of the per-user default group ("My friends").
pub const DEFAULT_GROUP_NAME: &str = "我的好友";

/// Default counter key for friend row versions.
pub const DEFAULT_FRIEND_SEQ_KEY: &str = "FriendSeqKey";

/// Default counter key for friend group row versions.
pub const DEFAULT_FRIEND_GROUP_SEQ_KEY: &str = "FriendGroupSeqKey";

/// Inputs of one friend-group migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOptions {
    pub default_group_name: GroupName,
    /// Compute and report counts, then roll back without consuming versions.
    pub dry_run: bool,
    /// Session lock-wait timeout applied for the duration of the run.
    pub lock_wait_timeout: Option<Duration>,
    pub friend_seq_key: CounterKey,
    pub friend_group_seq_key: CounterKey,
    pub seed_source: SeedSource,
    /// Leave default groups untouched and only reassign friends.
    pub skip_default_groups: bool,
    pub friend_filter: FriendFilter,
    /// Friend targets (system accounts) that are never reassigned.
    pub excluded_targets: Vec<String>,
}

impl MigrationOptions {
    /// Builds options with the given name and counter keys and defaults for
    /// everything else.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or a key is blank, or both keys are equal.
    pub fn new(
        default_group_name: &str,
        friend_seq_key: &str,
        friend_group_seq_key: &str,
    ) -> Result<Self, DomainError> {
        let friend_seq_key: CounterKey = CounterKey::new(friend_seq_key)?;
        let friend_group_seq_key: CounterKey = CounterKey::new(friend_group_seq_key)?;
        if friend_seq_key == friend_group_seq_key {
            return Err(DomainError::DuplicateCounterKey {
                key: friend_seq_key.to_string(),
            });
        }

        Ok(Self {
            default_group_name: GroupName::new(default_group_name)?,
            dry_run: false,
            lock_wait_timeout: None,
            friend_seq_key,
            friend_group_seq_key,
            seed_source: SeedSource::default(),
            skip_default_groups: false,
            friend_filter: FriendFilter::default(),
            excluded_targets: Vec::new(),
        })
    }

    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub const fn with_lock_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }
}

/// Outcome of a migration run.
///
/// Ranges are `None` when nothing was reserved for that step (dry run,
/// skipped step, or zero candidates).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    /// Default group rows that already existed (by name) at snapshot time.
    pub existing_defaults: u64,
    /// Seed owners without a default group at snapshot time.
    pub missing_defaults: u64,
    /// Friend rows whose group assignment differs from the target.
    pub friends_to_update: u64,
    pub inserted_default_versions: Option<VersionRange>,
    pub refreshed_default_versions: Option<VersionRange>,
    pub friend_versions: Option<VersionRange>,
    /// Attempts used by the transaction manager.
    pub attempts: u32,
}

impl MigrationReport {
    /// Total number of versions consumed from both counters.
    #[must_use]
    pub fn versions_consumed(&self) -> u64 {
        [
            self.inserted_default_versions,
            self.refreshed_default_versions,
            self.friend_versions,
        ]
        .iter()
        .flatten()
        .map(VersionRange::count)
        .sum()
    }
}
