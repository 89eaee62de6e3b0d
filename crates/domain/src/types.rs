// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Name of an external atomic counter.
///
/// One counter exists per versioned entity type (friend rows and friend
/// group rows each have their own). Keys are trimmed on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey(String);

impl CounterKey {
    /// Creates a counter key.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EmptyCounterKey` if the key is blank.
    pub fn new(key: &str) -> Result<Self, DomainError> {
        let trimmed: &str = key.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyCounterKey);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the key as stored in the counter service.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display name of the per-user default friend group.
///
/// Unlike counter keys the name is stored verbatim (only blank names are
/// rejected), since existing rows are matched by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupName(String);

impl GroupName {
    /// Creates a group name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EmptyGroupName` if the name is blank.
    pub fn new(name: &str) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::EmptyGroupName);
        }
        Ok(Self(name.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the set of owners that must have a default group comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SeedSource {
    /// Every row of the `users` table.
    #[default]
    Users,
    /// Every distinct owner found in the `friends` table.
    Friends,
    /// The union of both.
    Both,
}

impl SeedSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Friends => "friends",
            Self::Both => "both",
        }
    }
}

impl FromStr for SeedSource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "users" | "user" => Ok(Self::Users),
            "friends" | "friend" => Ok(Self::Friends),
            "both" => Ok(Self::Both),
            _ => Err(DomainError::InvalidSeedSource(s.to_string())),
        }
    }
}

impl std::fmt::Display for SeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which friend rows are eligible for group reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FriendFilter {
    /// Only rows that are not soft-deleted.
    #[default]
    ActiveOnly,
    /// Only soft-deleted rows (repair runs).
    DeletedOnly,
}

impl FriendFilter {
    /// The `is_deleted` value selected by this filter.
    #[must_use]
    pub const fn is_deleted_flag(&self) -> i32 {
        match self {
            Self::ActiveOnly => 0,
            Self::DeletedOnly => 1,
        }
    }
}
