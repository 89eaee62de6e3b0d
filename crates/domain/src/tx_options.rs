// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Options describing how a transactional unit of work is executed.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// SQL transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The keyword sequence used in `SET TRANSACTION ISOLATION LEVEL`.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "read_uncommitted" => Ok(Self::ReadUncommitted),
            "read_committed" => Ok(Self::ReadCommitted),
            "repeatable_read" => Ok(Self::RepeatableRead),
            "serializable" => Ok(Self::Serializable),
            _ => Err(DomainError::InvalidIsolationLevel(s.to_string())),
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Per-call transaction options.
///
/// Top-level calls use `isolation`, `read_only` and the timeouts. Nested
/// calls only look at `requires_new` and `savepoint_hint`: a nested call
/// never changes the settings of the transaction it joins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Isolation level; `None` keeps the backend default.
    pub isolation: Option<IsolationLevel>,
    /// Start the transaction read-only.
    pub read_only: bool,
    /// Maximum time a statement waits for a row lock.
    pub lock_timeout: Option<Duration>,
    /// Maximum execution time of a single statement.
    pub statement_timeout: Option<Duration>,
    /// Inside an active transaction, isolate the body behind a savepoint.
    pub requires_new: bool,
    /// Prefix for generated savepoint names.
    pub savepoint_hint: Option<String>,
}

impl TxOptions {
    /// Options for a nested scope isolated by a savepoint.
    #[must_use]
    pub fn requires_new(hint: &str) -> Self {
        Self {
            requires_new: true,
            savepoint_hint: Some(hint.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }

    #[must_use]
    pub const fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }
}
