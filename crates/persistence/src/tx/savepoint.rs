// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::connection::SimpleConnection;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::PersistenceError;

/// Prefix used when no savepoint hint is given.
pub const DEFAULT_SAVEPOINT_HINT: &str = "sp";

/// Builds a savepoint name of the form `<hint>_<unix nanos>_<sequence>`.
///
/// The hint is reduced to ASCII alphanumerics and underscores so the name
/// is always a valid unquoted identifier. `sequence` keeps names unique
/// within one transaction even if the clock does not advance.
#[must_use]
pub fn savepoint_name(hint: Option<&str>, sequence: u64) -> String {
    let sanitized: String = hint
        .unwrap_or(DEFAULT_SAVEPOINT_HINT)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let prefix: &str = if sanitized.is_empty() || sanitized.starts_with(|c: char| c.is_ascii_digit())
    {
        DEFAULT_SAVEPOINT_HINT
    } else {
        &sanitized
    };
    let nanos: i128 = OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("{prefix}_{nanos}_{sequence}")
}

/// A savepoint opened inside the current transaction.
#[derive(Debug)]
pub struct Savepoint {
    name: String,
}

impl Savepoint {
    /// Issues `SAVEPOINT <name>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn create<C: SimpleConnection>(conn: &mut C, name: String) -> Result<Self, PersistenceError> {
        debug!(savepoint = %name, "Creating savepoint");
        conn.batch_execute(&format!("SAVEPOINT {name}"))?;
        Ok(Self { name })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keeps the work done since the savepoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn release<C: SimpleConnection>(&self, conn: &mut C) -> Result<(), PersistenceError> {
        debug!(savepoint = %self.name, "Releasing savepoint");
        conn.batch_execute(&format!("RELEASE SAVEPOINT {}", self.name))?;
        Ok(())
    }

    /// Discards the work done since the savepoint and removes it.
    ///
    /// # Errors
    ///
    /// Returns an error if either statement fails.
    pub fn rollback<C: SimpleConnection>(&self, conn: &mut C) -> Result<(), PersistenceError> {
        debug!(savepoint = %self.name, "Rolling back to savepoint");
        conn.batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", self.name))?;
        conn.batch_execute(&format!("RELEASE SAVEPOINT {}", self.name))?;
        Ok(())
    }
}
