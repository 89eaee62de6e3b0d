// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use diesel::{MysqlConnection, SqliteConnection};
use num_traits::ToPrimitive;
use regroup_domain::{CounterKey, RetryPolicy, TxOptions};
use tracing::info;

use super::SequenceCounter;
use crate::backend;
use crate::error::PersistenceError;
use crate::mutations::sequences::{increment_sequence_mysql, increment_sequence_sqlite};
use crate::queries::sequences::{sequence_value_mysql, sequence_value_sqlite};
use crate::tx::TransactionManager;
use crate::{BackendConnection, unique_memory_url};

/// Attempts per increment; concurrent first-time inserts of a key can
/// deadlock on `MySQL` and lock contention surfaces as busy on `SQLite`.
const INCREMENT_ATTEMPTS: u32 = 5;

/// Counter stored in the `version_sequences` table.
///
/// Owns a dedicated connection so each increment commits on its own,
/// independent of any migration transaction that is waiting on the
/// reserved versions. With `SQLite` the counter must live in a different
/// database file than the store being migrated: the migration holds the
/// store's write lock for its whole run.
pub struct DbSequenceCounter {
    conn: Mutex<BackendConnection>,
    manager: TransactionManager,
}

impl DbSequenceCounter {
    fn from_connection(conn: BackendConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
            manager: TransactionManager::new(RetryPolicy::with_attempts(INCREMENT_ATTEMPTS)),
        }
    }

    /// Opens (and migrates) a file-backed `SQLite` counter database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_sqlite<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            PersistenceError::InitializationError("Invalid counter database path".to_string())
        })?;

        let mut conn: SqliteConnection = backend::sqlite::initialize_database(path_str)?;
        backend::sqlite::enable_wal_mode(&mut conn)?;

        info!(path = path_str, "Opened SQLite version counter");
        Ok(Self::from_connection(BackendConnection::Sqlite(conn)))
    }

    /// Opens a counter in a fresh shared in-memory `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let url: String = unique_memory_url("memdb_counter");
        let conn: SqliteConnection = backend::sqlite::initialize_database(&url)?;
        Ok(Self::from_connection(BackendConnection::Sqlite(conn)))
    }

    /// Opens (and migrates) a `MySQL`/`MariaDB` counter.
    ///
    /// The counter may share a database with the store: it only touches the
    /// `version_sequences` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_mysql(database_url: &str) -> Result<Self, PersistenceError> {
        let conn: MysqlConnection = backend::mysql::initialize_database(database_url)?;
        info!("Opened MySQL version counter");
        Ok(Self::from_connection(BackendConnection::Mysql(conn)))
    }

    /// Current total for `key`; 0 if it was never incremented.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn value(&self, key: &CounterKey) -> Result<i64, PersistenceError> {
        match &mut *self.lock() {
            BackendConnection::Sqlite(conn) => sequence_value_sqlite(conn, key.as_str()),
            BackendConnection::Mysql(conn) => sequence_value_mysql(conn, key.as_str()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BackendConnection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SequenceCounter for DbSequenceCounter {
    fn increment_by(&self, key: &CounterKey, delta: u64) -> Result<i64, PersistenceError> {
        let delta: i64 = delta
            .to_i64()
            .ok_or_else(|| PersistenceError::CounterFailed {
                key: key.to_string(),
                message: format!("increment by {delta} overflows the counter"),
            })?;
        let options: TxOptions = TxOptions::default();

        let result: Result<i64, PersistenceError> = match &mut *self.lock() {
            BackendConnection::Sqlite(conn) => self.manager.run(conn, &options, |conn, _| {
                increment_sequence_sqlite(conn, key.as_str(), delta)
            }),
            BackendConnection::Mysql(conn) => self.manager.run(conn, &options, |conn, _| {
                increment_sequence_mysql(conn, key.as_str(), delta)
            }),
        };

        result.map_err(|err| PersistenceError::CounterFailed {
            key: key.to_string(),
            message: err.to_string(),
        })
    }
}
