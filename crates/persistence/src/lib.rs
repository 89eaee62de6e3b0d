// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Persistence layer for versioned bulk friend-group migrations.
//!
//! This crate provides:
//!
//! - a transaction manager with flat and savepoint-isolated nesting,
//!   after-commit hooks, and bounded retry of transient conflicts (`tx`);
//! - a version allocator reserving contiguous, never-reused version ranges
//!   from an atomic counter shared across processes (`sequence`);
//! - the default friend group migration built on both (`migrate`).
//!
//! It is built on Diesel and supports multiple database backends.
//!
//! ## Database Backend Support
//!
//! - **`SQLite`** (default): Used for development, unit tests, and integration tests
//! - **`MariaDB`/`MySQL`**: Production target, validated via explicit opt-in tests
//!
//! To run `MySQL` validation tests:
//! ```bash
//! cargo xtask test-mariadb
//! ```
//!
//! ### Migration Strategy
//!
//! Due to `SQL` syntax differences between backends, we maintain separate
//! migration directories:
//!
//! - `migrations/`: `SQLite`-specific (default)
//! - `migrations_mysql/`: `MySQL`/`MariaDB`-specific
//!
//! Both produce identical schema semantics but use backend-appropriate syntax.
//!
//! ## Testing Philosophy
//!
//! - Standard tests (`cargo test`) run against `SQLite` only
//! - Backend validation tests are explicitly marked `#[ignore]`
//! - All infrastructure is orchestrated by `xtask`, not embedded in tests

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
#![allow(clippy::multiple_crate_versions)]

use diesel::{MysqlConnection, SqliteConnection};
use regroup_domain::{CounterKey, MigrationOptions, MigrationReport};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for generating unique in-memory database names.
///
/// Each call to `unique_memory_url()` receives a unique sequential ID, so
/// in-memory databases opened by parallel tests never collide.
static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Macro to generate monomorphic backend-specific query/mutation functions.
///
/// This macro generates two separate functions from a single function body:
/// - One suffixed with `_sqlite` taking `&mut SqliteConnection`
/// - One suffixed with `_mysql` taking `&mut MysqlConnection`
///
/// This approach is required because Diesel's type system requires concrete
/// backend types at compile time and cannot handle generic backend functions.
///
/// # Constraints
///
/// - The macro ONLY duplicates function bodies and substitutes connection types
/// - No logic, branching, or dispatch occurs within the macro
/// - Backend dispatch happens in the `Persistence` adapter or a dispatch trait
/// - The generated functions are completely monomorphic
///
/// # Usage
///
/// ```ignore
/// backend_fn! {
///     pub fn my_query(conn: &mut _, param: i64) -> Result<String, PersistenceError> {
///         diesel_schema::table::table
///             .filter(diesel_schema::table::id.eq(param))
///             .first::<String>(conn)
///             .map_err(Into::into)
///     }
/// }
/// ```
///
/// This generates:
/// - `my_query_sqlite(&mut SqliteConnection, i64) -> Result<String, PersistenceError>`
/// - `my_query_mysql(&mut MysqlConnection, i64) -> Result<String, PersistenceError>`
macro_rules! backend_fn {
    (
        $(#[$meta:meta])*
        $vis:vis fn $name:ident (
            $conn:ident : &mut _
            $(, $param:ident : $param_ty:ty)* $(,)?
        ) -> $ret:ty
        $body:block
    ) => {
        pastey::paste! {
            // Generate SQLite version
            $(#[$meta])*
            $vis fn [<$name _sqlite>] (
                $conn: &mut SqliteConnection
                $(, $param : $param_ty)*
            ) -> $ret
            $body

            // Generate MySQL version
            $(#[$meta])*
            $vis fn [<$name _mysql>] (
                $conn: &mut MysqlConnection
                $(, $param : $param_ty)*
            ) -> $ret
            $body
        }
    };
}

pub mod backend;
mod data_models;
mod diesel_schema;
mod error;
pub mod migrate;
mod mutations;
mod queries;
pub mod sequence;
pub mod tx;

#[cfg(test)]
mod tests;

pub use backend::{Dialect, PersistenceBackend};
pub use data_models::{FriendData, FriendGroupData, NewFriend, NewFriendGroup};
pub use error::{DatabaseFailure, PersistenceError};
pub use sequence::{
    CounterReservation, DbSequenceCounter, MemorySequenceCounter, SequenceCounter,
    VersionAllocator,
};
pub use tx::{Cancellation, TransactionManager, TxScope, after_commit, is_retryable};

/// Builds a URL for a fresh shared-cache in-memory `SQLite` database.
pub(crate) fn unique_memory_url(prefix: &str) -> String {
    let db_id: u64 = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("file:{prefix}_{db_id}?mode=memory&cache=shared")
}

/// Backend-specific database connection.
///
/// Exposed so callers can run their own units of work through a
/// [`TransactionManager`] on the concrete connection type.
pub enum BackendConnection {
    Sqlite(SqliteConnection),
    Mysql(MysqlConnection),
}

/// Persistence adapter for the friend graph store.
///
/// This adapter is backend-agnostic and works with both `SQLite` and `MySQL`/`MariaDB`.
/// Backend selection happens once at construction time and is transparent to callers.
pub struct Persistence {
    pub(crate) conn: BackendConnection,
}

impl Persistence {
    /// Creates a new persistence adapter with an in-memory `SQLite` database.
    ///
    /// Each call receives a unique database instance via atomic counter,
    /// ensuring deterministic test isolation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn new_in_memory() -> Result<Self, PersistenceError> {
        let shared_memory_url: String = unique_memory_url("memdb_store");

        let mut conn: SqliteConnection = backend::sqlite::initialize_database(&shared_memory_url)?;
        backend::sqlite::verify_foreign_key_enforcement(&mut conn)?;

        Ok(Self {
            conn: BackendConnection::Sqlite(conn),
        })
    }

    /// Creates a new persistence adapter with a file-based `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new_with_file<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            PersistenceError::InitializationError("Invalid database path".to_string())
        })?;

        let mut conn: SqliteConnection = backend::sqlite::initialize_database(path_str)?;
        backend::sqlite::enable_wal_mode(&mut conn)?;
        backend::sqlite::verify_foreign_key_enforcement(&mut conn)?;

        Ok(Self {
            conn: BackendConnection::Sqlite(conn),
        })
    }

    /// Creates a new persistence adapter with a `MySQL`/`MariaDB` database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new_with_mysql(database_url: &str) -> Result<Self, PersistenceError> {
        let mut conn: MysqlConnection = backend::mysql::initialize_database(database_url)?;
        backend::mysql::verify_foreign_key_enforcement(&mut conn)?;

        Ok(Self {
            conn: BackendConnection::Mysql(conn),
        })
    }

    /// Verifies that foreign key enforcement is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if foreign key enforcement is not enabled.
    pub fn verify_foreign_key_enforcement(&mut self) -> Result<(), PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => conn.verify_foreign_key_enforcement(),
            BackendConnection::Mysql(conn) => conn.verify_foreign_key_enforcement(),
        }
    }

    /// The SQL dialect of the underlying connection.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        match &self.conn {
            BackendConnection::Sqlite(conn) => conn.dialect(),
            BackendConnection::Mysql(conn) => conn.dialect(),
        }
    }

    /// The underlying connection.
    pub const fn connection(&mut self) -> &mut BackendConnection {
        &mut self.conn
    }

    // ========================================================================
    // Migration
    // ========================================================================

    /// Backfills default friend groups and reassigns friends to them, in one
    /// transaction run by `manager`, with versions reserved from `counter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the run fails or is cancelled. A dry run is not an
    /// error: its report is returned after the rollback.
    pub fn migrate_friend_groups(
        &mut self,
        manager: &TransactionManager,
        counter: &dyn SequenceCounter,
        options: &MigrationOptions,
    ) -> Result<MigrationReport, PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => {
                migrate::migrate_friend_groups(conn, manager, counter, options)
            }
            BackendConnection::Mysql(conn) => {
                migrate::migrate_friend_groups(conn, manager, counter, options)
            }
        }
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    /// Inserts a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the user exists or the insert fails.
    pub fn insert_user(&mut self, uid: &str) -> Result<(), PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => mutations::seed::insert_user_sqlite(conn, uid),
            BackendConnection::Mysql(conn) => mutations::seed::insert_user_mysql(conn, uid),
        }
    }

    /// Inserts a friend group and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_friend_group(&mut self, group: &NewFriendGroup) -> Result<i64, PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => {
                mutations::seed::insert_friend_group_sqlite(conn, group)
            }
            BackendConnection::Mysql(conn) => mutations::seed::insert_friend_group_mysql(conn, group),
        }
    }

    /// Adds `friend_uid` to group `group_id` of `uid` and returns the
    /// membership ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the group does not exist or the insert fails.
    pub fn insert_group_member(
        &mut self,
        uid: &str,
        friend_uid: &str,
        group_id: i64,
        is_deleted: bool,
    ) -> Result<i64, PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => mutations::seed::insert_group_member_sqlite(
                conn, uid, friend_uid, group_id, is_deleted,
            ),
            BackendConnection::Mysql(conn) => mutations::seed::insert_group_member_mysql(
                conn, uid, friend_uid, group_id, is_deleted,
            ),
        }
    }

    /// Inserts a friend row and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_friend(&mut self, friend: &NewFriend) -> Result<i64, PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => mutations::seed::insert_friend_sqlite(conn, friend),
            BackendConnection::Mysql(conn) => mutations::seed::insert_friend_mysql(conn, friend),
        }
    }

    // ========================================================================
    // Versioned updates
    // ========================================================================

    /// Moves friend `friend_id` into `friend_group_id` and bumps its
    /// version, provided the row is still at `expected_version`.
    ///
    /// Returns `false` on a version conflict; nothing is changed then.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn move_friend_with_version(
        &mut self,
        friend_id: i64,
        expected_version: i64,
        friend_group_id: Option<i64>,
    ) -> Result<bool, PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => mutations::versioned::move_friend_with_version_sqlite(
                conn,
                friend_id,
                expected_version,
                friend_group_id,
            ),
            BackendConnection::Mysql(conn) => mutations::versioned::move_friend_with_version_mysql(
                conn,
                friend_id,
                expected_version,
                friend_group_id,
            ),
        }
    }

    /// Renames friend group `group_id` and bumps its version, provided the
    /// row is still at `expected_version`.
    ///
    /// Returns `false` on a version conflict; nothing is changed then.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn rename_friend_group_with_version(
        &mut self,
        group_id: i64,
        expected_version: i64,
        name: &str,
    ) -> Result<bool, PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => {
                mutations::versioned::rename_friend_group_with_version_sqlite(
                    conn,
                    group_id,
                    expected_version,
                    name,
                )
            }
            BackendConnection::Mysql(conn) => {
                mutations::versioned::rename_friend_group_with_version_mysql(
                    conn,
                    group_id,
                    expected_version,
                    name,
                )
            }
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Lists all friend groups ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_friend_groups(&mut self) -> Result<Vec<FriendGroupData>, PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => queries::friends::list_friend_groups_sqlite(conn),
            BackendConnection::Mysql(conn) => queries::friends::list_friend_groups_mysql(conn),
        }
    }

    /// Lists all friend rows ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_friends(&mut self) -> Result<Vec<FriendData>, PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => queries::friends::list_friends_sqlite(conn),
            BackendConnection::Mysql(conn) => queries::friends::list_friends_mysql(conn),
        }
    }

    /// Value of the `version_sequences` row `key` in this store, or 0.
    ///
    /// Only meaningful when the store also hosts the version counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn sequence_value(&mut self, key: &CounterKey) -> Result<i64, PersistenceError> {
        match &mut self.conn {
            BackendConnection::Sqlite(conn) => {
                queries::sequences::sequence_value_sqlite(conn, key.as_str())
            }
            BackendConnection::Mysql(conn) => {
                queries::sequences::sequence_value_mysql(conn, key.as_str())
            }
        }
    }
}
