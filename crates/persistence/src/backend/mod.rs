// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Database backend-specific code.
//!
//! This module isolates backend-specific initialization, migration,
//! session configuration and the handful of statements that cannot be
//! written once for every dialect.
//!
//! ## Backend Support
//!
//! - `sqlite`: `SQLite` backend (default for development and testing)
//! - `mysql`: MySQL/MariaDB backend (validated via opt-in tests)
//!
//! ## Backend-Agnostic Code
//!
//! Backend-specific code is limited to:
//!
//! - Connection initialization and migration execution
//! - Session settings scoped to one transaction (lock and statement timeouts,
//!   read-only mode)
//! - The `BEGIN` statement matching the requested isolation
//! - Dialect differences in temporary tables and multi-table `UPDATE`
//!
//! The transaction manager and the migration steps are written once against
//! [`PersistenceBackend`] and [`Dialect`].

pub mod mysql;
pub mod sqlite;

use diesel::connection::{AnsiTransactionManager, SimpleConnection};
use diesel::{Connection, MysqlConnection, SqliteConnection};
use regroup_domain::TxOptions;

use crate::error::PersistenceError;

/// SQL dialect of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Mysql,
}

impl Dialect {
    /// Statement that opens a top-level transaction for `options`.
    ///
    /// `SQLite` has a single (serializable) isolation level, so only the
    /// locking mode changes: write transactions take the write lock up front
    /// with `BEGIN IMMEDIATE` so a conflicting writer fails at `BEGIN` rather
    /// than on lock upgrade halfway through the body.
    #[must_use]
    pub fn begin_statement(self, options: &TxOptions) -> String {
        match self {
            Self::Sqlite => {
                if options.read_only {
                    String::from("BEGIN DEFERRED")
                } else {
                    String::from("BEGIN IMMEDIATE")
                }
            }
            Self::Mysql => {
                if options.read_only {
                    String::from("START TRANSACTION READ ONLY")
                } else {
                    String::from("START TRANSACTION")
                }
            }
        }
    }

    /// Statements that must run immediately before [`Self::begin_statement`].
    #[must_use]
    pub fn pre_begin_statements(self, options: &TxOptions) -> Vec<String> {
        match (self, options.isolation) {
            (Self::Mysql, Some(level)) => {
                vec![format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql())]
            }
            _ => Vec::new(),
        }
    }

    /// Column type used for user identifiers in temporary tables.
    ///
    /// `MySQL` temporary tables inherit the database default collation, which
    /// must match the base tables for joins to be legal.
    #[must_use]
    pub const fn uid_column_type(self) -> &'static str {
        match self {
            Self::Sqlite => "TEXT",
            Self::Mysql => "VARCHAR(128) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin",
        }
    }

    /// `CREATE` statement for a connection-local temporary table.
    #[must_use]
    pub fn create_temp_table(self, name: &str, columns: &str) -> String {
        match self {
            Self::Sqlite => format!("CREATE TEMP TABLE {name} ({columns})"),
            Self::Mysql => format!("CREATE TEMPORARY TABLE {name} ({columns}) ENGINE=InnoDB"),
        }
    }

    /// Drops a temporary table if a previous attempt left it behind.
    #[must_use]
    pub fn drop_temp_table(self, name: &str) -> String {
        match self {
            Self::Sqlite => format!("DROP TABLE IF EXISTS temp.{name}"),
            Self::Mysql => format!("DROP TEMPORARY TABLE IF EXISTS {name}"),
        }
    }

    /// `UPDATE` of `target` joined to a ranked snapshot table on `id`.
    ///
    /// Each assignment is a `(column, expression)` pair; expressions may
    /// reference the snapshot through alias `s`.
    #[must_use]
    pub fn update_from_snapshot(
        self,
        target: &str,
        snapshot: &str,
        assignments: &[(&str, &str)],
    ) -> String {
        match self {
            // SET columns cannot be qualified in SQLite.
            Self::Sqlite => {
                let set: Vec<String> = assignments
                    .iter()
                    .map(|(column, expr)| format!("{column} = {expr}"))
                    .collect();
                format!(
                    "UPDATE {target} AS t SET {} FROM {snapshot} AS s WHERE s.id = t.id",
                    set.join(", ")
                )
            }
            Self::Mysql => {
                let set: Vec<String> = assignments
                    .iter()
                    .map(|(column, expr)| format!("t.{column} = {expr}"))
                    .collect();
                format!(
                    "UPDATE {target} t JOIN {snapshot} s ON s.id = t.id SET {}",
                    set.join(", ")
                )
            }
        }
    }
}

/// Session settings changed for one transaction, with the statements that
/// restore their previous values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    pub(crate) apply: Vec<String>,
    pub(crate) restore: Vec<String>,
}

impl SessionSettings {
    pub(crate) fn push(&mut self, apply: String, restore: String) {
        self.apply.push(apply);
        self.restore.push(restore);
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.apply.is_empty()
    }
}

/// Trait for backend-specific operations.
///
/// This trait provides a unified interface for operations that cannot be
/// expressed in backend-agnostic Diesel DSL: inserted row IDs, foreign key
/// verification, and transaction-scoped session settings.
///
/// It is implemented for both `SqliteConnection` and `MysqlConnection`, so
/// the transaction manager stays generic over the connection while Diesel
/// keeps concrete backend types.
pub trait PersistenceBackend:
    Connection<TransactionManager = AnsiTransactionManager> + SimpleConnection
{
    /// The connection's SQL dialect.
    fn dialect(&self) -> Dialect;

    /// Retrieves the last inserted row ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_last_insert_rowid(&mut self) -> Result<i64, PersistenceError>;

    /// Verifies that foreign key enforcement is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if foreign key enforcement is not enabled.
    fn verify_foreign_key_enforcement(&mut self) -> Result<(), PersistenceError>;

    /// Reads the current values of the session settings `options` changes
    /// and builds the statements that set and later restore them.
    ///
    /// # Errors
    ///
    /// Returns an error if a current value cannot be read.
    fn capture_session_settings(
        &mut self,
        options: &TxOptions,
    ) -> Result<SessionSettings, PersistenceError>;
}

impl PersistenceBackend for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn get_last_insert_rowid(&mut self) -> Result<i64, PersistenceError> {
        sqlite::get_last_insert_rowid(self)
    }

    fn verify_foreign_key_enforcement(&mut self) -> Result<(), PersistenceError> {
        sqlite::verify_foreign_key_enforcement(self)
    }

    fn capture_session_settings(
        &mut self,
        options: &TxOptions,
    ) -> Result<SessionSettings, PersistenceError> {
        sqlite::capture_session_settings(self, options)
    }
}

impl PersistenceBackend for MysqlConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn get_last_insert_rowid(&mut self) -> Result<i64, PersistenceError> {
        mysql::get_last_insert_rowid(self)
    }

    fn verify_foreign_key_enforcement(&mut self) -> Result<(), PersistenceError> {
        mysql::verify_foreign_key_enforcement(self)
    }

    fn capture_session_settings(
        &mut self,
        options: &TxOptions,
    ) -> Result<SessionSettings, PersistenceError> {
        mysql::capture_session_settings(self, options)
    }
}
