// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! SQLite-specific backend utilities.
//!
//! This module is limited to:
//! - Connection initialization and migration execution
//! - SQLite-specific configuration (PRAGMA statements)
//! - SQLite-specific workarounds (e.g., `last_insert_rowid()`)
//!
//! `SQLite` runs every transaction serializably, has no statement timeout,
//! and expresses lock waiting as the connection's busy timeout.

use std::time::Duration;

use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer};
use diesel::{Connection, RunQueryDsl, SqliteConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use regroup_domain::TxOptions;
use tracing::{debug, info};

use super::SessionSettings;
use crate::error::PersistenceError;

/// SQLite-specific migrations.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Busy timeout installed on every file-backed connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper row struct for PRAGMA queries.
///
/// This is a justified use of raw SQL as Diesel has no PRAGMA DSL.
#[derive(QueryableByName)]
struct PragmaRow {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}

#[derive(QueryableByName)]
struct BusyTimeoutRow {
    #[diesel(sql_type = Integer)]
    timeout: i32,
}

#[derive(QueryableByName)]
struct QueryOnlyRow {
    #[diesel(sql_type = Integer)]
    query_only: i32,
}

/// Helper function to get the last inserted row ID.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_last_insert_rowid(conn: &mut SqliteConnection) -> Result<i64, PersistenceError> {
    Ok(diesel::select(sql::<BigInt>("last_insert_rowid()")).get_result(conn)?)
}

/// Verifies that foreign key enforcement is enabled.
///
/// # Errors
///
/// Returns an error if foreign key enforcement is not enabled.
pub fn verify_foreign_key_enforcement(conn: &mut SqliteConnection) -> Result<(), PersistenceError> {
    // NOTE: PRAGMA is raw SQL (justified - Diesel has no PRAGMA DSL)
    let foreign_keys_enabled: i32 = diesel::sql_query("PRAGMA foreign_keys")
        .get_result::<PragmaRow>(conn)?
        .foreign_keys;

    if foreign_keys_enabled == 0 {
        return Err(PersistenceError::ForeignKeyEnforcementNotEnabled);
    }

    info!("SQLite foreign key enforcement is enabled");
    Ok(())
}

/// Run pending migrations on the provided connection.
///
/// # Errors
///
/// Returns an error if migration execution fails.
pub fn run_migrations(
    conn: &mut SqliteConnection,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Running SQLite database migrations");
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

/// Initialize a `SQLite` database at the given URL and run migrations.
///
/// # Arguments
///
/// * `database_url` - The `SQLite` database URL (e.g., `":memory:"` or file path)
///
/// # Errors
///
/// Returns an error if connection or migration fails.
pub fn initialize_database(database_url: &str) -> Result<SqliteConnection, PersistenceError> {
    info!("Initializing SQLite database at: {}", database_url);

    let mut conn: SqliteConnection = SqliteConnection::establish(database_url)
        .map_err(|e| PersistenceError::DatabaseConnectionFailed(e.to_string()))?;

    // NOTE: PRAGMA is raw SQL (justified - Diesel has no PRAGMA DSL)
    diesel::sql_query("PRAGMA foreign_keys = ON")
        .execute(&mut conn)
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
    // Other connections may hold the write lock while this one migrates.
    set_busy_timeout(&mut conn, DEFAULT_BUSY_TIMEOUT)?;

    run_migrations(&mut conn).map_err(|e| PersistenceError::MigrationFailed(e.to_string()))?;

    Ok(conn)
}

/// Enable WAL mode for file-based `SQLite` databases.
///
/// # Errors
///
/// Returns an error if the PRAGMA statement fails.
pub fn enable_wal_mode(conn: &mut SqliteConnection) -> Result<(), PersistenceError> {
    diesel::sql_query("PRAGMA journal_mode = WAL")
        .execute(conn)
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
    Ok(())
}

/// Sets how long a statement waits on a locked database before failing
/// with `database is locked`.
///
/// # Errors
///
/// Returns an error if the PRAGMA statement fails.
pub fn set_busy_timeout(
    conn: &mut SqliteConnection,
    timeout: Duration,
) -> Result<(), PersistenceError> {
    diesel::sql_query(format!("PRAGMA busy_timeout = {}", busy_timeout_millis(timeout)))
        .execute(conn)?;
    Ok(())
}

fn busy_timeout_millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

/// Captures the PRAGMA values a transaction with `options` changes.
///
/// The lock timeout maps onto `busy_timeout` and read-only onto
/// `query_only`. Isolation and statement timeouts have no `SQLite`
/// equivalent and are ignored.
///
/// # Errors
///
/// Returns an error if a current PRAGMA value cannot be read.
pub fn capture_session_settings(
    conn: &mut SqliteConnection,
    options: &TxOptions,
) -> Result<SessionSettings, PersistenceError> {
    let mut settings: SessionSettings = SessionSettings::default();

    if let Some(timeout) = options.lock_timeout {
        let current: i32 = diesel::sql_query("PRAGMA busy_timeout")
            .get_result::<BusyTimeoutRow>(conn)?
            .timeout;
        settings.push(
            format!("PRAGMA busy_timeout = {}", busy_timeout_millis(timeout)),
            format!("PRAGMA busy_timeout = {current}"),
        );
    }

    if options.read_only {
        let current: i32 = diesel::sql_query("PRAGMA query_only")
            .get_result::<QueryOnlyRow>(conn)?
            .query_only;
        settings.push(
            String::from("PRAGMA query_only = 1"),
            format!("PRAGMA query_only = {current}"),
        );
    }

    if let Some(timeout) = options.statement_timeout {
        debug!(?timeout, "SQLite has no statement timeout; ignoring");
    }
    if let Some(level) = options.isolation {
        debug!(%level, "SQLite transactions are always serializable; ignoring isolation");
    }

    Ok(settings)
}
