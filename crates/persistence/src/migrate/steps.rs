// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Set-based statements of the default friend group migration.
//!
//! Every candidate set is materialised in a connection-local temporary
//! table together with its 1-based rank before any version is reserved.
//! The reservation size is the table's row count and each row's version is
//! `start + rank - 1`, so versions are assigned exactly once per row and in
//! a deterministic order.
//!
//! `MySQL` cannot open the same temporary table twice in one statement, so
//! every statement references each temporary table at most once.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use diesel::{MysqlConnection, SqliteConnection};
use num_traits::ToPrimitive;
use regroup_domain::{FriendFilter, SeedSource};
use std::collections::BTreeSet;
use tracing::debug;

use crate::backend::{Dialect, PersistenceBackend};
use crate::error::PersistenceError;

pub const TMP_EXISTING_DEFAULTS: &str = "tmp_existing_defaults";
pub const TMP_MISSING_DEFAULTS: &str = "tmp_missing_defaults";
pub const TMP_DEFAULTS: &str = "tmp_defaults";
pub const TMP_MEMBERS: &str = "tmp_members";
pub const TMP_EXCLUDED_TARGETS: &str = "tmp_excluded_targets";
pub const TMP_FRIEND_CANDIDATES: &str = "tmp_friend_candidates";

/// Result type for COUNT queries.
#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

fn temp_tables(dialect: Dialect) -> [(&'static str, String); 6] {
    let uid: &str = dialect.uid_column_type();
    [
        (
            TMP_EXISTING_DEFAULTS,
            String::from("id BIGINT NOT NULL PRIMARY KEY, rn BIGINT NOT NULL"),
        ),
        (
            TMP_MISSING_DEFAULTS,
            format!("uid {uid} NOT NULL PRIMARY KEY, rn BIGINT NOT NULL"),
        ),
        (
            TMP_DEFAULTS,
            format!("uid {uid} NOT NULL PRIMARY KEY, default_group_id BIGINT NOT NULL"),
        ),
        (
            TMP_MEMBERS,
            format!(
                "uid {uid} NOT NULL, friend_uid {uid} NOT NULL, \
                 target_group_id BIGINT NOT NULL, PRIMARY KEY (uid, friend_uid)"
            ),
        ),
        (
            TMP_EXCLUDED_TARGETS,
            format!("uid {uid} NOT NULL PRIMARY KEY"),
        ),
        (
            TMP_FRIEND_CANDIDATES,
            String::from(
                "id BIGINT NOT NULL PRIMARY KEY, new_group_id BIGINT NOT NULL, rn BIGINT NOT NULL",
            ),
        ),
    ]
}

/// Drops any leftovers of a previous attempt and creates empty temporary
/// tables.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn reset_temp_tables<C: PersistenceBackend>(conn: &mut C) -> Result<(), PersistenceError> {
    let dialect: Dialect = conn.dialect();
    for (name, columns) in temp_tables(dialect) {
        conn.batch_execute(&dialect.drop_temp_table(name))?;
        conn.batch_execute(&dialect.create_temp_table(name, &columns))?;
    }
    Ok(())
}

/// Drops the temporary tables.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn drop_temp_tables<C: PersistenceBackend>(conn: &mut C) -> Result<(), PersistenceError> {
    let dialect: Dialect = conn.dialect();
    for (name, _) in temp_tables(dialect) {
        conn.batch_execute(&dialect.drop_temp_table(name))?;
    }
    Ok(())
}

/// Owners that should have a default group, per seed source.
const fn seed_owner_query(seed: SeedSource) -> &'static str {
    match seed {
        SeedSource::Users => "SELECT u.uid AS uid FROM users u",
        SeedSource::Friends => "SELECT DISTINCT f.uid AS uid FROM friends f",
        SeedSource::Both => {
            "SELECT u.uid AS uid FROM users u UNION SELECT f.uid AS uid FROM friends f"
        }
    }
}

fn to_count(count: i64, table: &str) -> Result<u64, PersistenceError> {
    count
        .to_u64()
        .ok_or_else(|| PersistenceError::Other(format!("Negative row count {count} in {table}")))
}

backend_fn! {
/// Snapshots every group named `group_name`, in any state, ranked by ID.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn snapshot_existing_defaults(conn: &mut _, group_name: &str) -> Result<u64, PersistenceError> {
    diesel::sql_query(format!(
        "INSERT INTO {TMP_EXISTING_DEFAULTS} (id, rn) \
         SELECT fg.id, ROW_NUMBER() OVER (ORDER BY fg.id) \
         FROM friend_groups fg \
         WHERE fg.name = ?"
    ))
    .bind::<Text, _>(group_name)
    .execute(conn)?;

    let row: CountRow =
        diesel::sql_query(format!("SELECT COUNT(*) AS count FROM {TMP_EXISTING_DEFAULTS}"))
            .get_result(conn)?;
    to_count(row.count, TMP_EXISTING_DEFAULTS)
}
}

backend_fn! {
/// Snapshots seed owners without a group named `group_name`, ranked by uid.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn snapshot_missing_defaults(
    conn: &mut _,
    group_name: &str,
    seed: SeedSource,
) -> Result<u64, PersistenceError> {
    diesel::sql_query(format!(
        "INSERT INTO {TMP_MISSING_DEFAULTS} (uid, rn) \
         SELECT o.uid, ROW_NUMBER() OVER (ORDER BY o.uid) \
         FROM ({}) o \
         WHERE NOT EXISTS ( \
             SELECT 1 FROM friend_groups fg WHERE fg.uid = o.uid AND fg.name = ? \
         )",
        seed_owner_query(seed)
    ))
    .bind::<Text, _>(group_name)
    .execute(conn)?;

    let row: CountRow =
        diesel::sql_query(format!("SELECT COUNT(*) AS count FROM {TMP_MISSING_DEFAULTS}"))
            .get_result(conn)?;
    to_count(row.count, TMP_MISSING_DEFAULTS)
}
}

backend_fn! {
/// Inserts one active default group per snapshotted missing owner with
/// version `start + rank - 1`.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_missing_defaults(
    conn: &mut _,
    group_name: &str,
    start: i64,
) -> Result<usize, PersistenceError> {
    let inserted: usize = diesel::sql_query(format!(
        "INSERT INTO friend_groups (uid, name, is_default, is_deleted, version) \
         SELECT s.uid, ?, 1, 0, ? + s.rn - 1 \
         FROM {TMP_MISSING_DEFAULTS} s"
    ))
    .bind::<Text, _>(group_name)
    .bind::<BigInt, _>(start)
    .execute(conn)?;
    Ok(inserted)
}
}

backend_fn! {
/// Marks every snapshotted existing group as the active default with
/// version `start + rank - 1`. Rows created after the snapshot are not
/// touched.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn refresh_existing_defaults(conn: &mut _, start: i64) -> Result<usize, PersistenceError> {
    let statement: String = conn.dialect().update_from_snapshot(
        "friend_groups",
        TMP_EXISTING_DEFAULTS,
        &[
            ("is_default", "1"),
            ("is_deleted", "0"),
            ("version", "? + s.rn - 1"),
        ],
    );
    let updated: usize = diesel::sql_query(statement)
        .bind::<BigInt, _>(start)
        .execute(conn)?;
    Ok(updated)
}
}

backend_fn! {
/// Resolves each owner's default group and each friendship's explicit
/// group. Ties resolve to the smallest group ID.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn snapshot_friend_targets(conn: &mut _) -> Result<(), PersistenceError> {
    diesel::sql_query(format!(
        "INSERT INTO {TMP_DEFAULTS} (uid, default_group_id) \
         SELECT fg.uid, MIN(fg.id) \
         FROM friend_groups fg \
         WHERE fg.is_default = 1 AND fg.is_deleted = 0 \
         GROUP BY fg.uid"
    ))
    .execute(conn)?;

    diesel::sql_query(format!(
        "INSERT INTO {TMP_MEMBERS} (uid, friend_uid, target_group_id) \
         SELECT m.uid, m.friend_uid, MIN(m.group_id) \
         FROM friend_group_members m \
         JOIN friend_groups fg ON fg.id = m.group_id \
         WHERE m.is_deleted = 0 AND fg.is_deleted = 0 \
         GROUP BY m.uid, m.friend_uid"
    ))
    .execute(conn)?;
    Ok(())
}
}

backend_fn! {
/// Snapshots friend rows whose group differs from their target, ranked by
/// ID. Rows pointing at an excluded target are left out.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn snapshot_friend_candidates(
    conn: &mut _,
    filter: FriendFilter,
    excluded_targets: &[String],
) -> Result<u64, PersistenceError> {
    let excluded: BTreeSet<&str> = excluded_targets.iter().map(String::as_str).collect();
    for target in excluded {
        diesel::sql_query(format!("INSERT INTO {TMP_EXCLUDED_TARGETS} (uid) VALUES (?)"))
            .bind::<Text, _>(target)
            .execute(conn)?;
    }

    diesel::sql_query(format!(
        "INSERT INTO {TMP_FRIEND_CANDIDATES} (id, new_group_id, rn) \
         SELECT f.id, COALESCE(m.target_group_id, d.default_group_id), \
                ROW_NUMBER() OVER (ORDER BY f.id) \
         FROM friends f \
         JOIN {TMP_DEFAULTS} d ON d.uid = f.uid \
         LEFT JOIN {TMP_MEMBERS} m ON m.uid = f.uid AND m.friend_uid = f.to_uid \
         WHERE f.is_deleted = ? \
           AND COALESCE(f.friend_group_id, 0) <> COALESCE(m.target_group_id, d.default_group_id) \
           AND NOT EXISTS (SELECT 1 FROM {TMP_EXCLUDED_TARGETS} x WHERE x.uid = f.to_uid)"
    ))
    .bind::<Integer, _>(filter.is_deleted_flag())
    .execute(conn)?;

    let row: CountRow =
        diesel::sql_query(format!("SELECT COUNT(*) AS count FROM {TMP_FRIEND_CANDIDATES}"))
            .get_result(conn)?;
    debug!(count = row.count, "Snapshotted friend candidates");
    to_count(row.count, TMP_FRIEND_CANDIDATES)
}
}

backend_fn! {
/// Moves every snapshotted friend row to its target group with version
/// `start + rank - 1`.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn reassign_friends(conn: &mut _, start: i64) -> Result<usize, PersistenceError> {
    let statement: String = conn.dialect().update_from_snapshot(
        "friends",
        TMP_FRIEND_CANDIDATES,
        &[
            ("friend_group_id", "s.new_group_id"),
            ("version", "? + s.rn - 1"),
        ],
    );
    let updated: usize = diesel::sql_query(statement)
        .bind::<BigInt, _>(start)
        .execute(conn)?;
    Ok(updated)
}
}
