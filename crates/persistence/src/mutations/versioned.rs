// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Single-row updates guarded by the row's version.
//!
//! Each update applies only if the row still carries `expected_version`,
//! and bumps the version by one when it does. `Ok(false)` means another
//! writer got there first; the row is left as that writer left it.

use diesel::prelude::*;
use diesel::{MysqlConnection, SqliteConnection};
use tracing::debug;

use crate::diesel_schema::{friend_groups, friends};
use crate::error::PersistenceError;

backend_fn! {
/// Moves friend `friend_id` into `friend_group_id` if it is still at
/// `expected_version`.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn move_friend_with_version(
    conn: &mut _,
    friend_id: i64,
    expected_version: i64,
    friend_group_id: Option<i64>,
) -> Result<bool, PersistenceError> {
    let updated: usize = diesel::update(
        friends::table
            .filter(friends::id.eq(friend_id))
            .filter(friends::version.eq(expected_version)),
    )
    .set((
        friends::friend_group_id.eq(friend_group_id),
        friends::version.eq(friends::version + 1_i64),
    ))
    .execute(conn)?;

    let applied: bool = updated == 1;
    debug!(friend_id, expected_version, applied, "Versioned friend move");
    Ok(applied)
}
}

backend_fn! {
/// Renames friend group `group_id` if it is still at `expected_version`.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn rename_friend_group_with_version(
    conn: &mut _,
    group_id: i64,
    expected_version: i64,
    name: &str,
) -> Result<bool, PersistenceError> {
    let updated: usize = diesel::update(
        friend_groups::table
            .filter(friend_groups::id.eq(group_id))
            .filter(friend_groups::version.eq(expected_version)),
    )
    .set((
        friend_groups::name.eq(name),
        friend_groups::version.eq(friend_groups::version + 1_i64),
    ))
    .execute(conn)?;

    let applied: bool = updated == 1;
    debug!(group_id, expected_version, applied, "Versioned friend group rename");
    Ok(applied)
}
}
