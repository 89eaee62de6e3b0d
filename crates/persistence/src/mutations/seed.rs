// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Row inserts for users, groups, memberships and friends.
//!
//! Used to seed stores for tests and demos. Rows are written as given,
//! versions included; nothing here consumes a version counter.

use diesel::prelude::*;
use diesel::{MysqlConnection, SqliteConnection};
use tracing::debug;

use crate::backend::PersistenceBackend;
use crate::data_models::{NewFriend, NewFriendGroup};
use crate::diesel_schema::{friend_group_members, friend_groups, friends, users};
use crate::error::PersistenceError;

backend_fn! {
/// Inserts a user.
///
/// # Errors
///
/// Returns an error if the user already exists or the insert fails.
pub fn insert_user(conn: &mut _, uid: &str) -> Result<(), PersistenceError> {
    diesel::insert_into(users::table)
        .values(users::uid.eq(uid))
        .execute(conn)?;
    debug!(uid, "Inserted user");
    Ok(())
}
}

backend_fn! {
/// Inserts a friend group and returns its ID.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_friend_group(conn: &mut _, group: &NewFriendGroup) -> Result<i64, PersistenceError> {
    diesel::insert_into(friend_groups::table)
        .values((
            friend_groups::uid.eq(&group.uid),
            friend_groups::name.eq(&group.name),
            friend_groups::is_default.eq(i32::from(group.is_default)),
            friend_groups::is_deleted.eq(i32::from(group.is_deleted)),
            friend_groups::version.eq(group.version),
        ))
        .execute(conn)?;

    let group_id: i64 = conn.get_last_insert_rowid()?;
    debug!(group_id, uid = %group.uid, "Inserted friend group");
    Ok(group_id)
}
}

backend_fn! {
/// Puts `friend_uid` into group `group_id` of `uid` and returns the
/// membership ID.
///
/// # Errors
///
/// Returns an error if the group does not exist or the insert fails.
pub fn insert_group_member(
    conn: &mut _,
    uid: &str,
    friend_uid: &str,
    group_id: i64,
    is_deleted: bool,
) -> Result<i64, PersistenceError> {
    diesel::insert_into(friend_group_members::table)
        .values((
            friend_group_members::uid.eq(uid),
            friend_group_members::friend_uid.eq(friend_uid),
            friend_group_members::group_id.eq(group_id),
            friend_group_members::is_deleted.eq(i32::from(is_deleted)),
        ))
        .execute(conn)?;

    let member_id: i64 = conn.get_last_insert_rowid()?;
    debug!(member_id, uid, friend_uid, group_id, "Inserted group member");
    Ok(member_id)
}
}

backend_fn! {
/// Inserts a friend row and returns its ID.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_friend(conn: &mut _, friend: &NewFriend) -> Result<i64, PersistenceError> {
    diesel::insert_into(friends::table)
        .values((
            friends::uid.eq(&friend.uid),
            friends::to_uid.eq(&friend.to_uid),
            friends::friend_group_id.eq(friend.friend_group_id),
            friends::is_deleted.eq(i32::from(friend.is_deleted)),
            friends::version.eq(friend.version),
        ))
        .execute(conn)?;

    let friend_id: i64 = conn.get_last_insert_rowid()?;
    debug!(friend_id, uid = %friend.uid, to_uid = %friend.to_uid, "Inserted friend");
    Ok(friend_id)
}
}
