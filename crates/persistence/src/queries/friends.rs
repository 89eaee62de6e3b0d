// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::{MysqlConnection, SqliteConnection};

use crate::data_models::{FriendData, FriendGroupData, FriendGroupRow, FriendRow};
use crate::diesel_schema::{friend_groups, friends};
use crate::error::PersistenceError;

backend_fn! {
/// Lists all friend groups ordered by ID.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_friend_groups(conn: &mut _) -> Result<Vec<FriendGroupData>, PersistenceError> {
    let rows: Vec<FriendGroupRow> = friend_groups::table
        .select((
            friend_groups::id,
            friend_groups::uid,
            friend_groups::name,
            friend_groups::is_default,
            friend_groups::is_deleted,
            friend_groups::version,
        ))
        .order(friend_groups::id.asc())
        .load(conn)?;
    Ok(rows.into_iter().map(FriendGroupData::from).collect())
}
}

backend_fn! {
/// Lists all friend rows ordered by ID.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_friends(conn: &mut _) -> Result<Vec<FriendData>, PersistenceError> {
    let rows: Vec<FriendRow> = friends::table
        .select((
            friends::id,
            friends::uid,
            friends::to_uid,
            friends::friend_group_id,
            friends::is_deleted,
            friends::version,
        ))
        .order(friends::id.asc())
        .load(conn)?;
    Ok(rows.into_iter().map(FriendData::from).collect())
}
}
