// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

mod migration_tests;
mod savepoint_tests;

use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel::{QueryableByName, SqliteConnection};
use regroup_domain::{
    DEFAULT_FRIEND_GROUP_SEQ_KEY, DEFAULT_FRIEND_SEQ_KEY, DEFAULT_GROUP_NAME, MigrationOptions,
};

use crate::backend::sqlite;
use crate::unique_memory_url;

/// Result type for COUNT queries.
#[derive(QueryableByName)]
struct CountResult {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Opens a migrated, isolated in-memory `SQLite` connection.
pub fn create_test_connection() -> SqliteConnection {
    sqlite::initialize_database(&unique_memory_url("memdb_test")).unwrap()
}

/// Number of rows in `users`.
pub fn count_users(conn: &mut SqliteConnection) -> i64 {
    diesel::sql_query("SELECT COUNT(*) AS count FROM users")
        .get_result::<CountResult>(conn)
        .unwrap()
        .count
}

/// All user IDs, sorted.
pub fn user_ids(conn: &mut SqliteConnection) -> Vec<String> {
    use crate::diesel_schema::users;

    users::table
        .select(users::uid)
        .order(users::uid.asc())
        .load::<String>(conn)
        .unwrap()
}

/// Migration options with the stock group name and counter keys.
pub fn create_test_options() -> MigrationOptions {
    MigrationOptions::new(
        DEFAULT_GROUP_NAME,
        DEFAULT_FRIEND_SEQ_KEY,
        DEFAULT_FRIEND_GROUP_SEQ_KEY,
    )
    .unwrap()
}
