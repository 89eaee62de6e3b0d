// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Counter increments backing [`crate::DbSequenceCounter`].

use diesel::prelude::*;
use diesel::{MysqlConnection, SqliteConnection};
use tracing::debug;

use crate::diesel_schema::version_sequences;
use crate::error::PersistenceError;

backend_fn! {
/// Adds `delta` to the counter row `seq_key` and returns the new value.
///
/// The row is created at 0 first if absent. The caller must run this inside
/// a transaction that holds the row's write lock until commit, so the
/// update and the read observe the same value.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn increment_sequence(conn: &mut _, seq_key: &str, delta: i64) -> Result<i64, PersistenceError> {
    diesel::insert_or_ignore_into(version_sequences::table)
        .values((
            version_sequences::seq_key.eq(seq_key),
            version_sequences::value.eq(0_i64),
        ))
        .execute(conn)?;

    diesel::update(version_sequences::table.filter(version_sequences::seq_key.eq(seq_key)))
        .set(version_sequences::value.eq(version_sequences::value + delta))
        .execute(conn)?;

    let value: i64 = version_sequences::table
        .filter(version_sequences::seq_key.eq(seq_key))
        .select(version_sequences::value)
        .first(conn)?;

    debug!(seq_key, delta, value, "Incremented sequence");
    Ok(value)
}
}
