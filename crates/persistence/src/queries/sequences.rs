// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::{MysqlConnection, SqliteConnection};

use crate::diesel_schema::version_sequences;
use crate::error::PersistenceError;

backend_fn! {
/// Current value of the counter row `seq_key`, or 0 if it does not exist.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn sequence_value(conn: &mut _, seq_key: &str) -> Result<i64, PersistenceError> {
    let value: Option<i64> = version_sequences::table
        .filter(version_sequences::seq_key.eq(seq_key))
        .select(version_sequences::value)
        .first(conn)
        .optional()?;
    Ok(value.unwrap_or(0))
}
}
