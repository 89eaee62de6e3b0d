// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::connection::SimpleConnection;
use diesel::result::{DatabaseErrorKind, Error, QueryResult};

use crate::error::PersistenceError;
use crate::tx::savepoint::Savepoint;
use crate::tx::scope::settle_savepoint;
use crate::tx::{DEFAULT_SAVEPOINT_HINT, savepoint_name};

/// Records every statement and fails the first `RELEASE SAVEPOINT`.
#[derive(Default)]
struct ReleaseFailingConnection {
    statements: Vec<String>,
    release_failed: bool,
}

impl SimpleConnection for ReleaseFailingConnection {
    fn batch_execute(&mut self, query: &str) -> QueryResult<()> {
        self.statements.push(query.to_string());
        if query.starts_with("RELEASE SAVEPOINT") && !self.release_failed {
            self.release_failed = true;
            return Err(Error::DatabaseError(
                DatabaseErrorKind::Unknown,
                Box::new(String::from("release failed")),
            ));
        }
        Ok(())
    }
}

#[test]
fn test_missing_hint_uses_default_prefix() {
    let name: String = savepoint_name(None, 1);
    assert!(name.starts_with(&format!("{DEFAULT_SAVEPOINT_HINT}_")));
    assert!(name.ends_with("_1"));
}

#[test]
fn test_hint_is_sanitized() {
    let name: String = savepoint_name(Some("batch-import; DROP"), 4);
    assert!(name.starts_with("batchimportDROP_"), "got {name}");
    assert!(name.ends_with("_4"));
    assert!(
        name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "got {name}"
    );
}

#[test]
fn test_unusable_hints_fall_back_to_default() {
    for hint in ["", "---", "9lives"] {
        let name: String = savepoint_name(Some(hint), 2);
        assert!(
            name.starts_with(&format!("{DEFAULT_SAVEPOINT_HINT}_")),
            "hint '{hint}' produced {name}"
        );
    }
}

#[test]
fn test_names_differ_by_sequence() {
    let first: String = savepoint_name(Some("regroup"), 1);
    let second: String = savepoint_name(Some("regroup"), 2);
    assert_ne!(first, second);
}

#[test]
fn test_failed_release_rolls_back_to_the_savepoint() {
    let mut conn = ReleaseFailingConnection::default();
    let savepoint = Savepoint::create(&mut conn, savepoint_name(Some("inner"), 1)).unwrap();
    let name: String = savepoint.name().to_string();

    let result: Result<u32, PersistenceError> = settle_savepoint(&mut conn, &savepoint, Ok(7));

    assert!(result.is_err(), "a failed release must not report success");
    assert_eq!(
        conn.statements,
        vec![
            format!("SAVEPOINT {name}"),
            format!("RELEASE SAVEPOINT {name}"),
            format!("ROLLBACK TO SAVEPOINT {name}"),
            format!("RELEASE SAVEPOINT {name}"),
        ]
    );
}

#[test]
fn test_failed_body_rolls_back_without_release_first() {
    let mut conn = ReleaseFailingConnection {
        release_failed: true,
        ..ReleaseFailingConnection::default()
    };
    let savepoint = Savepoint::create(&mut conn, savepoint_name(None, 3)).unwrap();
    let name: String = savepoint.name().to_string();

    let result: Result<(), PersistenceError> = settle_savepoint(
        &mut conn,
        &savepoint,
        Err(PersistenceError::Other(String::from("body failed"))),
    );

    assert_eq!(
        result,
        Err(PersistenceError::Other(String::from("body failed")))
    );
    assert_eq!(
        conn.statements,
        vec![
            format!("SAVEPOINT {name}"),
            format!("ROLLBACK TO SAVEPOINT {name}"),
            format!("RELEASE SAVEPOINT {name}"),
        ]
    );
}
