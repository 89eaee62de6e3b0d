// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::result::DatabaseErrorKind;
use regroup_domain::DomainError;

/// Structured classification of a database-reported failure.
///
/// Mirrors the subset of Diesel's `DatabaseErrorKind` the transaction
/// manager reasons about. Anything without a structured code lands in
/// `Unknown` and keeps only its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseFailure {
    /// Serialization failure or deadlock; the transaction may succeed if retried.
    SerializationFailure,
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    CheckViolation,
    ReadOnlyTransaction,
    ClosedConnection,
    Unknown,
}

impl From<&DatabaseErrorKind> for DatabaseFailure {
    fn from(kind: &DatabaseErrorKind) -> Self {
        match kind {
            DatabaseErrorKind::SerializationFailure => Self::SerializationFailure,
            DatabaseErrorKind::UniqueViolation => Self::UniqueViolation,
            DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation,
            DatabaseErrorKind::NotNullViolation => Self::NotNullViolation,
            DatabaseErrorKind::CheckViolation => Self::CheckViolation,
            DatabaseErrorKind::ReadOnlyTransaction => Self::ReadOnlyTransaction,
            DatabaseErrorKind::ClosedConnection => Self::ClosedConnection,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for DatabaseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label: &str = match self {
            Self::SerializationFailure => "serialization failure",
            Self::UniqueViolation => "unique violation",
            Self::ForeignKeyViolation => "foreign key violation",
            Self::NotNullViolation => "not-null violation",
            Self::CheckViolation => "check violation",
            Self::ReadOnlyTransaction => "read-only transaction",
            Self::ClosedConnection => "closed connection",
            Self::Unknown => "unclassified",
        };
        f.write_str(label)
    }
}

/// Errors that can occur during persistence operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The database rejected a statement.
    DatabaseError {
        kind: DatabaseFailure,
        message: String,
    },
    /// Database connection failed.
    DatabaseConnectionFailed(String),
    /// Database migration failed.
    MigrationFailed(String),
    /// Query execution failed outside of the database (decoding, driver state).
    QueryFailed(String),
    /// Initialization error.
    InitializationError(String),
    /// Foreign key enforcement is not enabled.
    ForeignKeyEnforcementNotEnabled,
    /// The requested resource was not found.
    NotFound(String),
    /// A top-level transaction was requested while one is already open.
    TransactionAlreadyActive,
    /// The external version counter could not be incremented.
    CounterFailed { key: String, message: String },
    /// A domain invariant was violated.
    Domain(DomainError),
    /// The run was cancelled before it could finish.
    Cancelled,
    /// Sentinel returned by a dry run to force a rollback.
    DryRunRollback,
    /// A general error occurred.
    Other(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DatabaseError { kind, message } => {
                write!(f, "Database error ({kind}): {message}")
            }
            Self::DatabaseConnectionFailed(msg) => {
                write!(f, "Database connection failed: {msg}")
            }
            Self::MigrationFailed(msg) => write!(f, "Migration failed: {msg}"),
            Self::QueryFailed(msg) => write!(f, "Query failed: {msg}"),
            Self::InitializationError(msg) => write!(f, "Initialization error: {msg}"),
            Self::ForeignKeyEnforcementNotEnabled => {
                write!(f, "Foreign key enforcement is not enabled")
            }
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::TransactionAlreadyActive => {
                write!(f, "A transaction is already active on this connection")
            }
            Self::CounterFailed { key, message } => {
                write!(f, "Version counter '{key}' failed: {message}")
            }
            Self::Domain(err) => write!(f, "Domain error: {err}"),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::DryRunRollback => write!(f, "Dry run requested; transaction rolled back"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<diesel::result::Error> for PersistenceError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => Self::NotFound("Record not found".to_string()),
            diesel::result::Error::DatabaseError(kind, info) => Self::DatabaseError {
                kind: DatabaseFailure::from(&kind),
                message: info.message().to_string(),
            },
            _ => Self::QueryFailed(err.to_string()),
        }
    }
}

impl From<diesel::ConnectionError> for PersistenceError {
    fn from(err: diesel::ConnectionError) -> Self {
        Self::DatabaseConnectionFailed(err.to_string())
    }
}

impl From<DomainError> for PersistenceError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}
