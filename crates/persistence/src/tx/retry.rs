// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Classification of failures into transient and fatal.
//!
//! Structured error kinds decide first. Only when the driver reported no
//! structured kind does a substring match on the message apply. That match
//! is imprecise: it can both miss transient errors worded differently and
//! accept a fatal error whose message happens to mention a lock.

use std::time::Duration;

use crate::error::{DatabaseFailure, PersistenceError};

/// Lower-cased message fragments treated as transient when no structured
/// kind is available.
pub const TRANSIENT_MESSAGE_MARKERS: [&str; 6] = [
    "deadlock",
    "lock wait timeout",
    "could not serialize",
    "serialization failure",
    "database is locked",
    "database table is locked",
];

/// Returns `true` if restarting the whole transaction may succeed.
#[must_use]
pub fn is_retryable(err: &PersistenceError) -> bool {
    match err {
        PersistenceError::DatabaseError {
            kind: DatabaseFailure::SerializationFailure,
            ..
        } => true,
        PersistenceError::DatabaseError {
            kind: DatabaseFailure::Unknown,
            message,
        } => message_looks_transient(message),
        _ => false,
    }
}

/// Case-insensitive match of `message` against [`TRANSIENT_MESSAGE_MARKERS`].
#[must_use]
pub fn message_looks_transient(message: &str) -> bool {
    let lower: String = message.to_lowercase();
    TRANSIENT_MESSAGE_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Adds up to 25% random jitter on top of `delay`.
pub(crate) fn with_jitter(delay: Duration) -> Duration {
    delay.mul_f64(1.0 + rand::random::<f64>() * 0.25)
}
