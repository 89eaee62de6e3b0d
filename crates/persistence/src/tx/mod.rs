// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Nested transactions with savepoints, after-commit hooks and retry.
//!
//! ## Module Organization
//!
//! - `manager`: top-level transactions and the retry loop
//! - `scope`: nesting, savepoints and hooks within one transaction
//! - `savepoint`: savepoint naming and statements
//! - `retry`: transient failure classification
//! - `cancel`: cancellation handle shared with the caller

pub mod cancel;
pub mod manager;
pub mod retry;
pub mod savepoint;
pub mod scope;

pub use cancel::Cancellation;
pub use manager::TransactionManager;
pub use retry::{TRANSIENT_MESSAGE_MARKERS, is_retryable, message_looks_transient};
pub use savepoint::{DEFAULT_SAVEPOINT_HINT, savepoint_name};
pub use scope::{TxScope, after_commit};
