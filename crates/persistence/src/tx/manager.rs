// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::time::Duration;

use diesel::connection::{
    AnsiTransactionManager, TransactionManager as DieselTransactionManager,
};
use regroup_domain::{RetryPolicy, TxOptions};
use tracing::{debug, info, warn};

use super::cancel::Cancellation;
use super::retry::{is_retryable, with_jitter};
use super::scope::{TxScope, run_hooks};
use crate::backend::{Dialect, PersistenceBackend, SessionSettings};
use crate::error::PersistenceError;

/// Runs units of work in top-level transactions with bounded retry.
///
/// Each attempt opens a fresh transaction, hands a new [`TxScope`] to the
/// body, and commits or rolls back. Failures the retry classifier accepts
/// restart the whole body after a jittered exponential backoff; anything
/// else is returned as is.
#[derive(Debug, Clone)]
pub struct TransactionManager {
    policy: RetryPolicy,
    cancellation: Cancellation,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl TransactionManager {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: policy.normalized(),
            cancellation: Cancellation::new(),
        }
    }

    /// Observes `cancellation` before every attempt, during backoff, inside
    /// the body through [`TxScope::check_cancelled`], and before commit.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Runs `body` in a top-level transaction.
    ///
    /// The body may run more than once, so it must not have effects outside
    /// the transaction other than through after-commit hooks.
    ///
    /// # Errors
    ///
    /// Returns the body's error, a database error from opening or committing
    /// the transaction, [`PersistenceError::TransactionAlreadyActive`] if the
    /// connection is already inside a transaction, or
    /// [`PersistenceError::Cancelled`].
    pub fn run<C, T, F>(&self, conn: &mut C, options: &TxOptions, body: F) -> Result<T, PersistenceError>
    where
        C: PersistenceBackend,
        F: FnMut(&mut C, &TxScope) -> Result<T, PersistenceError>,
    {
        self.run_counted(conn, options, body).map(|(value, _)| value)
    }

    /// Same as [`Self::run`], also returning the number of attempts used.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub fn run_counted<C, T, F>(
        &self,
        conn: &mut C,
        options: &TxOptions,
        mut body: F,
    ) -> Result<(T, u32), PersistenceError>
    where
        C: PersistenceBackend,
        F: FnMut(&mut C, &TxScope) -> Result<T, PersistenceError>,
    {
        let mut attempt: u32 = 0;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(PersistenceError::Cancelled);
            }
            attempt += 1;

            let err: PersistenceError =
                match run_attempt(conn, options, &self.cancellation, &mut body) {
                    Ok(value) => return Ok((value, attempt)),
                    Err(err) => err,
                };

            if !is_retryable(&err) {
                return Err(err);
            }
            if !self.policy.allows_another(attempt) {
                warn!(
                    attempt,
                    max_attempts = self.policy.max_attempts,
                    error = %err,
                    "Transient failure; retry budget exhausted"
                );
                return Err(err);
            }

            let delay: Duration = with_jitter(self.policy.backoff_after(attempt));
            warn!(attempt, ?delay, error = %err, "Transient failure; retrying transaction");
            if self.cancellation.wait_timeout(delay) {
                return Err(PersistenceError::Cancelled);
            }
        }
    }
}

fn run_attempt<C, T, F>(
    conn: &mut C,
    options: &TxOptions,
    cancellation: &Cancellation,
    body: &mut F,
) -> Result<T, PersistenceError>
where
    C: PersistenceBackend,
    F: FnMut(&mut C, &TxScope) -> Result<T, PersistenceError>,
{
    if in_transaction(conn) {
        return Err(PersistenceError::TransactionAlreadyActive);
    }

    let settings: SessionSettings = conn.capture_session_settings(options)?;
    let result: Result<T, PersistenceError> = execute(conn, options, &settings, cancellation, body);

    for statement in &settings.restore {
        debug!(%statement, "Restoring session setting");
        if let Err(err) = conn.batch_execute(statement) {
            warn!(%statement, error = %err, "Failed to restore session setting");
        }
    }

    result
}

fn in_transaction<C: PersistenceBackend>(conn: &mut C) -> bool {
    matches!(
        AnsiTransactionManager::transaction_manager_status_mut(conn).transaction_depth(),
        Ok(Some(_))
    )
}

fn execute<C, T, F>(
    conn: &mut C,
    options: &TxOptions,
    settings: &SessionSettings,
    cancellation: &Cancellation,
    body: &mut F,
) -> Result<T, PersistenceError>
where
    C: PersistenceBackend,
    F: FnMut(&mut C, &TxScope) -> Result<T, PersistenceError>,
{
    for statement in &settings.apply {
        debug!(%statement, "Applying session setting");
        conn.batch_execute(statement)?;
    }

    let dialect: Dialect = conn.dialect();
    for statement in dialect.pre_begin_statements(options) {
        debug!(%statement, "Preparing transaction");
        conn.batch_execute(&statement)?;
    }
    let begin: String = dialect.begin_statement(options);
    debug!(%begin, "Opening transaction");
    AnsiTransactionManager::begin_transaction_sql(conn, &begin)?;

    let scope: TxScope = TxScope::new(cancellation.clone());
    // A cancel that lands while the body runs must not reach the commit.
    let outcome: Result<T, PersistenceError> = body(conn, &scope)
        .and_then(|value| scope.check_cancelled().map(|()| value));
    match outcome {
        Ok(value) => {
            if let Err(err) = AnsiTransactionManager::commit_transaction(conn) {
                if in_transaction(conn) {
                    if let Err(rollback_err) = AnsiTransactionManager::rollback_transaction(conn) {
                        warn!(error = %rollback_err, "Rollback after failed commit also failed");
                    }
                }
                return Err(err.into());
            }
            let hooks = scope.take_hooks();
            if !hooks.is_empty() {
                info!(count = hooks.len(), "Running after-commit hooks");
            }
            run_hooks(hooks);
            Ok(value)
        }
        Err(err) => {
            debug!(error = %err, "Rolling back transaction");
            if let Err(rollback_err) = AnsiTransactionManager::rollback_transaction(conn) {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
