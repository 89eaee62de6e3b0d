// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};

use diesel::connection::SimpleConnection;
use regroup_domain::TxOptions;
use tracing::{error, warn};

use super::cancel::Cancellation;
use super::savepoint::{Savepoint, savepoint_name};
use crate::backend::PersistenceBackend;
use crate::error::PersistenceError;

type AfterCommitHook = Box<dyn FnOnce()>;

/// State of one top-level transaction.
///
/// The manager creates a scope when it opens a transaction and hands it to
/// the body next to the connection. Code that wants to join the transaction
/// takes `&TxScope` and calls [`TxScope::run`]; it never opens a second
/// physical transaction.
pub struct TxScope {
    depth: Cell<u32>,
    savepoint_sequence: Cell<u64>,
    hooks: RefCell<Vec<AfterCommitHook>>,
    cancellation: Cancellation,
}

impl TxScope {
    pub(crate) const fn new(cancellation: Cancellation) -> Self {
        Self {
            depth: Cell::new(1),
            savepoint_sequence: Cell::new(0),
            hooks: RefCell::new(Vec::new()),
            cancellation,
        }
    }

    /// The cancellation handle of the manager that opened this transaction.
    #[must_use]
    pub const fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Fails with [`PersistenceError::Cancelled`] once the run is cancelled.
    ///
    /// Long bodies call this between steps; the manager rolls back and
    /// never commits a cancelled run.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), PersistenceError> {
        if self.cancellation.is_cancelled() {
            return Err(PersistenceError::Cancelled);
        }
        Ok(())
    }

    /// Current nesting depth; `1` inside the top-level body.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Number of hooks waiting for the outermost commit.
    #[must_use]
    pub fn pending_hooks(&self) -> usize {
        self.hooks.borrow().len()
    }

    /// Registers `hook` to run after the outermost commit.
    ///
    /// Hooks run in registration order and never after a rollback.
    pub fn after_commit<F>(&self, hook: F)
    where
        F: FnOnce() + 'static,
    {
        self.hooks.borrow_mut().push(Box::new(hook));
    }

    /// Runs `body` as a nested unit of work inside this transaction.
    ///
    /// Without `requires_new` the body shares the transaction's fate: its
    /// error propagates and nothing is undone at this level. With
    /// `requires_new` the body runs behind a savepoint; on failure the
    /// savepoint is rolled back, hooks registered by the body are dropped,
    /// and the error is returned so the caller may continue.
    ///
    /// Only `requires_new` and `savepoint_hint` are read from `options`.
    ///
    /// # Errors
    ///
    /// Returns the body's error, an error creating or releasing the
    /// savepoint, or [`PersistenceError::Cancelled`].
    pub fn run<C, T, F>(&self, conn: &mut C, options: &TxOptions, body: F) -> Result<T, PersistenceError>
    where
        C: PersistenceBackend,
        F: FnOnce(&mut C, &Self) -> Result<T, PersistenceError>,
    {
        self.check_cancelled()?;
        let _depth: DepthGuard<'_> = DepthGuard::enter(self);

        if !options.requires_new {
            return body(conn, self);
        }

        let sequence: u64 = self.savepoint_sequence.get() + 1;
        self.savepoint_sequence.set(sequence);
        let savepoint: Savepoint =
            Savepoint::create(conn, savepoint_name(options.savepoint_hint.as_deref(), sequence))?;
        let hooks_before: usize = self.pending_hooks();

        let body_outcome: Result<T, PersistenceError> = body(conn, self);
        let outcome: Result<T, PersistenceError> = settle_savepoint(conn, &savepoint, body_outcome);
        if outcome.is_err() {
            self.discard_hooks_from(hooks_before);
        }
        outcome
    }

    fn discard_hooks_from(&self, index: usize) {
        self.hooks.borrow_mut().truncate(index);
    }

    pub(crate) fn take_hooks(&self) -> Vec<AfterCommitHook> {
        self.hooks.take()
    }
}

/// Releases `savepoint` when `outcome` is a success and rolls back to it
/// otherwise. A release that fails is rolled back as well, so the
/// savepoint never stays open with its work in place.
pub(crate) fn settle_savepoint<C, T>(
    conn: &mut C,
    savepoint: &Savepoint,
    outcome: Result<T, PersistenceError>,
) -> Result<T, PersistenceError>
where
    C: SimpleConnection,
{
    let outcome: Result<T, PersistenceError> = match outcome {
        Ok(value) => savepoint.release(conn).map(|()| value),
        Err(err) => Err(err),
    };
    if outcome.is_err() {
        let rolled_back: Result<(), PersistenceError> = savepoint.rollback(conn);
        if let Err(rollback_err) = rolled_back {
            warn!(savepoint = %savepoint.name(), error = %rollback_err, "Failed to roll back to savepoint");
        }
    }
    outcome
}

struct DepthGuard<'a> {
    scope: &'a TxScope,
}

impl<'a> DepthGuard<'a> {
    fn enter(scope: &'a TxScope) -> Self {
        scope.depth.set(scope.depth.get() + 1);
        Self { scope }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.scope.depth.set(self.scope.depth.get() - 1);
    }
}

/// Registers `hook` against `scope`, or runs it at once when there is no
/// active transaction.
pub fn after_commit<F>(scope: Option<&TxScope>, hook: F)
where
    F: FnOnce() + 'static,
{
    match scope {
        Some(scope) => scope.after_commit(hook),
        None => run_hooks(vec![Box::new(hook)]),
    }
}

/// Runs hooks in order. A panicking hook is logged and does not stop the
/// hooks after it.
pub(crate) fn run_hooks(hooks: Vec<AfterCommitHook>) {
    for (index, hook) in hooks.into_iter().enumerate() {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(hook)) {
            error!(
                hook = index,
                panic = %panic_message(payload.as_ref()),
                "After-commit hook panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}
