// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Aborted runs: counter failures, transient conflicts, cancellation.

use std::sync::atomic::{AtomicU32, Ordering};

use regroup_domain::{CounterKey, RetryPolicy};
use tempfile::TempDir;

use super::{bounds, default_named_groups, seed_friend_graph};
use crate::Persistence;
use crate::error::{DatabaseFailure, PersistenceError};
use crate::sequence::{DbSequenceCounter, MemorySequenceCounter, SequenceCounter};
use crate::tests::create_test_options;
use crate::tx::{Cancellation, TransactionManager};

/// Delegates to a memory counter until call number `fail_on` (1-based),
/// which returns `error` instead.
struct ScriptedCounter {
    inner: MemorySequenceCounter,
    calls: AtomicU32,
    fail_on: u32,
    error: PersistenceError,
}

impl ScriptedCounter {
    fn failing_on(fail_on: u32, error: PersistenceError) -> Self {
        Self {
            inner: MemorySequenceCounter::new(),
            calls: AtomicU32::new(0),
            fail_on,
            error,
        }
    }
}

impl SequenceCounter for ScriptedCounter {
    fn increment_by(&self, key: &CounterKey, delta: u64) -> Result<i64, PersistenceError> {
        let call: u32 = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(self.error.clone());
        }
        self.inner.increment_by(key, delta)
    }
}

fn counter_unavailable() -> PersistenceError {
    PersistenceError::CounterFailed {
        key: String::from("FriendGroupSeqKey"),
        message: String::from("connection refused"),
    }
}

#[test]
fn test_counter_failure_aborts_before_any_write() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_friend_graph(&mut persistence);
    let groups_before = persistence.list_friend_groups().unwrap();
    let counter = ScriptedCounter::failing_on(1, counter_unavailable());

    let result = persistence.migrate_friend_groups(
        &TransactionManager::new(RetryPolicy::with_attempts(3)),
        &counter,
        &create_test_options(),
    );

    assert_eq!(result, Err(counter_unavailable()));
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1, "counter failures are fatal");
    assert_eq!(persistence.list_friend_groups().unwrap(), groups_before);
}

#[test]
fn test_counter_failure_rolls_back_earlier_steps() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    let graph = seed_friend_graph(&mut persistence);
    let groups_before = persistence.list_friend_groups().unwrap();
    let friends_before = persistence.list_friends().unwrap();
    // Inserts and refreshes succeed; the friend reservation fails.
    let counter = ScriptedCounter::failing_on(3, counter_unavailable());

    let result = persistence.migrate_friend_groups(
        &TransactionManager::default(),
        &counter,
        &create_test_options(),
    );

    assert!(matches!(result, Err(PersistenceError::CounterFailed { .. })));
    assert_eq!(persistence.list_friend_groups().unwrap(), groups_before);
    assert_eq!(persistence.list_friends().unwrap(), friends_before);
    assert!(
        default_named_groups(&mut persistence)
            .iter()
            .all(|group| group.id == graph.alice_default)
    );
}

#[test]
fn test_transient_conflict_restarts_the_whole_run() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_friend_graph(&mut persistence);
    let counter = ScriptedCounter::failing_on(
        2,
        PersistenceError::DatabaseError {
            kind: DatabaseFailure::SerializationFailure,
            message: String::from("could not serialize access"),
        },
    );

    let report = persistence
        .migrate_friend_groups(
            &TransactionManager::new(RetryPolicy::with_attempts(3)),
            &counter,
            &create_test_options(),
        )
        .unwrap();

    assert_eq!(report.attempts, 2);
    // The first attempt's reservation is burned, never reused.
    assert_eq!(bounds(report.inserted_default_versions), Some((2, 1)));
    assert_eq!(bounds(report.refreshed_default_versions), Some((3, 1)));
    assert_eq!(bounds(report.friend_versions), Some((1, 3)));
    assert_eq!(default_named_groups(&mut persistence).len(), 2);
}

#[test]
fn test_cancelled_run_does_not_start() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_friend_graph(&mut persistence);
    let groups_before = persistence.list_friend_groups().unwrap();
    let cancellation = Cancellation::new();
    cancellation.cancel();
    let manager = TransactionManager::default().with_cancellation(cancellation);
    let counter = MemorySequenceCounter::new();

    let result = persistence.migrate_friend_groups(&manager, &counter, &create_test_options());

    assert_eq!(result, Err(PersistenceError::Cancelled));
    assert!(counter.reservations().is_empty());
    assert_eq!(persistence.list_friend_groups().unwrap(), groups_before);
}

/// Cancels `cancellation` from inside its first increment, as a deadline
/// firing mid-run would.
struct CancellingCounter {
    inner: MemorySequenceCounter,
    calls: AtomicU32,
    cancellation: Cancellation,
}

impl SequenceCounter for CancellingCounter {
    fn increment_by(&self, key: &CounterKey, delta: u64) -> Result<i64, PersistenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cancellation.cancel();
        self.inner.increment_by(key, delta)
    }
}

#[test]
fn test_cancel_mid_run_rolls_back_every_step() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_friend_graph(&mut persistence);
    let groups_before = persistence.list_friend_groups().unwrap();
    let friends_before = persistence.list_friends().unwrap();
    let cancellation = Cancellation::new();
    let manager = TransactionManager::new(RetryPolicy::with_attempts(3))
        .with_cancellation(cancellation.clone());
    let counter = CancellingCounter {
        inner: MemorySequenceCounter::new(),
        calls: AtomicU32::new(0),
        cancellation,
    };

    let result = persistence.migrate_friend_groups(&manager, &counter, &create_test_options());

    assert_eq!(result, Err(PersistenceError::Cancelled));
    assert_eq!(
        counter.calls.load(Ordering::SeqCst),
        1,
        "no reservation may follow the cancel"
    );
    assert_eq!(persistence.list_friend_groups().unwrap(), groups_before);
    assert_eq!(persistence.list_friends().unwrap(), friends_before);
}

#[test]
fn test_cancel_during_friend_reservation_skips_reassignment() {
    let mut persistence = Persistence::new_in_memory().unwrap();
    seed_friend_graph(&mut persistence);
    let friends_before = persistence.list_friends().unwrap();
    let cancellation = Cancellation::new();
    let manager = TransactionManager::default().with_cancellation(cancellation.clone());
    let counter = CancellingCounter {
        inner: MemorySequenceCounter::new(),
        calls: AtomicU32::new(0),
        cancellation,
    };
    let mut options = create_test_options();
    options.skip_default_groups = true;

    let result = persistence.migrate_friend_groups(&manager, &counter, &options);

    assert_eq!(result, Err(PersistenceError::Cancelled));
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(persistence.list_friends().unwrap(), friends_before);
}

#[test]
fn test_file_store_with_separate_counter_database() {
    let dir = TempDir::new().unwrap();
    let mut persistence = Persistence::new_with_file(dir.path().join("store.db")).unwrap();
    seed_friend_graph(&mut persistence);
    let counter = DbSequenceCounter::open_sqlite(dir.path().join("sequences.db")).unwrap();
    let options = create_test_options();

    let report = persistence
        .migrate_friend_groups(&TransactionManager::default(), &counter, &options)
        .unwrap();

    assert_eq!(report.friends_to_update, 3);
    assert_eq!(counter.value(&options.friend_seq_key).unwrap(), 3);
    assert_eq!(counter.value(&options.friend_group_seq_key).unwrap(), 2);
}
