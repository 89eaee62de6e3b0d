// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Default friend group backfill.
//!
//! One run, inside one top-level transaction:
//!
//! 1. Snapshot groups already carrying the default name and seed owners
//!    lacking one.
//! 2. Insert the missing defaults, then refresh the existing ones, each
//!    with versions from its own reservation on the friend group counter.
//! 3. Resolve each owner's default group and each friendship's explicit
//!    group, and snapshot the friend rows pointing elsewhere.
//! 4. Reassign those friend rows with versions from the friend counter.
//!
//! A dry run stops after step 3 (skipping the writes of step 2), reports
//! the counts, and rolls back. Nothing is reserved and nothing persists.

pub mod steps;

use diesel::{MysqlConnection, SqliteConnection};
use regroup_domain::{FriendFilter, MigrationOptions, MigrationReport, SeedSource, TxOptions};
use tracing::info;

use crate::backend::PersistenceBackend;
use crate::error::PersistenceError;
use crate::sequence::{SequenceCounter, VersionAllocator};
use crate::tx::{TransactionManager, TxScope};

/// Backend dispatch for the monomorphic migration steps.
pub trait FriendGroupSteps {
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    fn snapshot_existing_defaults(&mut self, group_name: &str) -> Result<u64, PersistenceError>;

    /// # Errors
    ///
    /// Returns an error if a statement fails.
    fn snapshot_missing_defaults(
        &mut self,
        group_name: &str,
        seed: SeedSource,
    ) -> Result<u64, PersistenceError>;

    /// # Errors
    ///
    /// Returns an error if a statement fails.
    fn insert_missing_defaults(
        &mut self,
        group_name: &str,
        start: i64,
    ) -> Result<usize, PersistenceError>;

    /// # Errors
    ///
    /// Returns an error if a statement fails.
    fn refresh_existing_defaults(&mut self, start: i64) -> Result<usize, PersistenceError>;

    /// # Errors
    ///
    /// Returns an error if a statement fails.
    fn snapshot_friend_targets(&mut self) -> Result<(), PersistenceError>;

    /// # Errors
    ///
    /// Returns an error if a statement fails.
    fn snapshot_friend_candidates(
        &mut self,
        filter: FriendFilter,
        excluded_targets: &[String],
    ) -> Result<u64, PersistenceError>;

    /// # Errors
    ///
    /// Returns an error if a statement fails.
    fn reassign_friends(&mut self, start: i64) -> Result<usize, PersistenceError>;
}

macro_rules! impl_friend_group_steps {
    ($conn:ty, $suffix:ident) => {
        pastey::paste! {
            impl FriendGroupSteps for $conn {
                fn snapshot_existing_defaults(
                    &mut self,
                    group_name: &str,
                ) -> Result<u64, PersistenceError> {
                    steps::[<snapshot_existing_defaults_ $suffix>](self, group_name)
                }

                fn snapshot_missing_defaults(
                    &mut self,
                    group_name: &str,
                    seed: SeedSource,
                ) -> Result<u64, PersistenceError> {
                    steps::[<snapshot_missing_defaults_ $suffix>](self, group_name, seed)
                }

                fn insert_missing_defaults(
                    &mut self,
                    group_name: &str,
                    start: i64,
                ) -> Result<usize, PersistenceError> {
                    steps::[<insert_missing_defaults_ $suffix>](self, group_name, start)
                }

                fn refresh_existing_defaults(&mut self, start: i64) -> Result<usize, PersistenceError> {
                    steps::[<refresh_existing_defaults_ $suffix>](self, start)
                }

                fn snapshot_friend_targets(&mut self) -> Result<(), PersistenceError> {
                    steps::[<snapshot_friend_targets_ $suffix>](self)
                }

                fn snapshot_friend_candidates(
                    &mut self,
                    filter: FriendFilter,
                    excluded_targets: &[String],
                ) -> Result<u64, PersistenceError> {
                    steps::[<snapshot_friend_candidates_ $suffix>](self, filter, excluded_targets)
                }

                fn reassign_friends(&mut self, start: i64) -> Result<usize, PersistenceError> {
                    steps::[<reassign_friends_ $suffix>](self, start)
                }
            }
        }
    };
}

impl_friend_group_steps!(SqliteConnection, sqlite);
impl_friend_group_steps!(MysqlConnection, mysql);

/// Transaction options for a run: default isolation, read-write, with the
/// requested lock-wait timeout.
#[must_use]
pub fn transaction_options(options: &MigrationOptions) -> TxOptions {
    TxOptions {
        lock_timeout: options.lock_wait_timeout,
        savepoint_hint: Some(String::from("regroup")),
        ..TxOptions::default()
    }
}

/// Runs the migration through `manager`, retrying the whole run on
/// transient conflicts.
///
/// A dry run returns its report as `Ok` after the transaction has been
/// rolled back.
///
/// # Errors
///
/// Returns the first fatal error, the last transient error once the retry
/// budget is spent, or [`PersistenceError::Cancelled`].
pub fn migrate_friend_groups<C>(
    conn: &mut C,
    manager: &TransactionManager,
    counter: &dyn SequenceCounter,
    options: &MigrationOptions,
) -> Result<MigrationReport, PersistenceError>
where
    C: PersistenceBackend + FriendGroupSteps,
{
    info!(
        default_name = %options.default_group_name,
        dry_run = options.dry_run,
        seed = %options.seed_source,
        skip_default_groups = options.skip_default_groups,
        "Starting friend group migration"
    );

    let tx_options: TxOptions = transaction_options(options);
    let mut attempts: u32 = 0;
    let mut dry_run_report: Option<MigrationReport> = None;

    let outcome: Result<MigrationReport, PersistenceError> =
        manager.run(conn, &tx_options, |conn, scope| {
            attempts += 1;
            let report: MigrationReport = run_steps(conn, scope, counter, options)?;
            if options.dry_run {
                info!(
                    existing_defaults = report.existing_defaults,
                    missing_defaults = report.missing_defaults,
                    friends_to_update = report.friends_to_update,
                    "Dry run complete; rolling back"
                );
                dry_run_report = Some(report);
                return Err(PersistenceError::DryRunRollback);
            }
            Ok(report)
        });

    let mut report: MigrationReport = match outcome {
        Ok(report) => report,
        Err(PersistenceError::DryRunRollback) => dry_run_report.ok_or_else(|| {
            PersistenceError::Other(String::from("Dry run finished without a report"))
        })?,
        Err(err) => return Err(err),
    };
    report.attempts = attempts;

    info!(
        attempts,
        versions_consumed = report.versions_consumed(),
        "Friend group migration finished"
    );
    Ok(report)
}

fn run_steps<C>(
    conn: &mut C,
    scope: &TxScope,
    counter: &dyn SequenceCounter,
    options: &MigrationOptions,
) -> Result<MigrationReport, PersistenceError>
where
    C: PersistenceBackend + FriendGroupSteps,
{
    let allocator: VersionAllocator<'_> =
        VersionAllocator::new(counter).with_cancellation(scope.cancellation());
    let group_name: &str = options.default_group_name.as_str();
    let mut report: MigrationReport = MigrationReport {
        dry_run: options.dry_run,
        ..MigrationReport::default()
    };

    steps::reset_temp_tables(conn)?;

    if options.skip_default_groups {
        info!("Skipping default group backfill");
    } else {
        scope.check_cancelled()?;
        report.existing_defaults = conn.snapshot_existing_defaults(group_name)?;
        report.missing_defaults = conn.snapshot_missing_defaults(group_name, options.seed_source)?;
        info!(
            existing = report.existing_defaults,
            missing = report.missing_defaults,
            "Default group snapshot taken"
        );

        if !options.dry_run {
            if report.missing_defaults > 0 {
                let range = allocator.reserve(&options.friend_group_seq_key, report.missing_defaults)?;
                let inserted: usize = conn.insert_missing_defaults(group_name, range.start())?;
                let last: i64 = range.confirm_stamped(row_count(inserted)?)?;
                info!(inserted, start = range.start(), last, "Inserted missing default groups");
                report.inserted_default_versions = Some(range);
            }

            if report.existing_defaults > 0 {
                let range =
                    allocator.reserve(&options.friend_group_seq_key, report.existing_defaults)?;
                scope.check_cancelled()?;
                let refreshed: usize = conn.refresh_existing_defaults(range.start())?;
                let last: i64 = range.confirm_stamped(row_count(refreshed)?)?;
                info!(refreshed, start = range.start(), last, "Refreshed existing default groups");
                report.refreshed_default_versions = Some(range);
            }
        }
    }

    scope.check_cancelled()?;
    conn.snapshot_friend_targets()?;
    report.friends_to_update =
        conn.snapshot_friend_candidates(options.friend_filter, &options.excluded_targets)?;
    info!(count = report.friends_to_update, "Friend candidates snapshot taken");

    if !options.dry_run && report.friends_to_update > 0 {
        let range = allocator.reserve(&options.friend_seq_key, report.friends_to_update)?;
        scope.check_cancelled()?;
        let reassigned: usize = conn.reassign_friends(range.start())?;
        let last: i64 = range.confirm_stamped(row_count(reassigned)?)?;
        info!(reassigned, start = range.start(), last, "Reassigned friends");
        report.friend_versions = Some(range);
    }

    steps::drop_temp_tables(conn)?;
    Ok(report)
}

fn row_count(rows: usize) -> Result<u64, PersistenceError> {
    u64::try_from(rows)
        .map_err(|_| PersistenceError::QueryFailed(format!("Row count {rows} out of range")))
}
