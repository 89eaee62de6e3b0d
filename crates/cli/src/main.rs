// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

#![deny(
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::multiple_crate_versions)]

mod args;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use regroup_domain::{MigrationOptions, MigrationReport};
use regroup_persistence::{
    Cancellation, DbSequenceCounter, Persistence, PersistenceError, TransactionManager,
};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::args::{Args, Target};

/// How long a cancelled run may take to roll back before it is abandoned.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let args: Args = Args::parse();
    logging::init(args.log_level(), args.log_format);

    if let Err(e) = color_eyre::install() {
        error!("Failed to install error reporting: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!("Migration failed: {e:?}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let store: Target = args.store()?;
    let counter: Target = args.counter()?;
    let options: MigrationOptions = args
        .migration_options()
        .wrap_err("Invalid migration options")?;
    let cancellation: Cancellation = Cancellation::new();

    info!(
        store = ?store,
        counter = ?counter,
        default_name = %options.default_group_name,
        dry_run = options.dry_run,
        "Resolved store and counter"
    );

    let stopped: Arc<Notify> = Arc::new(Notify::new());

    let on_interrupt: Cancellation = cancellation.clone();
    let interrupt_stopped: Arc<Notify> = Arc::clone(&stopped);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling migration");
            on_interrupt.cancel();
            interrupt_stopped.notify_one();
        }
    });

    let deadline = args.deadline();
    let on_deadline: Cancellation = cancellation.clone();
    let deadline_stopped: Arc<Notify> = Arc::clone(&stopped);
    let timer = tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        warn!(?deadline, "Deadline reached, cancelling migration");
        on_deadline.cancel();
        deadline_stopped.notify_one();
    });

    let manager: TransactionManager =
        TransactionManager::new(args.retry_policy()).with_cancellation(cancellation);
    let mut task =
        tokio::task::spawn_blocking(move || migrate(&store, &counter, &manager, &options));

    let joined = tokio::select! {
        joined = &mut task => joined,
        () = stopped.notified() => {
            // The worker rolls back at its next checkpoint. A statement stuck
            // in the database is not waited on; exiting drops the connection.
            if let Ok(joined) = tokio::time::timeout(CANCEL_GRACE, &mut task).await {
                joined
            } else {
                interrupt.abort();
                timer.abort();
                return Err(eyre!(
                    "Migration cancelled; worker did not stop within {CANCEL_GRACE:?}"
                ));
            }
        }
    };

    interrupt.abort();
    timer.abort();

    let report: MigrationReport = joined.wrap_err("Migration task did not complete")??;
    info!(
        dry_run = report.dry_run,
        attempts = report.attempts,
        existing_defaults = report.existing_defaults,
        missing_defaults = report.missing_defaults,
        friends_to_update = report.friends_to_update,
        inserted_default_versions = ?report.inserted_default_versions,
        refreshed_default_versions = ?report.refreshed_default_versions,
        friend_versions = ?report.friend_versions,
        versions_consumed = report.versions_consumed(),
        "Migration report"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn migrate(
    store: &Target,
    counter: &Target,
    manager: &TransactionManager,
    options: &MigrationOptions,
) -> Result<MigrationReport, PersistenceError> {
    let counter: DbSequenceCounter = match counter {
        Target::Sqlite(path) => DbSequenceCounter::open_sqlite(path)?,
        Target::Mysql(url) => DbSequenceCounter::open_mysql(url)?,
    };
    let mut persistence: Persistence = match store {
        Target::Sqlite(path) => Persistence::new_with_file(path)?,
        Target::Mysql(url) => Persistence::new_with_mysql(url)?,
    };
    persistence.migrate_friend_groups(manager, &counter, options)
}
