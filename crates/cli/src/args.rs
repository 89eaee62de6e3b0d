// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use color_eyre::eyre::{Result, eyre};
use regroup_domain::{
    DEFAULT_FRIEND_GROUP_SEQ_KEY, DEFAULT_FRIEND_SEQ_KEY, DEFAULT_GROUP_NAME, DomainError,
    FriendFilter, MigrationOptions, RetryPolicy, SeedSource,
};
use tracing::level_filters::LevelFilter;
use tracing_log::AsTrace;

/// Suffix of the default `SQLite` counter database next to a `SQLite` store.
pub const COUNTER_DATABASE_SUFFIX: &str = ".sequences.db";

/// regroup-migrate - backfill default friend groups and move friends into them
#[derive(Parser, Debug)]
#[command(name = "regroup-migrate", author, version, about, long_about = None)]
pub struct Args {
    /// Path to the `SQLite` store
    #[arg(
        long,
        value_name = "PATH",
        required_unless_present = "mysql_url",
        conflicts_with = "mysql_url"
    )]
    pub database: Option<PathBuf>,

    /// `MySQL`/`MariaDB` URL of the store
    #[arg(long, value_name = "URL")]
    pub mysql_url: Option<String>,

    /// Path to the `SQLite` version counter database
    /// [default: `<database>.sequences.db`, or the store itself for `MySQL`]
    #[arg(long, value_name = "PATH", conflicts_with = "counter_mysql_url")]
    pub counter_database: Option<PathBuf>,

    /// `MySQL`/`MariaDB` URL of the version counter database
    #[arg(long, value_name = "URL")]
    pub counter_mysql_url: Option<String>,

    /// Display name of the default friend group
    #[arg(long, default_value = DEFAULT_GROUP_NAME)]
    pub default_name: String,

    /// Report what would change, then roll back without consuming versions
    #[arg(long)]
    pub dry_run: bool,

    /// Session lock-wait timeout for the migration transaction
    #[arg(long, value_name = "SECS")]
    pub lock_wait_timeout: Option<u64>,

    /// Counter key for friend row versions
    #[arg(long, default_value = DEFAULT_FRIEND_SEQ_KEY)]
    pub friend_seq_key: String,

    /// Counter key for friend group row versions
    #[arg(long, default_value = DEFAULT_FRIEND_GROUP_SEQ_KEY)]
    pub friend_group_seq_key: String,

    /// Owners that should have a default group: users, friends or both
    #[arg(long, value_name = "SOURCE", default_value = "users", value_parser = SeedSource::from_str)]
    pub seed_defaults_from: SeedSource,

    /// Leave friend groups untouched and only reassign friends
    #[arg(long)]
    pub skip_friend_group: bool,

    /// Reassign soft-deleted friend rows instead of active ones
    #[arg(long)]
    pub only_deleted_friends: bool,

    /// Friend target that is never reassigned (repeatable)
    #[arg(long = "exclude-target", value_name = "UID")]
    pub exclude_targets: Vec<String>,

    /// Attempts before a transient conflict becomes fatal
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Overall deadline after which the run is cancelled
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub timeout: u64,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Where a store or counter lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Sqlite(PathBuf),
    Mysql(String),
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        self.verbosity.log_level_filter().as_trace()
    }

    /// The store to migrate.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `--database` nor `--mysql-url` was given.
    pub fn store(&self) -> Result<Target> {
        match (&self.database, &self.mysql_url) {
            (Some(path), None) => Ok(Target::Sqlite(path.clone())),
            (None, Some(url)) => Ok(Target::Mysql(url.clone())),
            _ => Err(eyre!("exactly one of --database or --mysql-url is required")),
        }
    }

    /// The version counter database.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is missing or a `SQLite` counter would
    /// share the store's file.
    pub fn counter(&self) -> Result<Target> {
        let store: Target = self.store()?;
        let counter: Target = match (&self.counter_database, &self.counter_mysql_url) {
            (Some(path), _) => Target::Sqlite(path.clone()),
            (None, Some(url)) => Target::Mysql(url.clone()),
            (None, None) => match &store {
                Target::Sqlite(path) => Target::Sqlite(counter_path_for(path)),
                Target::Mysql(url) => Target::Mysql(url.clone()),
            },
        };

        if matches!((&store, &counter), (Target::Sqlite(a), Target::Sqlite(b)) if a == b) {
            return Err(eyre!(
                "the SQLite counter database must be a different file than the store"
            ));
        }
        Ok(counter)
    }

    /// Migration options built from the flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the group name or a counter key is blank, or
    /// both keys are equal.
    pub fn migration_options(&self) -> Result<MigrationOptions, DomainError> {
        let mut options: MigrationOptions = MigrationOptions::new(
            &self.default_name,
            &self.friend_seq_key,
            &self.friend_group_seq_key,
        )?
        .with_dry_run(self.dry_run)
        .with_lock_wait_timeout(self.lock_wait_timeout.map(Duration::from_secs));

        options.seed_source = self.seed_defaults_from;
        options.skip_default_groups = self.skip_friend_group;
        options.friend_filter = if self.only_deleted_friends {
            FriendFilter::DeletedOnly
        } else {
            FriendFilter::ActiveOnly
        };
        options.excluded_targets.clone_from(&self.exclude_targets);
        Ok(options)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_attempts(self.max_attempts)
    }

    pub const fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn counter_path_for(store: &Path) -> PathBuf {
    let mut name: OsString = store.as_os_str().to_owned();
    name.push(COUNTER_DATABASE_SUFFIX);
    PathBuf::from(name)
}
