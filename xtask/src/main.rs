// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! # xtask - Project Automation
//!
//! `cargo test` runs everything against `SQLite` and needs no services.
//! Backend coverage for `MariaDB` is opt-in:
//!
//! - `cargo xtask test-mariadb` runs the ignored backend validation tests of
//!   `regroup-persistence` against a throwaway `MariaDB` 11 container
//! - `cargo xtask verify-migrations` applies both migration trees and checks
//!   that they produce the same tables, columns, keys and indexes
//!
//! Containers are removed when the command ends, whether it succeeded or not.

#![deny(
    clippy::pedantic,
    //clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all
)]

use std::collections::{BTreeMap, BTreeSet};
use std::{io, process::Output, thread::sleep, time::Duration};

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use color_eyre::{
    eyre::{eyre, Context},
    Result,
};
use diesel::sql_types::{Integer, Text};
use diesel::{Connection, MysqlConnection, QueryableByName, RunQueryDsl, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use duct::cmd;
use tracing::level_filters::LevelFilter;
use tracing_log::AsTrace;

const PERSISTENCE_PACKAGE: &str = "regroup-persistence";
const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("../crates/persistence/migrations");
const MYSQL_MIGRATIONS: EmbeddedMigrations =
    embed_migrations!("../crates/persistence/migrations_mysql");

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .without_time()
        .init();

    match args.run() {
        Ok(()) => (),
        Err(err) => {
            tracing::error!("{err}");
            std::process::exit(1);
        }
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[command(bin_name = "cargo xtask", styles = clap_cargo::style::CLAP_STYLING)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

impl Args {
    fn run(self) -> Result<()> {
        self.command.run()
    }

    fn log_level(&self) -> LevelFilter {
        self.verbosity.log_level_filter().as_trace()
    }
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Lint, check and run the `SQLite` test suite
    CI,

    /// Run cargo check
    #[command(visible_alias = "c")]
    Check,

    /// Lint formatting and clippy
    #[command(visible_alias = "l")]
    Lint,

    /// Run clippy on the workspace
    #[command(visible_alias = "cl")]
    LintClippy,

    /// Check formatting of the workspace
    #[command(visible_alias = "lf")]
    LintFormatting,

    /// Run the `SQLite` test suite
    #[command(visible_alias = "t")]
    Test,

    /// Run `MariaDB` backend validation tests
    #[command(visible_alias = "tm")]
    TestMariadb,

    /// Verify schema parity between `SQLite` and `MySQL` migrations
    #[command(visible_alias = "vm")]
    VerifyMigrations,
}

impl Command {
    fn run(self) -> Result<()> {
        match self {
            Self::CI => ci(),
            Self::Check => check(),
            Self::Lint => lint(),
            Self::LintClippy => lint_clippy(),
            Self::LintFormatting => lint_format(),
            Self::Test => test(),
            Self::TestMariadb => test_mariadb(),
            Self::VerifyMigrations => verify_migrations(),
        }
    }
}

/// Lint, check and run the `SQLite` test suite
fn ci() -> Result<()> {
    lint()?;
    check()?;
    test()?;
    Ok(())
}

/// Run cargo check
fn check() -> Result<()> {
    run_cargo(vec!["check", "--workspace", "--all-targets"])
}

/// Lint formatting and clippy
fn lint() -> Result<()> {
    lint_format()?;
    lint_clippy()?;
    Ok(())
}

/// Run clippy with warnings denied
fn lint_clippy() -> Result<()> {
    run_cargo(vec![
        "clippy",
        "--workspace",
        "--all-targets",
        "--",
        "-D",
        "warnings",
    ])
}

/// Check formatting of the workspace
fn lint_format() -> Result<()> {
    run_cargo(vec!["fmt", "--all", "--check"])
}

/// Run every crate's tests against `SQLite`. The `MariaDB` tests stay
/// ignored; see [`test_mariadb`].
fn test() -> Result<()> {
    run_cargo(vec!["test", "--workspace", "--all-targets"])
}

/// Run a cargo subcommand with the default toolchain
fn run_cargo(args: Vec<&str>) -> Result<()> {
    cmd("cargo", args).run_with_trace()?;
    Ok(())
}

/// A `MariaDB` 11 container that is stopped and removed on drop.
struct MariaDbContainer {
    name: &'static str,
    database: &'static str,
    user: &'static str,
    password: &'static str,
    port: u16,
}

impl MariaDbContainer {
    const READY_ATTEMPTS: u32 = 30;

    /// Starts a fresh container and waits until it accepts queries.
    fn start(
        name: &'static str,
        database: &'static str,
        password: &'static str,
        port: u16,
    ) -> Result<Self> {
        tracing::info!("Checking Docker availability");
        cmd!("docker", "--version")
            .run_with_trace()
            .wrap_err("Docker is not available. Please install Docker.")?;

        let container = Self {
            name,
            database,
            user: "regroup",
            password,
            port,
        };
        // Left over from an interrupted run.
        container.remove();

        tracing::info!("Starting MariaDB container: {}", container.name);
        cmd!(
            "docker",
            "run",
            "--name",
            container.name,
            "-e",
            format!("MARIADB_DATABASE={}", container.database),
            "-e",
            format!("MARIADB_USER={}", container.user),
            "-e",
            format!("MARIADB_PASSWORD={}", container.password),
            "-e",
            "MARIADB_ROOT_PASSWORD=root_password",
            "-p",
            format!("{}:3306", container.port),
            "-d",
            "mariadb:11"
        )
        .run_with_trace()
        .wrap_err("Failed to start MariaDB container")?;

        container.wait_until_ready()?;
        Ok(container)
    }

    fn wait_until_ready(&self) -> Result<()> {
        tracing::info!("Waiting for MariaDB to be ready...");
        for attempt in 1..=Self::READY_ATTEMPTS {
            sleep(Duration::from_secs(1));
            tracing::debug!("Connection attempt {}/{}", attempt, Self::READY_ATTEMPTS);

            let probe = cmd!(
                "docker",
                "exec",
                self.name,
                "mariadb",
                "-u",
                self.user,
                format!("-p{}", self.password),
                "-e",
                "SELECT 1"
            )
            .stdout_null()
            .stderr_null()
            .run();

            if probe.is_ok() {
                tracing::info!("MariaDB is ready");
                return Ok(());
            }
        }
        Err(eyre!("MariaDB did not become ready within timeout"))
    }

    fn url(&self) -> String {
        format!(
            "mysql://{}:{}@127.0.0.1:{}/{}",
            self.user, self.password, self.port, self.database
        )
    }

    fn remove(&self) {
        let _ = cmd!("docker", "stop", self.name)
            .stdout_null()
            .stderr_null()
            .run();
        let _ = cmd!("docker", "rm", self.name)
            .stdout_null()
            .stderr_null()
            .run();
    }
}

impl Drop for MariaDbContainer {
    fn drop(&mut self) {
        tracing::info!("Stopping MariaDB container: {}", self.name);
        self.remove();
    }
}

/// Run `MariaDB` backend validation tests
///
/// Starts a `MariaDB` 11 container on port 3307 and runs the ignored
/// `backend_validation_tests` of `regroup-persistence` against it with
/// `DATABASE_URL` and `REGROUP_TEST_BACKEND=mariadb` set. The tests share
/// one database, so they run on a single thread.
///
/// Requires Docker and the `MySQL` client libraries.
fn test_mariadb() -> Result<()> {
    tracing::info!("Starting MariaDB backend validation");
    let container = MariaDbContainer::start(
        "regroup-test-mariadb",
        "regroup_test",
        "test_password",
        3307,
    )?;

    tracing::info!("Running MariaDB backend validation tests");
    cmd!(
        "cargo",
        "test",
        "--package",
        PERSISTENCE_PACKAGE,
        "backend_validation_tests",
        "--",
        "--ignored",
        "--test-threads=1"
    )
    .env("DATABASE_URL", container.url())
    .env("REGROUP_TEST_BACKEND", "mariadb")
    .run_with_trace()
    .wrap_err("MariaDB backend validation tests failed")?;

    tracing::info!("MariaDB backend validation completed successfully");
    Ok(())
}

/// Verify schema parity between `SQLite` and `MySQL` migrations
///
/// Applies `migrations/` to an in-memory `SQLite` database and
/// `migrations_mysql/` to a `MariaDB` container on port 3308, then compares
/// tables, columns (normalized type and nullability), primary keys, foreign
/// keys and the `idx_` indexes. Any difference fails the command.
fn verify_migrations() -> Result<()> {
    tracing::info!("Starting schema parity verification");
    let container = MariaDbContainer::start(
        "regroup-verify-migrations",
        "regroup_verify",
        "verify_password",
        3308,
    )?;

    tracing::info!("Applying SQLite migrations");
    let mut sqlite_conn = SqliteConnection::establish(":memory:")
        .wrap_err("Failed to create SQLite in-memory database")?;
    diesel::sql_query("PRAGMA foreign_keys = ON")
        .execute(&mut sqlite_conn)
        .wrap_err("Failed to enable foreign keys on SQLite")?;
    sqlite_conn
        .run_pending_migrations(SQLITE_MIGRATIONS)
        .map_err(|e| eyre!("Failed to apply SQLite migrations: {e}"))?;

    tracing::info!("Applying MySQL migrations");
    let mut mysql_conn =
        MysqlConnection::establish(&container.url()).wrap_err("Failed to connect to MariaDB")?;
    mysql_conn
        .run_pending_migrations(MYSQL_MIGRATIONS)
        .map_err(|e| eyre!("Failed to apply MySQL migrations: {e}"))?;

    tracing::info!("Comparing schemas");
    let sqlite_schema = introspect_sqlite_schema(&mut sqlite_conn)?;
    let mysql_schema = introspect_mysql_schema(&mut mysql_conn)?;
    compare_schemas(&sqlite_schema, &mysql_schema)?;

    tracing::info!("✓ Schema parity verification passed");
    Ok(())
}

/// Normalized schema, keyed by table name.
type Schema = BTreeMap<String, Table>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Table {
    columns: BTreeMap<String, Column>,
    primary_keys: BTreeSet<String>,
    foreign_keys: BTreeSet<ForeignKey>,
    indexes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Column {
    normalized_type: &'static str,
    nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ForeignKey {
    from_column: String,
    to_table: String,
    to_column: String,
}

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = Text)]
    name: String,
}

/// Introspect `SQLite` schema
fn introspect_sqlite_schema(conn: &mut SqliteConnection) -> Result<Schema> {
    #[derive(QueryableByName)]
    struct ColumnRow {
        #[diesel(sql_type = Text)]
        name: String,
        #[diesel(sql_type = Text)]
        column_type: String,
        #[diesel(sql_type = Integer)]
        not_null: i32,
        #[diesel(sql_type = Integer)]
        pk: i32,
    }

    #[derive(QueryableByName)]
    struct ForeignKeyRow {
        #[diesel(sql_type = Text)]
        from_column: String,
        #[diesel(sql_type = Text)]
        to_table: String,
        #[diesel(sql_type = Text)]
        to_column: String,
    }

    let tables: Vec<NameRow> = diesel::sql_query(
        "SELECT name FROM sqlite_master
         WHERE type = 'table'
           AND name NOT LIKE 'sqlite_%'
           AND name <> '__diesel_schema_migrations'",
    )
    .load(conn)
    .wrap_err("Failed to list SQLite tables")?;

    let mut schema = Schema::new();
    for table in tables {
        let mut info = Table::default();

        let columns: Vec<ColumnRow> = diesel::sql_query(
            "SELECT name, type AS column_type, \"notnull\" AS not_null, pk
             FROM pragma_table_info(?)",
        )
        .bind::<Text, _>(&table.name)
        .load(conn)
        .wrap_err_with(|| format!("Failed to read columns of {}", table.name))?;
        for column in columns {
            let primary = column.pk > 0;
            if primary {
                info.primary_keys.insert(column.name.clone());
            }
            info.columns.insert(
                column.name,
                Column {
                    normalized_type: normalize_sqlite_type(&column.column_type),
                    // table_info reports INTEGER PRIMARY KEY columns as nullable
                    nullable: column.not_null == 0 && !primary,
                },
            );
        }

        let foreign_keys: Vec<ForeignKeyRow> = diesel::sql_query(
            "SELECT \"from\" AS from_column, \"table\" AS to_table, \"to\" AS to_column
             FROM pragma_foreign_key_list(?)",
        )
        .bind::<Text, _>(&table.name)
        .load(conn)
        .wrap_err_with(|| format!("Failed to read foreign keys of {}", table.name))?;
        info.foreign_keys
            .extend(foreign_keys.into_iter().map(|fk| ForeignKey {
                from_column: fk.from_column,
                to_table: fk.to_table,
                to_column: fk.to_column,
            }));

        let indexes: Vec<NameRow> = diesel::sql_query(
            "SELECT name FROM pragma_index_list(?) WHERE name LIKE 'idx\\_%' ESCAPE '\\'",
        )
        .bind::<Text, _>(&table.name)
        .load(conn)
        .wrap_err_with(|| format!("Failed to read indexes of {}", table.name))?;
        for index in indexes {
            let columns: Vec<NameRow> =
                diesel::sql_query("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                    .bind::<Text, _>(&index.name)
                    .load(conn)
                    .wrap_err_with(|| format!("Failed to read index {}", index.name))?;
            info.indexes.insert(
                index.name,
                columns.into_iter().map(|column| column.name).collect(),
            );
        }

        schema.insert(table.name, info);
    }

    Ok(schema)
}

/// Introspect `MySQL` schema of the connected database
fn introspect_mysql_schema(conn: &mut MysqlConnection) -> Result<Schema> {
    #[derive(QueryableByName)]
    struct ColumnRow {
        #[diesel(sql_type = Text)]
        table_name: String,
        #[diesel(sql_type = Text)]
        column_name: String,
        #[diesel(sql_type = Text)]
        data_type: String,
        #[diesel(sql_type = Text)]
        is_nullable: String,
        #[diesel(sql_type = Text)]
        column_key: String,
    }

    #[derive(QueryableByName)]
    struct ForeignKeyRow {
        #[diesel(sql_type = Text)]
        table_name: String,
        #[diesel(sql_type = Text)]
        from_column: String,
        #[diesel(sql_type = Text)]
        to_table: String,
        #[diesel(sql_type = Text)]
        to_column: String,
    }

    #[derive(QueryableByName)]
    struct IndexRow {
        #[diesel(sql_type = Text)]
        table_name: String,
        #[diesel(sql_type = Text)]
        index_name: String,
        #[diesel(sql_type = Text)]
        column_name: String,
    }

    let mut schema = Schema::new();

    let columns: Vec<ColumnRow> = diesel::sql_query(
        "SELECT TABLE_NAME AS table_name, COLUMN_NAME AS column_name,
                DATA_TYPE AS data_type, IS_NULLABLE AS is_nullable,
                COLUMN_KEY AS column_key
         FROM information_schema.columns
         WHERE TABLE_SCHEMA = DATABASE()
           AND TABLE_NAME <> '__diesel_schema_migrations'
         ORDER BY TABLE_NAME, ORDINAL_POSITION",
    )
    .load(conn)
    .wrap_err("Failed to read MySQL columns")?;
    for column in columns {
        let table = schema.entry(column.table_name).or_default();
        if column.column_key == "PRI" {
            table.primary_keys.insert(column.column_name.clone());
        }
        table.columns.insert(
            column.column_name,
            Column {
                normalized_type: normalize_mysql_type(&column.data_type),
                nullable: column.is_nullable == "YES",
            },
        );
    }

    let foreign_keys: Vec<ForeignKeyRow> = diesel::sql_query(
        "SELECT TABLE_NAME AS table_name, COLUMN_NAME AS from_column,
                REFERENCED_TABLE_NAME AS to_table, REFERENCED_COLUMN_NAME AS to_column
         FROM information_schema.key_column_usage
         WHERE TABLE_SCHEMA = DATABASE()
           AND REFERENCED_TABLE_NAME IS NOT NULL",
    )
    .load(conn)
    .wrap_err("Failed to read MySQL foreign keys")?;
    for fk in foreign_keys {
        schema
            .entry(fk.table_name)
            .or_default()
            .foreign_keys
            .insert(ForeignKey {
                from_column: fk.from_column,
                to_table: fk.to_table,
                to_column: fk.to_column,
            });
    }

    let indexes: Vec<IndexRow> = diesel::sql_query(
        "SELECT TABLE_NAME AS table_name, INDEX_NAME AS index_name,
                COLUMN_NAME AS column_name
         FROM information_schema.statistics
         WHERE TABLE_SCHEMA = DATABASE()
           AND INDEX_NAME LIKE 'idx\\_%'
         ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX",
    )
    .load(conn)
    .wrap_err("Failed to read MySQL indexes")?;
    for index in indexes {
        schema
            .entry(index.table_name)
            .or_default()
            .indexes
            .entry(index.index_name)
            .or_default()
            .push(index.column_name);
    }

    Ok(schema)
}

/// Normalize `SQLite` type to common representation
fn normalize_sqlite_type(sqlite_type: &str) -> &'static str {
    let normalized = sqlite_type.to_uppercase();
    if normalized.contains("INT") {
        "integer"
    } else if normalized.contains("REAL")
        || normalized.contains("FLOA")
        || normalized.contains("DOUB")
    {
        "real"
    } else if normalized.contains("BLOB") {
        "blob"
    } else {
        "text"
    }
}

/// Normalize `MySQL` type to common representation
fn normalize_mysql_type(mysql_type: &str) -> &'static str {
    match mysql_type.to_uppercase().as_str() {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => "integer",
        "DECIMAL" | "NUMERIC" | "FLOAT" | "DOUBLE" | "REAL" => "real",
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => "blob",
        _ => "text",
    }
}

/// Compare schemas and fail on mismatch
fn compare_schemas(sqlite_schema: &Schema, mysql_schema: &Schema) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    for name in sqlite_schema.keys() {
        if !mysql_schema.contains_key(name) {
            errors.push(format!("  - Table '{name}' exists in SQLite but not in MySQL"));
        }
    }
    for name in mysql_schema.keys() {
        if !sqlite_schema.contains_key(name) {
            errors.push(format!("  - Table '{name}' exists in MySQL but not in SQLite"));
        }
    }

    for (name, sqlite_table) in sqlite_schema {
        let Some(mysql_table) = mysql_schema.get(name) else {
            continue;
        };
        if sqlite_table.columns != mysql_table.columns {
            errors.push(format!(
                "  - Table '{name}' columns differ:\n      SQLite: {:?}\n      MySQL:  {:?}",
                sqlite_table.columns, mysql_table.columns
            ));
        }
        if sqlite_table.primary_keys != mysql_table.primary_keys {
            errors.push(format!(
                "  - Table '{name}' primary keys differ: SQLite {:?}, MySQL {:?}",
                sqlite_table.primary_keys, mysql_table.primary_keys
            ));
        }
        if sqlite_table.foreign_keys != mysql_table.foreign_keys {
            errors.push(format!(
                "  - Table '{name}' foreign keys differ: SQLite {:?}, MySQL {:?}",
                sqlite_table.foreign_keys, mysql_table.foreign_keys
            ));
        }
        if sqlite_table.indexes != mysql_table.indexes {
            errors.push(format!(
                "  - Table '{name}' indexes differ: SQLite {:?}, MySQL {:?}",
                sqlite_table.indexes, mysql_table.indexes
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(eyre!(
            "Schema parity verification failed:\n{}",
            errors.join("\n")
        ))
    }
}

/// An extension trait for `duct::Expression` that logs the command being run
/// before running it.
trait ExpressionExt {
    /// Run the command and log the command being run
    fn run_with_trace(&self) -> io::Result<Output>;
}

impl ExpressionExt for duct::Expression {
    fn run_with_trace(&self) -> io::Result<Output> {
        tracing::info!("running command: {:?}", self);
        self.run().inspect_err(|_| {
            // The command that was run may have scrolled off the screen, so repeat it here
            tracing::error!("failed to run command: {:?}", self);
        })
    }
}
