// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Database Schema Migration Framework
//!
//! Versioned schema migrations applied in one transaction. Applied versions
//! are tracked in a `schema_version` table.

use rusqlite::Connection;
use std::time::{SystemTime, UNIX_EPOCH};

use super::StorageError;

/// A single schema migration step.
pub struct Migration {
    /// Monotonically increasing version number (starting at 1).
    pub version: u32,
    pub name: &'static str,
    pub action: MigrationAction,
}

/// The action a migration performs.
pub enum MigrationAction {
    Sql(&'static str),
}

/// Runs schema migrations against a database connection.
pub struct MigrationRunner;

impl MigrationRunner {
    /// Runs all pending migrations in a single transaction.
    ///
    /// If any migration fails, all changes are rolled back.
    pub fn run(conn: &Connection, migrations: &[Migration]) -> Result<(), StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );",
        )?;

        let current_version = Self::current_version(conn)?;

        let pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| m.version > current_version)
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        for window in pending.windows(2) {
            if window[0].version >= window[1].version {
                return Err(StorageError::Migration(format!(
                    "Migrations are not in order: v{} before v{}",
                    window[0].version, window[1].version
                )));
            }
        }

        conn.execute_batch("BEGIN EXCLUSIVE TRANSACTION;")?;

        for migration in &pending {
            let MigrationAction::Sql(sql) = &migration.action;
            if let Err(e) = conn.execute_batch(sql) {
                conn.execute_batch("ROLLBACK;")?;
                return Err(StorageError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e
                )));
            }

            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();

            if let Err(e) = conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![migration.version, now as i64],
            ) {
                conn.execute_batch("ROLLBACK;")?;
                return Err(StorageError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e
                )));
            }
        }

        conn.execute_batch("COMMIT;")?;
        tracing::debug!(
            from = current_version,
            to = pending.last().map(|m| m.version).unwrap_or(current_version),
            "storage schema migrated"
        );
        Ok(())
    }

    /// Returns the current schema version, or 0 if no migrations have been applied.
    pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
        let table_exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        let version: Option<u32> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap_or(None);

        Ok(version.unwrap_or(0))
    }
}

/// Returns all registered migrations in version order.
///
/// New migrations are appended to the end of this list.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "baseline_kv",
            action: MigrationAction::Sql(MIGRATION_V1_BASELINE),
        },
    ]
}

const MIGRATION_V1_BASELINE: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationRunner::run(&conn, &all_migrations()).unwrap();
        assert_eq!(MigrationRunner::current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_baseline_kv_has_key_and_value_only() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationRunner::run(&conn, &all_migrations()).unwrap();

        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('kv')").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(columns, vec!["key".to_string(), "value".to_string()]);
    }

    #[test]
    fn test_rerun_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationRunner::run(&conn, &all_migrations()).unwrap();
        MigrationRunner::run(&conn, &all_migrations()).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        let migrations = vec![
            Migration {
                version: 1,
                name: "ok",
                action: MigrationAction::Sql("CREATE TABLE a (x INTEGER);"),
            },
            Migration {
                version: 2,
                name: "broken",
                action: MigrationAction::Sql("THIS IS NOT SQL;"),
            },
        ];

        let result = MigrationRunner::run(&conn, &migrations);
        assert!(matches!(result, Err(StorageError::Migration(_))));
        assert_eq!(MigrationRunner::current_version(&conn).unwrap(), 0);

        let table_a: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='a'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!table_a);
    }

    #[test]
    fn test_out_of_order_migrations_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let migrations = vec![
            Migration {
                version: 2,
                name: "second",
                action: MigrationAction::Sql("SELECT 1;"),
            },
            Migration {
                version: 1,
                name: "first",
                action: MigrationAction::Sql("SELECT 1;"),
            },
        ];
        assert!(matches!(
            MigrationRunner::run(&conn, &migrations),
            Err(StorageError::Migration(_))
        ));
    }
}
