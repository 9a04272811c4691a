//! Board schema migrations, tracked by `PRAGMA user_version`.
//!
//! `board_meta.schema_version` mirrors the pragma so the version is visible
//! to plain SQL readers.

use rusqlite::{Connection, Transaction, types::Type};
use tracing::info;

use super::schema;

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "board tables",
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        name: "group order indexes",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// Schema version stored in `PRAGMA user_version`.
///
/// # Errors
///
/// Returns an error if the pragma cannot be read or does not fit a `u32`.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(err)))
}

/// Bring the database up to [`LATEST_SCHEMA_VERSION`] and return the version
/// it ends at. Each pending migration commits on its own.
///
/// # Errors
///
/// Returns an error if a migration fails; the ones before it stay applied.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let start = current_schema_version(conn)?;
    let mut reached = start;
    for migration in MIGRATIONS.iter().filter(|migration| migration.version > start) {
        let tx = conn.transaction()?;
        apply(&tx, migration)?;
        tx.commit()?;
        info!(version = migration.version, name = migration.name, "board schema migrated");
        reached = migration.version;
    }
    Ok(reached)
}

fn apply(tx: &Transaction<'_>, migration: &Migration) -> rusqlite::Result<()> {
    let version = i64::from(migration.version);
    tx.execute_batch(migration.sql)?;
    tx.pragma_update(None, "user_version", version)?;
    tx.execute("UPDATE board_meta SET schema_version = ?1 WHERE id = 1", [version])?;
    Ok(())
}
