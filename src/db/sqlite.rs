use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection};

use super::DatabaseError;

/// How long a connection waits for another writer before giving up.
/// Validation runs hold the write lock for the whole read-validate-write pass.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../resources/migrations/001_initial.sql"))];

const REQUIRED_TABLES: &[&str] = &[
    "schema_version",
    "biomarkers",
    "subjects",
    "panels",
    "measurements",
    "validation_flags",
];

/// Open the panel database at `path`, creating and migrating it as needed
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    prepare(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection, DatabaseError> {
    configure_connection(&conn)?;
    run_migrations(&conn)?;
    verify_schema(&conn)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> Result<(), DatabaseError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

/// Apply every migration newer than the stored schema version
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    for &(version, sql) in MIGRATIONS {
        if version <= current_version {
            continue;
        }
        tracing::info!(version, "Applying panel database migration");
        conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
            version,
            reason: e.to_string(),
        })?;
    }

    Ok(())
}

/// Schema version recorded in the database, 0 for a fresh file
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

/// Fail when a table the engine reads or writes is missing, or when the
/// file was written by a newer release.
pub fn verify_schema(conn: &Connection) -> Result<(), DatabaseError> {
    let latest = MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0);
    let version = get_current_version(conn);
    if version > latest {
        return Err(DatabaseError::MigrationFailed {
            version,
            reason: format!("database schema is newer than this build (v{latest})"),
        });
    }

    for table in REQUIRED_TABLES {
        let present: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table],
            |row| row.get(0),
        )?;
        if !present {
            return Err(DatabaseError::MigrationFailed {
                version,
                reason: format!("table {table} is missing"),
            });
        }
    }
    Ok(())
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}
