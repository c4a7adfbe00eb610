//! `SQLite` schema for the fleet state, assignment ledger and job ledger.

use rusqlite::{Connection, Error as SqliteError, OptionalExtension, Transaction};
use thiserror::Error;

/// Version recorded in `fleet_schema_version` by this build.
pub const SCHEMA_VERSION: i64 = 1;

/// Create the dispatch tables inside an `SQLite` database.
///
/// The function enables foreign keys, creates the tables and indexes, and
/// records the schema version. Existing databases must already carry
/// [`SCHEMA_VERSION`]; anything else is rejected rather than migrated
/// implicitly.
pub(crate) fn initialise_schema(connection: &mut Connection) -> Result<(), SchemaError> {
    connection
        .pragma_update(None, "foreign_keys", true)
        .map_err(|source| SchemaError::ForeignKeys { source })?;

    let transaction = connection
        .transaction()
        .map_err(|source| SchemaError::Migration {
            step: "begin schema transaction",
            source,
        })?;

    create_tables(&transaction)?;
    create_indexes(&transaction)?;
    ensure_schema_version(&transaction)?;

    transaction
        .commit()
        .map_err(|source| SchemaError::Migration {
            step: "commit schema transaction",
            source,
        })
}

fn create_tables(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create vehicles",
        "CREATE TABLE IF NOT EXISTS vehicles (
            vehicle_no TEXT PRIMARY KEY CHECK (length(trim(vehicle_no)) > 0),
            kind TEXT NOT NULL CHECK (length(trim(kind)) > 0),
            latitude REAL NOT NULL CHECK (latitude BETWEEN -90.0 AND 90.0),
            longitude REAL NOT NULL CHECK (longitude BETWEEN -180.0 AND 180.0),
            busy INTEGER NOT NULL DEFAULT 0 CHECK (busy IN (0, 1))
        ) WITHOUT ROWID",
    )?;
    run_migration_step(
        transaction,
        "create jobs",
        "CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            requester_id INTEGER NOT NULL,
            vehicle_no TEXT NOT NULL REFERENCES vehicles(vehicle_no),
            driver_id INTEGER NOT NULL,
            pickup_latitude REAL NOT NULL,
            pickup_longitude REAL NOT NULL,
            dropoff_latitude REAL NOT NULL,
            dropoff_longitude REAL NOT NULL,
            distance_km REAL NOT NULL CHECK (distance_km >= 0.0),
            cost REAL NOT NULL CHECK (cost >= 0.0),
            status TEXT NOT NULL CHECK (status IN ('created', 'in-transit', 'completed')),
            created_at TEXT NOT NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create assignments",
        "CREATE TABLE IF NOT EXISTS assignments (
            driver_id INTEGER PRIMARY KEY,
            vehicle_no TEXT UNIQUE REFERENCES vehicles(vehicle_no),
            active_job INTEGER REFERENCES jobs(id)
        )",
    )
}

fn create_indexes(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "index free vehicles",
        "CREATE INDEX IF NOT EXISTS idx_vehicles_kind_busy
            ON vehicles(kind, busy, vehicle_no)",
    )?;
    run_migration_step(
        transaction,
        "index jobs by vehicle",
        "CREATE INDEX IF NOT EXISTS idx_jobs_vehicle ON jobs(vehicle_no, status)",
    )
}

fn ensure_schema_version(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_migration_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS fleet_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;

    let existing_version: Option<i64> = transaction
        .query_row(
            "SELECT version FROM fleet_schema_version LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|source| SchemaError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing_version {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(SchemaError::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        }),
        None => transaction
            .execute(
                "INSERT INTO fleet_schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map(|_| ())
            .map_err(|source| SchemaError::Migration {
                step: "record schema version",
                source,
            }),
    }
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), SchemaError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| SchemaError::Migration { step, source })
}

/// Errors raised while preparing the dispatch schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// `PRAGMA foreign_keys` could not be enabled.
    #[error("failed to enable SQLite foreign keys")]
    ForeignKeys {
        /// Error reported by `SQLite`.
        #[source]
        source: SqliteError,
    },
    /// A schema statement failed.
    #[error("failed to execute migration step '{step}'")]
    Migration {
        /// Label of the failing step.
        step: &'static str,
        /// Error reported by `SQLite`.
        #[source]
        source: SqliteError,
    },
    /// The database was created by a different schema version.
    #[error("expected fleet schema version {expected} but found {found}; apply migrations before retrying")]
    VersionMismatch {
        /// Version this build understands.
        expected: i64,
        /// Version recorded in the database.
        found: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn initialising_twice_is_idempotent() {
        let mut connection = Connection::open_in_memory().expect("open database");
        initialise_schema(&mut connection).expect("first initialisation");
        initialise_schema(&mut connection).expect("second initialisation");

        let version: i64 = connection
            .query_row("SELECT version FROM fleet_schema_version", [], |row| {
                row.get(0)
            })
            .expect("read version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[rstest]
    fn foreign_version_is_rejected() {
        let mut connection = Connection::open_in_memory().expect("open database");
        initialise_schema(&mut connection).expect("initialise");
        connection
            .execute("UPDATE fleet_schema_version SET version = 99", [])
            .expect("tamper with version");

        let err = initialise_schema(&mut connection).expect_err("mismatch rejected");
        assert!(matches!(
            err,
            SchemaError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: 99
            }
        ));
    }

    #[rstest]
    fn a_vehicle_sits_in_at_most_one_assignment() {
        let mut connection = Connection::open_in_memory().expect("open database");
        initialise_schema(&mut connection).expect("initialise");
        connection
            .execute(
                "INSERT INTO vehicles (vehicle_no, kind, latitude, longitude) VALUES ('V1', 'van', 0, 0)",
                [],
            )
            .expect("insert vehicle");
        connection
            .execute(
                "INSERT INTO assignments (driver_id, vehicle_no) VALUES (1, 'V1')",
                [],
            )
            .expect("first binding");
        let second = connection.execute(
            "INSERT INTO assignments (driver_id, vehicle_no) VALUES (2, 'V1')",
            [],
        );
        assert!(second.is_err());
    }
}
