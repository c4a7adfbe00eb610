//! `SQLite`-backed dispatch store.
//!
//! Every [`DispatchStore::transaction`] runs inside a `BEGIN IMMEDIATE`
//! transaction, so the write lock is taken before the closure reads anything.
//! Two processes sharing a database file therefore serialise their
//! reservations, and the loser waits on `SQLite`'s busy handler for at most the
//! transaction deadline.

use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use chrono::{DateTime, SecondsFormat, Utc};
use geo::Coord;
use log::{debug, warn};
use rusqlite::{
    Connection, Error as SqliteError, OptionalExtension, Row, TransactionBehavior, params,
};
use thiserror::Error;

use super::schema::{SchemaError, initialise_schema};
use crate::{
    Assignment, AssignmentLedger, DispatchError, DispatchStore, DriverId, FleetState, Job, JobId,
    JobLedger, JobStatus, Ledgers, Missing, NewJob, RequesterId, StoreError, Vehicle, VehicleNo,
    VehicleType,
};

/// Errors raised while opening a [`SqliteDispatchStore`].
#[derive(Debug, Error)]
pub enum SqliteOpenError {
    /// The parent directory of the database file could not be created.
    #[error("failed to create parent directory {path:?}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// `SQLite` refused to open the database.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Database location.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// The schema could not be created or has an unexpected version.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Dispatch store persisting vehicles, assignments and jobs in `SQLite`.
pub struct SqliteDispatchStore {
    connection: Mutex<Connection>,
    path: Option<Utf8PathBuf>,
}

impl fmt::Debug for SqliteDispatchStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDispatchStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteDispatchStore {
    /// Open or create a database at `path`, creating parent directories and
    /// the schema as needed.
    ///
    /// # Errors
    /// Returns [`SqliteOpenError`] when the directory, database or schema
    /// cannot be prepared.
    pub fn open(path: &Utf8Path) -> Result<Self, SqliteOpenError> {
        ensure_parent_dir(path)?;
        let connection =
            Connection::open(path.as_std_path()).map_err(|source| SqliteOpenError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_connection(connection, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns [`SqliteOpenError`] when `SQLite` cannot allocate the database.
    ///
    /// # Examples
    /// ```
    /// use fleetfy_core::{DispatchStore, SqliteDispatchStore, VehicleType};
    ///
    /// let store = SqliteDispatchStore::open_in_memory()?;
    /// let van = VehicleType::new("van")?;
    /// assert!(store.free_vehicles(&van)?.is_empty());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open_in_memory() -> Result<Self, SqliteOpenError> {
        let connection = Connection::open_in_memory().map_err(|source| SqliteOpenError::Open {
            path: Utf8PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(connection, None)
    }

    fn from_connection(
        mut connection: Connection,
        path: Option<Utf8PathBuf>,
    ) -> Result<Self, SqliteOpenError> {
        initialise_schema(&mut connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            path,
        })
    }

    /// Location of the database file, or `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Add a vehicle to the fleet.
    ///
    /// # Errors
    /// Returns [`StoreError::AlreadyRegistered`] when the number is taken,
    /// leaving the stored vehicle untouched, or [`StoreError::Backend`] when
    /// the write fails.
    pub fn register_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let connection = self.lock();
        let inserted = connection
            .execute(
                "INSERT INTO vehicles (vehicle_no, kind, latitude, longitude, busy)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(vehicle_no) DO NOTHING",
                params![
                    vehicle.vehicle_no.as_str(),
                    vehicle.kind.as_str(),
                    vehicle.position.y,
                    vehicle.position.x,
                    vehicle.busy,
                ],
            )
            .map_err(|source| StoreError::backend("register vehicle", source))?;
        if inserted == 0 {
            return Err(StoreError::AlreadyRegistered {
                vehicle_no: vehicle.vehicle_no.clone(),
            });
        }
        Ok(())
    }

    /// Create the empty assignment for a newly onboarded driver.
    ///
    /// Existing assignments are left untouched.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] when the write fails.
    pub fn register_driver(&self, driver: DriverId) -> Result<(), StoreError> {
        let connection = self.lock();
        connection
            .execute(
                "INSERT OR IGNORE INTO assignments (driver_id) VALUES (?1)",
                [encode_id(driver.get())?],
            )
            .map(|_| ())
            .map_err(|source| StoreError::backend("register driver", source))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // An unwinding transaction rolls back when dropped, so the connection
        // behind a poisoned lock holds no partial writes.
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DispatchStore for SqliteDispatchStore {
    fn free_vehicles(&self, kind: &VehicleType) -> Result<Vec<Vehicle>, StoreError> {
        let connection = self.lock();
        SqliteLedgers {
            connection: &connection,
        }
        .find_free_by_type(kind)
    }

    fn transaction<T, F>(&self, deadline: Duration, work: F) -> Result<T, DispatchError>
    where
        F: FnOnce(&mut dyn Ledgers) -> Result<T, DispatchError>,
    {
        let started = Instant::now();
        let mut connection = self.lock();
        connection
            .busy_timeout(deadline)
            .map_err(|source| StoreError::backend("set busy timeout", source))?;
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|source| StoreError::backend("begin transaction", source))?;

        let outcome = work(&mut SqliteLedgers {
            connection: &transaction,
        })?;

        if started.elapsed() > deadline {
            warn!("SQLite transaction exceeded its {deadline:?} deadline; rolling back");
            return Err(StoreError::DeadlineExceeded { deadline }.into());
        }
        transaction
            .commit()
            .map_err(|source| StoreError::backend("commit transaction", source))?;
        debug!("committed SQLite transaction in {:?}", started.elapsed());
        Ok(outcome)
    }
}

/// The three ledgers viewed through one open connection or transaction.
struct SqliteLedgers<'a> {
    connection: &'a Connection,
}

const VEHICLE_COLUMNS: &str = "vehicle_no, kind, latitude, longitude, busy";
const ASSIGNMENT_COLUMNS: &str = "driver_id, vehicle_no, active_job";
const JOB_COLUMNS: &str = "id, requester_id, vehicle_no, driver_id, pickup_latitude, \
     pickup_longitude, dropoff_latitude, dropoff_longitude, distance_km, cost, status, created_at";

impl FleetState for SqliteLedgers<'_> {
    fn find_free_by_type(&self, kind: &VehicleType) -> Result<Vec<Vehicle>, StoreError> {
        let mut statement = self
            .connection
            .prepare_cached(&format!(
                "SELECT {VEHICLE_COLUMNS} FROM vehicles
                 WHERE kind = ?1 AND busy = 0 ORDER BY vehicle_no"
            ))
            .map_err(|source| StoreError::backend("prepare free vehicle query", source))?;
        let rows = statement
            .query_map([kind.as_str()], VehicleRow::read)
            .map_err(|source| StoreError::backend("query free vehicles", source))?;

        rows.map(|row| {
            row.map_err(|source| StoreError::backend("read vehicle row", source))
                .and_then(VehicleRow::decode)
        })
        .collect()
    }

    fn get_vehicle(&self, vehicle_no: &VehicleNo) -> Result<Vehicle, StoreError> {
        self.connection
            .query_row(
                &format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE vehicle_no = ?1"),
                [vehicle_no.as_str()],
                VehicleRow::read,
            )
            .optional()
            .map_err(|source| StoreError::backend("load vehicle", source))?
            .ok_or_else(|| StoreError::NotFound(Missing::Vehicle(vehicle_no.clone())))
            .and_then(VehicleRow::decode)
    }

    fn set_busy(&mut self, vehicle_no: &VehicleNo, busy: bool) -> Result<(), StoreError> {
        let changed = self
            .connection
            .execute(
                "UPDATE vehicles SET busy = ?1 WHERE vehicle_no = ?2 AND busy = ?3",
                params![busy, vehicle_no.as_str(), !busy],
            )
            .map_err(|source| StoreError::backend("update vehicle busy flag", source))?;
        if changed == 0 {
            // Distinguish an unknown vehicle from one already in the target state.
            self.get_vehicle(vehicle_no)?;
            return Err(StoreError::Conflict {
                vehicle_no: vehicle_no.clone(),
            });
        }
        Ok(())
    }

    fn set_position(
        &mut self,
        vehicle_no: &VehicleNo,
        position: Coord<f64>,
    ) -> Result<(), StoreError> {
        let changed = self
            .connection
            .execute(
                "UPDATE vehicles SET latitude = ?1, longitude = ?2 WHERE vehicle_no = ?3",
                params![position.y, position.x, vehicle_no.as_str()],
            )
            .map_err(|source| StoreError::backend("update vehicle position", source))?;
        if changed == 0 {
            return Err(StoreError::NotFound(Missing::Vehicle(vehicle_no.clone())));
        }
        Ok(())
    }
}

impl AssignmentLedger for SqliteLedgers<'_> {
    fn get_by_driver(&self, driver: DriverId) -> Result<Assignment, StoreError> {
        self.connection
            .query_row(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE driver_id = ?1"),
                [encode_id(driver.get())?],
                AssignmentRow::read,
            )
            .optional()
            .map_err(|source| StoreError::backend("load driver assignment", source))?
            .ok_or(StoreError::NotFound(Missing::DriverAssignment(driver)))
            .and_then(AssignmentRow::decode)
    }

    fn get_by_vehicle(&self, vehicle_no: &VehicleNo) -> Result<Assignment, StoreError> {
        self.connection
            .query_row(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE vehicle_no = ?1"),
                [vehicle_no.as_str()],
                AssignmentRow::read,
            )
            .optional()
            .map_err(|source| StoreError::backend("load vehicle assignment", source))?
            .ok_or_else(|| StoreError::NotFound(Missing::VehicleAssignment(vehicle_no.clone())))
            .and_then(AssignmentRow::decode)
    }

    fn bind_vehicle(
        &mut self,
        driver: DriverId,
        vehicle_no: &VehicleNo,
    ) -> Result<(), StoreError> {
        let changed = self
            .connection
            .execute(
                "UPDATE assignments SET vehicle_no = ?2 WHERE driver_id = ?1",
                params![encode_id(driver.get())?, vehicle_no.as_str()],
            )
            .map_err(|source| StoreError::backend("bind vehicle to driver", source))?;
        if changed == 0 {
            return Err(StoreError::NotFound(Missing::DriverAssignment(driver)));
        }
        Ok(())
    }

    fn bind_job(
        &mut self,
        driver: DriverId,
        vehicle_no: &VehicleNo,
        job: JobId,
    ) -> Result<(), StoreError> {
        let changed = self
            .connection
            .execute(
                "UPDATE assignments SET vehicle_no = ?2, active_job = ?3 WHERE driver_id = ?1",
                params![
                    encode_id(driver.get())?,
                    vehicle_no.as_str(),
                    encode_id(job.get())?
                ],
            )
            .map_err(|source| StoreError::backend("bind job to driver", source))?;
        if changed == 0 {
            return Err(StoreError::NotFound(Missing::DriverAssignment(driver)));
        }
        Ok(())
    }

    fn clear_job(&mut self, vehicle_no: &VehicleNo) -> Result<(), StoreError> {
        let changed = self
            .connection
            .execute(
                "UPDATE assignments SET active_job = NULL WHERE vehicle_no = ?1",
                [vehicle_no.as_str()],
            )
            .map_err(|source| StoreError::backend("clear active job", source))?;
        if changed == 0 {
            return Err(StoreError::NotFound(Missing::VehicleAssignment(
                vehicle_no.clone(),
            )));
        }
        Ok(())
    }
}

impl JobLedger for SqliteLedgers<'_> {
    fn create(&mut self, job: NewJob) -> Result<Job, StoreError> {
        self.connection
            .execute(
                "INSERT INTO jobs (requester_id, vehicle_no, driver_id, pickup_latitude,
                    pickup_longitude, dropoff_latitude, dropoff_longitude, distance_km, cost,
                    status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    encode_id(job.requester.get())?,
                    job.vehicle_no.as_str(),
                    encode_id(job.driver.get())?,
                    job.pickup.y,
                    job.pickup.x,
                    job.dropoff.y,
                    job.dropoff.x,
                    job.distance_km,
                    job.cost,
                    job.status.as_str(),
                    job.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                ],
            )
            .map_err(|source| StoreError::backend("insert job", source))?;
        let id = decode_id("jobs.id", self.connection.last_insert_rowid())?;
        Ok(job.into_job(JobId::new(id)))
    }

    fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.connection
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [encode_id(id.get())?],
                JobRow::read,
            )
            .optional()
            .map_err(|source| StoreError::backend("load job", source))?
            .ok_or(StoreError::NotFound(Missing::Job(id)))
            .and_then(JobRow::decode)
    }

    fn set_status(&mut self, id: JobId, status: JobStatus) -> Result<(), StoreError> {
        let changed = self
            .connection
            .execute(
                "UPDATE jobs SET status = ?2 WHERE id = ?1",
                params![encode_id(id.get())?, status.as_str()],
            )
            .map_err(|source| StoreError::backend("update job status", source))?;
        if changed == 0 {
            return Err(StoreError::NotFound(Missing::Job(id)));
        }
        Ok(())
    }
}

struct VehicleRow {
    vehicle_no: String,
    kind: String,
    latitude: f64,
    longitude: f64,
    busy: bool,
}

impl VehicleRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            vehicle_no: row.get(0)?,
            kind: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            busy: row.get(4)?,
        })
    }

    fn decode(self) -> Result<Vehicle, StoreError> {
        let vehicle_no = decode_vehicle_no("vehicles.vehicle_no", self.vehicle_no)?;
        let kind = VehicleType::new(&self.kind).map_err(|_| StoreError::Corrupt {
            field: "vehicles.kind",
            value: self.kind,
        })?;
        Ok(Vehicle {
            vehicle_no,
            kind,
            position: Coord {
                x: self.longitude,
                y: self.latitude,
            },
            busy: self.busy,
        })
    }
}

struct AssignmentRow {
    driver_id: i64,
    vehicle_no: Option<String>,
    active_job: Option<i64>,
}

impl AssignmentRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            driver_id: row.get(0)?,
            vehicle_no: row.get(1)?,
            active_job: row.get(2)?,
        })
    }

    fn decode(self) -> Result<Assignment, StoreError> {
        Ok(Assignment {
            driver: DriverId::new(decode_id("assignments.driver_id", self.driver_id)?),
            vehicle_no: self
                .vehicle_no
                .map(|raw| decode_vehicle_no("assignments.vehicle_no", raw))
                .transpose()?,
            active_job: self
                .active_job
                .map(|raw| decode_id("assignments.active_job", raw).map(JobId::new))
                .transpose()?,
        })
    }
}

struct JobRow {
    id: i64,
    requester_id: i64,
    vehicle_no: String,
    driver_id: i64,
    pickup: Coord<f64>,
    dropoff: Coord<f64>,
    distance_km: f64,
    cost: f64,
    status: String,
    created_at: String,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            requester_id: row.get(1)?,
            vehicle_no: row.get(2)?,
            driver_id: row.get(3)?,
            pickup: Coord {
                y: row.get(4)?,
                x: row.get(5)?,
            },
            dropoff: Coord {
                y: row.get(6)?,
                x: row.get(7)?,
            },
            distance_km: row.get(8)?,
            cost: row.get(9)?,
            status: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn decode(self) -> Result<Job, StoreError> {
        let status = self.status.parse().map_err(|_| StoreError::Corrupt {
            field: "jobs.status",
            value: self.status.clone(),
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|_| StoreError::Corrupt {
                field: "jobs.created_at",
                value: self.created_at.clone(),
            })?
            .with_timezone(&Utc);
        Ok(Job {
            id: JobId::new(decode_id("jobs.id", self.id)?),
            requester: RequesterId::new(decode_id("jobs.requester_id", self.requester_id)?),
            vehicle_no: decode_vehicle_no("jobs.vehicle_no", self.vehicle_no)?,
            driver: DriverId::new(decode_id("jobs.driver_id", self.driver_id)?),
            pickup: self.pickup,
            dropoff: self.dropoff,
            distance_km: self.distance_km,
            cost: self.cost,
            status,
            created_at,
        })
    }
}

fn encode_id(raw: u64) -> Result<i64, StoreError> {
    i64::try_from(raw).map_err(|source| StoreError::backend("encode identifier", source))
}

fn decode_id(field: &'static str, raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Corrupt {
        field,
        value: raw.to_string(),
    })
}

fn decode_vehicle_no(field: &'static str, raw: String) -> Result<VehicleNo, StoreError> {
    VehicleNo::new(&raw).map_err(|_| StoreError::Corrupt { field, value: raw })
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), SqliteOpenError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base, relative) = if parent.is_absolute() {
        ("/", parent.strip_prefix("/").unwrap_or(parent))
    } else {
        (".", parent)
    };
    fs_utf8::Dir::open_ambient_dir(base, ambient_authority())
        .and_then(|dir| dir.create_dir_all(relative))
        .map_err(|source| SqliteOpenError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })
}
