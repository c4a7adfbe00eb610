//! Persistence contracts for fleet state, driver assignments and jobs.
//!
//! The three ledgers are expressed as separate traits so each transaction
//! step reads like the record it touches. A [`DispatchStore`] hands out all
//! three at once inside [`DispatchStore::transaction`], which commits the
//! closure's writes together or not at all.

use std::time::Duration;

use geo::Coord;

use crate::{
    Assignment, DispatchError, DriverId, Job, JobId, JobStatus, NewJob, StoreError, Vehicle,
    VehicleNo, VehicleType,
};

#[cfg(feature = "store-sqlite")]
mod schema;
#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use schema::{SCHEMA_VERSION, SchemaError};
#[cfg(feature = "store-sqlite")]
pub use sqlite::{SqliteDispatchStore, SqliteOpenError};

/// Read and write access to vehicle records.
pub trait FleetState {
    /// Return every free vehicle of `kind`, ordered by vehicle number.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be read.
    fn find_free_by_type(&self, kind: &VehicleType) -> Result<Vec<Vehicle>, StoreError>;

    /// Load a single vehicle.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no vehicle has `vehicle_no`.
    fn get_vehicle(&self, vehicle_no: &VehicleNo) -> Result<Vehicle, StoreError>;

    /// Flip the busy flag from `!busy` to `busy`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for unknown vehicles and
    /// [`StoreError::Conflict`] when the flag already equals `busy`.
    fn set_busy(&mut self, vehicle_no: &VehicleNo, busy: bool) -> Result<(), StoreError>;

    /// Record a new position for a vehicle.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no vehicle has `vehicle_no`.
    fn set_position(
        &mut self,
        vehicle_no: &VehicleNo,
        position: Coord<f64>,
    ) -> Result<(), StoreError>;
}

/// Read and write access to driver assignments.
pub trait AssignmentLedger {
    /// Load the assignment owned by `driver`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when the driver has no assignment.
    fn get_by_driver(&self, driver: DriverId) -> Result<Assignment, StoreError>;

    /// Load the assignment currently holding `vehicle_no`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no assignment holds the vehicle.
    fn get_by_vehicle(&self, vehicle_no: &VehicleNo) -> Result<Assignment, StoreError>;

    /// Point the driver's assignment at `vehicle_no`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when the driver has no assignment.
    fn bind_vehicle(&mut self, driver: DriverId, vehicle_no: &VehicleNo)
    -> Result<(), StoreError>;

    /// Record `job` as the active job of the driver holding `vehicle_no`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when the driver has no assignment.
    fn bind_job(
        &mut self,
        driver: DriverId,
        vehicle_no: &VehicleNo,
        job: JobId,
    ) -> Result<(), StoreError>;

    /// Clear the active job of whichever assignment holds `vehicle_no`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no assignment holds the vehicle.
    fn clear_job(&mut self, vehicle_no: &VehicleNo) -> Result<(), StoreError>;
}

/// Read and write access to job records.
pub trait JobLedger {
    /// Persist a new job and return it with its assigned identifier.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend rejects the write.
    fn create(&mut self, job: NewJob) -> Result<Job, StoreError>;

    /// Load a job.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no job has `id`.
    fn get(&self, id: JobId) -> Result<Job, StoreError>;

    /// Overwrite the job's status.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] when no job has `id`.
    fn set_status(&mut self, id: JobId, status: JobStatus) -> Result<(), StoreError>;
}

/// The view of all three ledgers available inside a transaction.
pub trait Ledgers: FleetState + AssignmentLedger + JobLedger {}

impl<T> Ledgers for T where T: FleetState + AssignmentLedger + JobLedger {}

/// A shared handle to the persistent store.
///
/// Implementations must serialise transactions touching the same vehicle:
/// the closure passed to [`DispatchStore::transaction`] observes no writes
/// from a concurrent transaction between its reads and its commit.
pub trait DispatchStore: Send + Sync {
    /// Advisory list of free vehicles of `kind`, ordered by vehicle number.
    ///
    /// The read is not isolated from concurrent transactions.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backend cannot be read.
    fn free_vehicles(&self, kind: &VehicleType) -> Result<Vec<Vehicle>, StoreError>;

    /// Run `work` inside a single transaction bounded by `deadline`.
    ///
    /// The writes made by `work` are committed only when it returns `Ok` and
    /// the deadline has not elapsed; otherwise everything is rolled back and
    /// no partial write is ever observable.
    ///
    /// # Errors
    /// Propagates the error returned by `work`, or a [`StoreError`] raised
    /// while beginning or committing the transaction, including
    /// [`StoreError::DeadlineExceeded`].
    fn transaction<T, F>(&self, deadline: Duration, work: F) -> Result<T, DispatchError>
    where
        F: FnOnce(&mut dyn Ledgers) -> Result<T, DispatchError>;
}

impl<S> DispatchStore for &S
where
    S: DispatchStore,
{
    fn free_vehicles(&self, kind: &VehicleType) -> Result<Vec<Vehicle>, StoreError> {
        (**self).free_vehicles(kind)
    }

    fn transaction<T, F>(&self, deadline: Duration, work: F) -> Result<T, DispatchError>
    where
        F: FnOnce(&mut dyn Ledgers) -> Result<T, DispatchError>,
    {
        (**self).transaction(deadline, work)
    }
}

impl<S> DispatchStore for std::sync::Arc<S>
where
    S: DispatchStore,
{
    fn free_vehicles(&self, kind: &VehicleType) -> Result<Vec<Vehicle>, StoreError> {
        (**self).free_vehicles(kind)
    }

    fn transaction<T, F>(&self, deadline: Duration, work: F) -> Result<T, DispatchError>
    where
        F: FnOnce(&mut dyn Ledgers) -> Result<T, DispatchError>,
    {
        (**self).transaction(deadline, work)
    }
}
