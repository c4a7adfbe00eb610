//! Dispatch operations: matching, reservation and completion.
//!
//! [`Dispatcher`] owns a [`DispatchStore`] handle and runs every multi-record
//! update through [`DispatchStore::transaction`], so the fleet state, the
//! assignment ledger and the job ledger always agree once a call returns.

use std::time::Duration;

use geo::Coord;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    Assignment, DispatchError, DispatchStore, DriverId, Job, JobId, RequesterId, ValidationError,
    Vehicle, VehicleNo, VehicleType, validate_position,
};

mod completion;
mod matching;
mod reservation;

pub use matching::select_nearest;

/// Radius around the drop-off point inside which a job may be completed.
pub const DEFAULT_GEOFENCE_KM: f64 = 5.0;

/// Upper bound on the duration of a single dispatch transaction.
pub const DEFAULT_TRANSACTION_DEADLINE: Duration = Duration::from_secs(5);

/// Configuration for [`Dispatcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Completion geofence radius in kilometres, inclusive.
    pub geofence_km: f64,
    /// Deadline applied to every store transaction.
    pub transaction_deadline: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            geofence_km: DEFAULT_GEOFENCE_KM,
            transaction_deadline: DEFAULT_TRANSACTION_DEADLINE,
        }
    }
}

/// A requester's ask for a vehicle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DispatchRequest {
    /// Party requesting the job.
    pub requester: RequesterId,
    /// Requested vehicle type.
    pub kind: VehicleType,
    /// Pickup point (`x = longitude`, `y = latitude`).
    pub pickup: Coord<f64>,
    /// Drop-off point (`x = longitude`, `y = latitude`).
    pub dropoff: Coord<f64>,
    /// Trip distance declared by the requester, in kilometres.
    pub distance_km: f64,
    /// Precomputed cost, accepted as-is.
    pub cost: f64,
}

impl DispatchRequest {
    /// Check positions lie on the globe and amounts are finite and
    /// non-negative.
    ///
    /// # Errors
    /// Returns the first [`ValidationError`] found.
    ///
    /// # Examples
    /// ```
    /// use fleetfy_core::{DispatchRequest, RequesterId, VehicleType, position};
    ///
    /// let mut request = DispatchRequest {
    ///     requester: RequesterId::new(1),
    ///     kind: VehicleType::new("van")?,
    ///     pickup: position(28.61, 77.21)?,
    ///     dropoff: position(28.53, 77.39)?,
    ///     distance_km: 19.4,
    ///     cost: 480.0,
    /// };
    /// assert!(request.validate().is_ok());
    ///
    /// request.cost = -1.0;
    /// assert!(request.validate().is_err());
    /// # Ok::<(), fleetfy_core::ValidationError>(())
    /// ```
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_position(self.pickup)?;
        validate_position(self.dropoff)?;
        validate_amount("distance_km", self.distance_km)?;
        validate_amount("cost", self.cost)
    }
}

fn validate_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidAmount { field, value })
    }
}

/// Matches requests to vehicles and drives jobs through their lifecycle.
///
/// `Dispatcher` is `Send + Sync` whenever its store is, so one instance can
/// serve requests from many threads.
///
/// # Examples
/// ```
/// use fleetfy_core::{
///     DispatchRequest, Dispatcher, DriverId, JobStatus, RequesterId, Vehicle, VehicleNo,
///     VehicleType, position,
/// };
/// use fleetfy_core::test_support::MemoryStore;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::default();
/// let van = VehicleType::new("van")?;
/// let v1 = VehicleNo::new("V1")?;
/// store.register_vehicle(&Vehicle::new(v1.clone(), van.clone(), position(28.61, 77.21)?))?;
/// store.register_driver(DriverId::new(1))?;
///
/// let dispatcher = Dispatcher::new(store);
/// dispatcher.assign_vehicle(DriverId::new(1), &v1)?;
///
/// let job = dispatcher.dispatch(&DispatchRequest {
///     requester: RequesterId::new(9),
///     kind: van,
///     pickup: position(28.60, 77.20)?,
///     dropoff: position(28.61, 77.21)?,
///     distance_km: 1.5,
///     cost: 120.0,
/// })?;
/// assert_eq!(job.status, JobStatus::InTransit);
///
/// let done = dispatcher.complete(job.id)?;
/// assert_eq!(done.status, JobStatus::Completed);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Dispatcher<S> {
    store: S,
    config: DispatchConfig,
}

impl<S> Dispatcher<S>
where
    S: DispatchStore,
{
    /// Construct a dispatcher using default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, DispatchConfig::default())
    }

    /// Construct a dispatcher with explicit configuration.
    pub const fn with_config(store: S, config: DispatchConfig) -> Self {
        Self { store, config }
    }

    /// Borrow the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Borrow the active configuration.
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Match `request` to the nearest free vehicle and reserve it.
    ///
    /// Matching and reservation run once each. A lost race surfaces as
    /// [`DispatchError::VehicleUnavailable`] and the caller decides whether
    /// to try again.
    ///
    /// # Errors
    /// Returns [`DispatchError::InvalidRequest`] for malformed requests,
    /// [`DispatchError::NoCandidate`] when no vehicle of the requested type
    /// is free, and any error of [`Dispatcher::reserve`].
    pub fn dispatch(&self, request: &DispatchRequest) -> Result<Job, DispatchError> {
        request.validate()?;
        let vehicle = self.nearest_free(&request.kind, request.pickup)?;
        self.reserve(&vehicle.vehicle_no, request)
    }

    /// Record a new position for a vehicle.
    ///
    /// # Errors
    /// Returns [`DispatchError::InvalidRequest`] for positions off the globe
    /// and [`DispatchError::NotFound`] for unknown vehicles.
    pub fn update_position(
        &self,
        vehicle_no: &VehicleNo,
        position: Coord<f64>,
    ) -> Result<Vehicle, DispatchError> {
        validate_position(position)?;
        self.store
            .transaction(self.config.transaction_deadline, |ledgers| {
                ledgers.set_position(vehicle_no, position)?;
                Ok(ledgers.get_vehicle(vehicle_no)?)
            })
    }

    /// Load a vehicle.
    ///
    /// # Errors
    /// Returns [`DispatchError::NotFound`] for unknown vehicles.
    pub fn vehicle(&self, vehicle_no: &VehicleNo) -> Result<Vehicle, DispatchError> {
        self.store
            .transaction(self.config.transaction_deadline, |ledgers| {
                Ok(ledgers.get_vehicle(vehicle_no)?)
            })
    }

    /// Load a driver's assignment.
    ///
    /// # Errors
    /// Returns [`DispatchError::NotFound`] when the driver was never
    /// onboarded.
    pub fn assignment(&self, driver: DriverId) -> Result<Assignment, DispatchError> {
        self.store
            .transaction(self.config.transaction_deadline, |ledgers| {
                Ok(ledgers.get_by_driver(driver)?)
            })
    }

    /// Load a job.
    ///
    /// # Errors
    /// Returns [`DispatchError::NotFound`] for unknown jobs.
    pub fn job(&self, id: JobId) -> Result<Job, DispatchError> {
        self.store
            .transaction(self.config.transaction_deadline, |ledgers| {
                Ok(ledgers.get(id)?)
            })
    }
}
