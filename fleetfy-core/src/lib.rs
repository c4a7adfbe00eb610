//! Core domain types and transactions for the Fleetfy dispatch engine.
//!
//! A [`Dispatcher`] matches job requests to the nearest free vehicle of the
//! requested type, reserves that vehicle exclusively, and releases it once
//! the vehicle reaches the drop-off geofence. Vehicles, driver assignments
//! and jobs live behind the [`DispatchStore`] trait; every multi-record
//! update is a single store transaction, so the three records never disagree
//! outside one.
//!
//! Positions are [`geo::Coord`] values with `x = longitude` and
//! `y = latitude`, in degrees.
#![forbid(unsafe_code)]

pub mod assignment;
pub mod dispatch;
pub mod error;
pub mod geodesy;
pub mod job;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod vehicle;

pub use assignment::{Assignment, DriverId};
pub use dispatch::{
    DEFAULT_GEOFENCE_KM, DEFAULT_TRANSACTION_DEADLINE, DispatchConfig, DispatchRequest,
    Dispatcher, select_nearest,
};
pub use error::{DispatchError, ErrorKind, Missing, StoreError, ValidationError};
pub use geodesy::{EARTH_RADIUS_KM, haversine_km};
pub use job::{Job, JobId, JobStatus, NewJob, RequesterId};
pub use store::{AssignmentLedger, DispatchStore, FleetState, JobLedger, Ledgers};
#[cfg(feature = "store-sqlite")]
pub use store::{SCHEMA_VERSION, SchemaError, SqliteDispatchStore, SqliteOpenError};
pub use vehicle::{Vehicle, VehicleNo, VehicleType, position, validate_position};
