//! Facade crate for the Fleetfy dispatch engine.
//!
//! This crate re-exports the core domain types and dispatcher, and exposes the
//! `SQLite`-backed store behind the `store-sqlite` feature flag.

#![forbid(unsafe_code)]

pub use fleetfy_core::{
    Assignment, DEFAULT_GEOFENCE_KM, DEFAULT_TRANSACTION_DEADLINE, DispatchConfig, DispatchError,
    DispatchRequest, DispatchStore, Dispatcher, DriverId, ErrorKind, Job, JobId, JobStatus,
    RequesterId, StoreError, ValidationError, Vehicle, VehicleNo, VehicleType, haversine_km,
    position,
};

#[cfg(feature = "store-sqlite")]
pub use fleetfy_core::{SqliteDispatchStore, SqliteOpenError};
