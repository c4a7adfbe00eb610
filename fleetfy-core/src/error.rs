//! Error types shared by the store contracts and the dispatch transactions.
//!
//! Stores report absent rows through [`StoreError::NotFound`] so callers never
//! need to inspect backend messages. [`DispatchError`] is the single error
//! surfaced by [`crate::Dispatcher`]; [`DispatchError::kind`] groups the
//! variants into the response classes a transport layer maps to status codes.

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::{DriverId, JobId, JobStatus, VehicleNo, VehicleType};

/// Input rejected at the domain boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A vehicle number was blank.
    #[error("vehicle number must not be empty")]
    EmptyVehicleNo,
    /// A vehicle type tag was blank.
    #[error("vehicle type must not be empty")]
    EmptyVehicleType,
    /// A latitude fell outside `-90..=90` or was not finite.
    #[error("latitude {0} is outside -90..=90")]
    Latitude(f64),
    /// A longitude fell outside `-180..=180` or was not finite.
    #[error("longitude {0} is outside -180..=180")]
    Longitude(f64),
    /// A declared distance or cost was negative or not finite.
    #[error("{field} must be a finite, non-negative number, got {value}")]
    InvalidAmount {
        /// Name of the offending request field.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// A job status string did not name a known status.
    #[error("unknown job status '{0}'")]
    UnknownJobStatus(String),
}

/// The record a lookup expected to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    /// No vehicle carries this number.
    Vehicle(VehicleNo),
    /// No job has this identifier.
    Job(JobId),
    /// The driver has no assignment row.
    DriverAssignment(DriverId),
    /// No assignment holds this vehicle.
    VehicleAssignment(VehicleNo),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vehicle(vehicle_no) => write!(f, "vehicle {vehicle_no}"),
            Self::Job(job) => write!(f, "job {job}"),
            Self::DriverAssignment(driver) => write!(f, "assignment for driver {driver}"),
            Self::VehicleAssignment(vehicle_no) => {
                write!(f, "driver assignment for vehicle {vehicle_no}")
            }
        }
    }
}

/// Failures reported by a [`crate::DispatchStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("{0} was not found")]
    NotFound(Missing),
    /// A compare-and-set on the vehicle busy flag found an unexpected state.
    #[error("vehicle {vehicle_no} changed state during the transaction")]
    Conflict {
        /// Vehicle whose busy flag did not match.
        vehicle_no: VehicleNo,
    },
    /// A vehicle with this number is already onboarded.
    #[error("vehicle {vehicle_no} is already registered")]
    AlreadyRegistered {
        /// Number of the existing vehicle.
        vehicle_no: VehicleNo,
    },
    /// The transaction ran past its deadline and was rolled back.
    #[error("transaction exceeded its {deadline:?} deadline and was rolled back")]
    DeadlineExceeded {
        /// Deadline the transaction was bound by.
        deadline: Duration,
    },
    /// The persistence backend failed.
    #[error("failed to {operation}")]
    Backend {
        /// Description of the failed operation.
        operation: &'static str,
        /// Error reported by the backend.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    /// A persisted value could not be decoded into a domain type.
    #[error("stored {field} value {value:?} is invalid")]
    Corrupt {
        /// Column or field that held the value.
        field: &'static str,
        /// Raw value as read from storage.
        value: String,
    },
}

impl StoreError {
    /// Wrap a backend error with a description of the failed operation.
    pub fn backend<E>(operation: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            operation,
            source: Box::new(source),
        }
    }
}

/// Response classes a transport maps dispatch errors onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself was malformed.
    InvalidRequest,
    /// A referenced record or candidate does not exist.
    NotFound,
    /// The request lost a race or targets a record in the wrong state.
    Conflict,
    /// The request is well formed but its precondition does not hold.
    PreconditionFailed,
    /// Persistence failed; the request may be retried later.
    ServerFault,
}

/// Errors returned by [`crate::Dispatcher`] operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No free vehicle of the requested type exists.
    #[error("no free vehicle of type {kind} is available")]
    NoCandidate {
        /// Requested vehicle type.
        kind: VehicleType,
    },
    /// The selected vehicle was claimed before the reservation committed.
    ///
    /// Callers should re-run matching.
    #[error("vehicle {vehicle_no} is no longer available")]
    VehicleUnavailable {
        /// Vehicle that lost the race.
        vehicle_no: VehicleNo,
    },
    /// A driver tried to claim a vehicle that is busy or held by someone else.
    #[error("vehicle {vehicle_no} is currently busy")]
    VehicleBusy {
        /// Vehicle that could not be claimed.
        vehicle_no: VehicleNo,
    },
    /// A driver with an active job tried to switch vehicles.
    #[error("driver {driver} is still working job {job}")]
    DriverBusy {
        /// Driver making the request.
        driver: DriverId,
        /// Job the driver is still bound to.
        job: JobId,
    },
    /// The job was already completed.
    #[error("job {job} is already completed")]
    JobAlreadyCompleted {
        /// Completed job.
        job: JobId,
    },
    /// The job has not started, so there is nothing to complete.
    #[error("job {job} is {status}, not in transit")]
    JobNotInTransit {
        /// Job being completed.
        job: JobId,
        /// Status the job is in.
        status: JobStatus,
    },
    /// The vehicle is outside the drop-off geofence.
    #[error("vehicle for job {job} is {distance_km:.3} km from the drop-off, limit is {limit_km} km")]
    OutOfRange {
        /// Job being completed.
        job: JobId,
        /// Measured distance from vehicle to drop-off.
        distance_km: f64,
        /// Geofence radius.
        limit_km: f64,
    },
    /// A referenced record does not exist.
    #[error("{0} was not found")]
    NotFound(Missing),
    /// The request failed boundary validation.
    #[error(transparent)]
    InvalidRequest(#[from] ValidationError),
    /// The store failed; the transaction was rolled back.
    #[error(transparent)]
    Store(StoreError),
}

impl DispatchError {
    /// Classify the error for transport mapping.
    ///
    /// # Examples
    /// ```
    /// use fleetfy_core::{DispatchError, ErrorKind, JobId};
    ///
    /// let err = DispatchError::JobAlreadyCompleted { job: JobId::new(7) };
    /// assert_eq!(err.kind(), ErrorKind::Conflict);
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::NoCandidate { .. } | Self::NotFound(_) => ErrorKind::NotFound,
            Self::VehicleUnavailable { .. }
            | Self::VehicleBusy { .. }
            | Self::DriverBusy { .. }
            | Self::JobAlreadyCompleted { .. }
            | Self::JobNotInTransit { .. } => ErrorKind::Conflict,
            Self::OutOfRange { .. } => ErrorKind::PreconditionFailed,
            Self::Store(_) => ErrorKind::ServerFault,
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(missing) => Self::NotFound(missing),
            StoreError::Conflict { vehicle_no } => Self::VehicleUnavailable { vehicle_no },
            other => Self::Store(other),
        }
    }
}
