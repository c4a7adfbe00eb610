//! Jobs recorded in the job ledger and their lifecycle.
//!
//! A job is created by the reservation transaction already `in-transit` and
//! is moved to `completed` by the completion transaction. Status only ever
//! moves forward.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use geo::Coord;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{DriverId, ValidationError, VehicleNo};

/// Identity of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct JobId(u64);

impl JobId {
    /// Wrap a raw job identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the party requesting a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct RequesterId(u64);

impl RequesterId {
    /// Wrap a raw requester identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// # Examples
/// ```
/// use fleetfy_core::JobStatus;
///
/// assert_eq!(JobStatus::InTransit.as_str(), "in-transit");
/// assert_eq!("completed".parse(), Ok(JobStatus::Completed));
/// assert!(JobStatus::InTransit.can_advance_to(JobStatus::Completed));
/// assert!(!JobStatus::Completed.can_advance_to(JobStatus::InTransit));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum JobStatus {
    /// Recorded but not yet moving.
    Created,
    /// A vehicle and driver are serving the job.
    InTransit,
    /// The vehicle reached the drop-off area.
    Completed,
}

impl JobStatus {
    /// Return the status as its persisted string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InTransit => "in-transit",
            Self::Completed => "completed",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    ///
    /// Statuses may only advance by one step at a time.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::InTransit) | (Self::InTransit, Self::Completed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "in-transit" => Ok(Self::InTransit),
            "completed" => Ok(Self::Completed),
            other => Err(ValidationError::UnknownJobStatus(other.to_owned())),
        }
    }
}

/// A job as held by the job ledger.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Job {
    /// Ledger-assigned identifier.
    pub id: JobId,
    /// Party that requested the job.
    pub requester: RequesterId,
    /// Vehicle serving the job.
    pub vehicle_no: VehicleNo,
    /// Driver bound to the vehicle when the job was created.
    pub driver: DriverId,
    /// Pickup point (`x = longitude`, `y = latitude`).
    pub pickup: Coord<f64>,
    /// Drop-off point (`x = longitude`, `y = latitude`).
    pub dropoff: Coord<f64>,
    /// Distance declared by the requester, in kilometres.
    pub distance_km: f64,
    /// Precomputed cost accepted as-is.
    pub cost: f64,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// When the job was recorded.
    pub created_at: DateTime<Utc>,
}

/// Everything needed to record a job; the ledger assigns the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    /// Party that requested the job.
    pub requester: RequesterId,
    /// Vehicle serving the job.
    pub vehicle_no: VehicleNo,
    /// Driver bound to the vehicle.
    pub driver: DriverId,
    /// Pickup point.
    pub pickup: Coord<f64>,
    /// Drop-off point.
    pub dropoff: Coord<f64>,
    /// Declared distance in kilometres.
    pub distance_km: f64,
    /// Precomputed cost.
    pub cost: f64,
    /// Initial status.
    pub status: JobStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewJob {
    /// Attach the ledger-assigned identifier.
    #[must_use]
    pub fn into_job(self, id: JobId) -> Job {
        Job {
            id,
            requester: self.requester,
            vehicle_no: self.vehicle_no,
            driver: self.driver,
            pickup: self.pickup,
            dropoff: self.dropoff,
            distance_km: self.distance_km,
            cost: self.cost,
            status: self.status,
            created_at: self.created_at,
        }
    }
}
