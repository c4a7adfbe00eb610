//! Driver assignments binding drivers to vehicles and jobs.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{JobId, VehicleNo};

/// Identity of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct DriverId(u64);

impl DriverId {
    /// Wrap a raw driver identifier.
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

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The durable binding between a driver and what they currently hold.
///
/// Every driver has exactly one assignment, created empty at onboarding.
/// A vehicle number appears in at most one assignment at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Assignment {
    /// Driver owning the assignment.
    pub driver: DriverId,
    /// Vehicle the driver currently holds, if any.
    pub vehicle_no: Option<VehicleNo>,
    /// Job the driver is currently serving, if any.
    pub active_job: Option<JobId>,
}

impl Assignment {
    /// Construct the empty assignment created when a driver is onboarded.
    ///
    /// # Examples
    /// ```
    /// use fleetfy_core::{Assignment, DriverId};
    ///
    /// let assignment = Assignment::unassigned(DriverId::new(7));
    /// assert!(assignment.vehicle_no.is_none());
    /// assert!(assignment.active_job.is_none());
    /// ```
    #[must_use]
    pub const fn unassigned(driver: DriverId) -> Self {
        Self {
            driver,
            vehicle_no: None,
            active_job: None,
        }
    }

    /// Whether the assignment holds `vehicle_no`.
    #[must_use]
    pub fn holds(&self, vehicle_no: &VehicleNo) -> bool {
        self.vehicle_no.as_ref() == Some(vehicle_no)
    }
}
