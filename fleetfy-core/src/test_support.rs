//! In-memory `DispatchStore` implementation used by unit, behaviour and
//! property tests.
//!
//! The module is gated behind the `test-support` feature (and `cfg(test)`).
//!
//! Transactions run against a clone of the committed state while holding the
//! store mutex; the clone replaces the committed state only when the closure
//! succeeds within its deadline.

use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use geo::Coord;
use log::warn;

use crate::{
    Assignment, AssignmentLedger, DispatchError, DispatchStore, DriverId, FleetState, Job, JobId,
    JobLedger, JobStatus, Ledgers, Missing, NewJob, StoreError, Vehicle, VehicleNo, VehicleType,
};

#[derive(Debug, Clone, Default)]
struct MemoryLedgers {
    vehicles: BTreeMap<VehicleNo, Vehicle>,
    assignments: BTreeMap<DriverId, Assignment>,
    jobs: BTreeMap<JobId, Job>,
    last_job: u64,
}

impl MemoryLedgers {
    fn vehicle_mut(&mut self, vehicle_no: &VehicleNo) -> Result<&mut Vehicle, StoreError> {
        self.vehicles
            .get_mut(vehicle_no)
            .ok_or_else(|| StoreError::NotFound(Missing::Vehicle(vehicle_no.clone())))
    }

    fn assignment_for_vehicle_mut(
        &mut self,
        vehicle_no: &VehicleNo,
    ) -> Result<&mut Assignment, StoreError> {
        self.assignments
            .values_mut()
            .find(|assignment| assignment.holds(vehicle_no))
            .ok_or_else(|| StoreError::NotFound(Missing::VehicleAssignment(vehicle_no.clone())))
    }

    fn assignment_mut(&mut self, driver: DriverId) -> Result<&mut Assignment, StoreError> {
        self.assignments
            .get_mut(&driver)
            .ok_or(StoreError::NotFound(Missing::DriverAssignment(driver)))
    }
}

impl FleetState for MemoryLedgers {
    fn find_free_by_type(&self, kind: &VehicleType) -> Result<Vec<Vehicle>, StoreError> {
        Ok(self
            .vehicles
            .values()
            .filter(|vehicle| vehicle.is_free() && &vehicle.kind == kind)
            .cloned()
            .collect())
    }

    fn get_vehicle(&self, vehicle_no: &VehicleNo) -> Result<Vehicle, StoreError> {
        self.vehicles
            .get(vehicle_no)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(Missing::Vehicle(vehicle_no.clone())))
    }

    fn set_busy(&mut self, vehicle_no: &VehicleNo, busy: bool) -> Result<(), StoreError> {
        let vehicle = self.vehicle_mut(vehicle_no)?;
        if vehicle.busy == busy {
            return Err(StoreError::Conflict {
                vehicle_no: vehicle_no.clone(),
            });
        }
        vehicle.busy = busy;
        Ok(())
    }

    fn set_position(
        &mut self,
        vehicle_no: &VehicleNo,
        position: Coord<f64>,
    ) -> Result<(), StoreError> {
        self.vehicle_mut(vehicle_no)?.position = position;
        Ok(())
    }
}

impl AssignmentLedger for MemoryLedgers {
    fn get_by_driver(&self, driver: DriverId) -> Result<Assignment, StoreError> {
        self.assignments
            .get(&driver)
            .cloned()
            .ok_or(StoreError::NotFound(Missing::DriverAssignment(driver)))
    }

    fn get_by_vehicle(&self, vehicle_no: &VehicleNo) -> Result<Assignment, StoreError> {
        self.assignments
            .values()
            .find(|assignment| assignment.holds(vehicle_no))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(Missing::VehicleAssignment(vehicle_no.clone())))
    }

    fn bind_vehicle(
        &mut self,
        driver: DriverId,
        vehicle_no: &VehicleNo,
    ) -> Result<(), StoreError> {
        self.assignment_mut(driver)?.vehicle_no = Some(vehicle_no.clone());
        Ok(())
    }

    fn bind_job(
        &mut self,
        driver: DriverId,
        vehicle_no: &VehicleNo,
        job: JobId,
    ) -> Result<(), StoreError> {
        let assignment = self.assignment_mut(driver)?;
        assignment.vehicle_no = Some(vehicle_no.clone());
        assignment.active_job = Some(job);
        Ok(())
    }

    fn clear_job(&mut self, vehicle_no: &VehicleNo) -> Result<(), StoreError> {
        self.assignment_for_vehicle_mut(vehicle_no)?.active_job = None;
        Ok(())
    }
}

impl JobLedger for MemoryLedgers {
    fn create(&mut self, draft: NewJob) -> Result<Job, StoreError> {
        self.last_job = self.last_job.saturating_add(1);
        let job = draft.into_job(JobId::new(self.last_job));
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(Missing::Job(id)))
    }

    fn set_status(&mut self, id: JobId, status: JobStatus) -> Result<(), StoreError> {
        let job = self
            .jobs
            .get_mut(&id)
            .ok_or(StoreError::NotFound(Missing::Job(id)))?;
        job.status = status;
        Ok(())
    }
}

/// In-memory store with the same transactional guarantees as the `SQLite`
/// store.
///
/// The store performs linear scans and is intended only for small fleets.
///
/// # Examples
/// ```
/// use fleetfy_core::{DispatchStore, DriverId, Vehicle, VehicleNo, VehicleType, position};
/// use fleetfy_core::test_support::MemoryStore;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::default();
/// let van = VehicleType::new("van")?;
/// store.register_vehicle(&Vehicle::new(VehicleNo::new("V1")?, van.clone(), position(0.0, 0.0)?))?;
/// store.register_driver(DriverId::new(1))?;
/// assert_eq!(store.free_vehicles(&van)?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryLedgers>,
}

impl MemoryStore {
    /// Add a vehicle to the fleet.
    ///
    /// # Errors
    /// Returns [`StoreError::AlreadyRegistered`] when the number is taken;
    /// the existing vehicle is left untouched.
    pub fn register_vehicle(&self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let mut state = self.lock();
        match state.vehicles.entry(vehicle.vehicle_no.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyRegistered {
                vehicle_no: vehicle.vehicle_no.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(vehicle.clone());
                Ok(())
            }
        }
    }

    /// Create the empty assignment for a newly onboarded driver.
    ///
    /// Existing assignments are left untouched.
    ///
    /// # Errors
    /// Never fails; the signature mirrors the `SQLite` store.
    pub fn register_driver(&self, driver: DriverId) -> Result<(), StoreError> {
        let mut state = self.lock();
        state
            .assignments
            .entry(driver)
            .or_insert_with(|| Assignment::unassigned(driver));
        Ok(())
    }

    /// Run a read-only closure against the committed state.
    ///
    /// All reads inside `read` observe the same committed snapshot.
    pub fn read<T>(&self, read: impl FnOnce(&dyn Ledgers) -> T) -> T {
        let state = self.lock();
        read(&*state)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLedgers> {
        // A panic inside a transaction never reaches the committed state, so a
        // poisoned lock still guards consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DispatchStore for MemoryStore {
    fn free_vehicles(&self, kind: &VehicleType) -> Result<Vec<Vehicle>, StoreError> {
        self.lock().find_free_by_type(kind)
    }

    fn transaction<T, F>(&self, deadline: Duration, work: F) -> Result<T, DispatchError>
    where
        F: FnOnce(&mut dyn Ledgers) -> Result<T, DispatchError>,
    {
        let started = Instant::now();
        let mut committed = self.lock();
        let mut working = committed.clone();
        let outcome = work(&mut working)?;
        if started.elapsed() > deadline {
            warn!("in-memory transaction exceeded its {deadline:?} deadline; rolling back");
            return Err(StoreError::DeadlineExceeded { deadline }.into());
        }
        *committed = working;
        Ok(outcome)
    }
}
