//! Exclusive claims on vehicles: job reservation and driver binding.

use chrono::Utc;
use log::info;

use super::{DispatchRequest, Dispatcher};
use crate::{
    Assignment, DispatchError, DispatchStore, DriverId, Job, JobStatus, NewJob, StoreError,
    VehicleNo,
};

impl<S> Dispatcher<S>
where
    S: DispatchStore,
{
    /// Reserve `vehicle_no` for `request` and record the job.
    ///
    /// Inside one transaction the vehicle is re-checked, the job is created
    /// already `in-transit`, the vehicle is marked busy and the job is bound
    /// to the driver holding the vehicle. Either every write lands or none
    /// does.
    ///
    /// # Errors
    /// - [`DispatchError::VehicleUnavailable`] when the vehicle is busy, its
    ///   driver is already serving a job, or a concurrent reservation won.
    /// - [`DispatchError::NotFound`] when the vehicle does not exist or no
    ///   driver holds it.
    /// - [`DispatchError::InvalidRequest`] for malformed requests.
    /// - [`DispatchError::Store`] when the store fails or the deadline
    ///   elapses.
    pub fn reserve(
        &self,
        vehicle_no: &VehicleNo,
        request: &DispatchRequest,
    ) -> Result<Job, DispatchError> {
        request.validate()?;
        let job = self
            .store
            .transaction(self.config.transaction_deadline, |ledgers| {
                let vehicle = ledgers.get_vehicle(vehicle_no)?;
                if !vehicle.is_free() {
                    return Err(DispatchError::VehicleUnavailable {
                        vehicle_no: vehicle_no.clone(),
                    });
                }

                let assignment = ledgers.get_by_vehicle(vehicle_no)?;
                if assignment.active_job.is_some() {
                    return Err(DispatchError::VehicleUnavailable {
                        vehicle_no: vehicle_no.clone(),
                    });
                }

                let created = ledgers.create(NewJob {
                    requester: request.requester,
                    vehicle_no: vehicle_no.clone(),
                    driver: assignment.driver,
                    pickup: request.pickup,
                    dropoff: request.dropoff,
                    distance_km: request.distance_km,
                    cost: request.cost,
                    status: JobStatus::InTransit,
                    created_at: Utc::now(),
                })?;
                ledgers.set_busy(vehicle_no, true)?;
                ledgers.bind_job(assignment.driver, vehicle_no, created.id)?;
                Ok(created)
            })?;
        info!(
            "reserved vehicle {} for job {} (driver {}, requester {})",
            job.vehicle_no, job.id, job.driver, job.requester
        );
        Ok(job)
    }

    /// Let `driver` take hold of `vehicle_no`.
    ///
    /// Binding a vehicle does not mark it busy; only a reservation does.
    /// A driver who already holds another vehicle releases it in favour of
    /// the new one.
    ///
    /// # Errors
    /// - [`DispatchError::NotFound`] when the vehicle or the driver's
    ///   assignment does not exist.
    /// - [`DispatchError::VehicleBusy`] when the vehicle is busy or held by
    ///   another driver.
    /// - [`DispatchError::DriverBusy`] when the driver is serving a job.
    /// - [`DispatchError::Store`] when the store fails or the deadline
    ///   elapses.
    pub fn assign_vehicle(
        &self,
        driver: DriverId,
        vehicle_no: &VehicleNo,
    ) -> Result<Assignment, DispatchError> {
        let assignment = self
            .store
            .transaction(self.config.transaction_deadline, |ledgers| {
                let vehicle = ledgers.get_vehicle(vehicle_no)?;
                let current = ledgers.get_by_driver(driver)?;
                if current.holds(vehicle_no) {
                    return Ok(current);
                }
                if let Some(job) = current.active_job {
                    return Err(DispatchError::DriverBusy { driver, job });
                }

                let held_elsewhere = match ledgers.get_by_vehicle(vehicle_no) {
                    Ok(holder) => holder.driver != driver,
                    Err(StoreError::NotFound(_)) => false,
                    Err(other) => return Err(other.into()),
                };
                if vehicle.busy || held_elsewhere {
                    return Err(DispatchError::VehicleBusy {
                        vehicle_no: vehicle_no.clone(),
                    });
                }

                ledgers.bind_vehicle(driver, vehicle_no)?;
                Ok(ledgers.get_by_driver(driver)?)
            })?;
        info!("driver {driver} now holds vehicle {vehicle_no}");
        Ok(assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;
    use crate::{Missing, RequesterId, Vehicle, VehicleType, position};
    use rstest::{fixture, rstest};

    fn no(raw: &str) -> VehicleNo {
        VehicleNo::new(raw).expect("valid vehicle number")
    }

    fn request() -> DispatchRequest {
        DispatchRequest {
            requester: RequesterId::new(77),
            kind: VehicleType::new("van").expect("valid type"),
            pickup: position(28.61, 77.21).expect("valid position"),
            dropoff: position(28.53, 77.39).expect("valid position"),
            distance_km: 19.4,
            cost: 480.0,
        }
    }

    #[fixture]
    fn dispatcher() -> Dispatcher<MemoryStore> {
        let store = MemoryStore::default();
        let van = VehicleType::new("van").expect("valid type");
        for raw in ["V1", "V2"] {
            store
                .register_vehicle(&Vehicle::new(
                    no(raw),
                    van.clone(),
                    position(28.6, 77.2).expect("valid position"),
                ))
                .expect("register vehicle");
        }
        for driver in [1, 2] {
            store
                .register_driver(DriverId::new(driver))
                .expect("register driver");
        }
        let dispatcher = Dispatcher::new(store);
        dispatcher
            .assign_vehicle(DriverId::new(1), &no("V1"))
            .expect("driver 1 takes V1");
        dispatcher
    }

    #[rstest]
    fn reservation_links_all_three_records(dispatcher: Dispatcher<MemoryStore>) {
        let job = dispatcher.reserve(&no("V1"), &request()).expect("reserve");

        assert_eq!(job.status, JobStatus::InTransit);
        assert_eq!(job.driver, DriverId::new(1));
        assert!(dispatcher.vehicle(&no("V1")).expect("vehicle").busy);
        let assignment = dispatcher.assignment(DriverId::new(1)).expect("assignment");
        assert_eq!(assignment.active_job, Some(job.id));
        assert_eq!(assignment.vehicle_no, Some(no("V1")));
        assert_eq!(dispatcher.job(job.id).expect("job"), job);
    }

    #[rstest]
    fn busy_vehicle_cannot_be_reserved_twice(dispatcher: Dispatcher<MemoryStore>) {
        dispatcher.reserve(&no("V1"), &request()).expect("first");
        let err = dispatcher
            .reserve(&no("V1"), &request())
            .expect_err("second reservation loses");
        assert!(matches!(err, DispatchError::VehicleUnavailable { .. }));
    }

    #[rstest]
    fn vehicle_without_driver_is_not_found(dispatcher: Dispatcher<MemoryStore>) {
        let err = dispatcher
            .reserve(&no("V2"), &request())
            .expect_err("nobody drives V2");
        assert!(matches!(
            err,
            DispatchError::NotFound(Missing::VehicleAssignment(_))
        ));
        assert!(!dispatcher.vehicle(&no("V2")).expect("vehicle").busy);
    }

    #[rstest]
    fn vehicle_held_by_another_driver_is_busy(dispatcher: Dispatcher<MemoryStore>) {
        let err = dispatcher
            .assign_vehicle(DriverId::new(2), &no("V1"))
            .expect_err("V1 is taken");
        assert!(matches!(err, DispatchError::VehicleBusy { .. }));
    }

    #[rstest]
    fn driver_with_active_job_cannot_switch(dispatcher: Dispatcher<MemoryStore>) {
        let job = dispatcher.reserve(&no("V1"), &request()).expect("reserve");
        let err = dispatcher
            .assign_vehicle(DriverId::new(1), &no("V2"))
            .expect_err("driver is busy");
        assert!(
            matches!(err, DispatchError::DriverBusy { driver, job: active } if driver == DriverId::new(1) && active == job.id)
        );
    }

    #[rstest]
    fn switching_vehicles_releases_the_old_one(dispatcher: Dispatcher<MemoryStore>) {
        let assignment = dispatcher
            .assign_vehicle(DriverId::new(1), &no("V2"))
            .expect("switch");
        assert_eq!(assignment.vehicle_no, Some(no("V2")));
        assert!(!dispatcher.vehicle(&no("V2")).expect("vehicle").busy);

        dispatcher
            .assign_vehicle(DriverId::new(2), &no("V1"))
            .expect("V1 is free again");
    }

    #[rstest]
    fn rebinding_the_same_vehicle_is_a_no_op(dispatcher: Dispatcher<MemoryStore>) {
        let assignment = dispatcher
            .assign_vehicle(DriverId::new(1), &no("V1"))
            .expect("rebind");
        assert_eq!(assignment.vehicle_no, Some(no("V1")));
    }

    #[rstest]
    fn unknown_driver_or_vehicle_is_not_found(dispatcher: Dispatcher<MemoryStore>) {
        assert!(matches!(
            dispatcher.assign_vehicle(DriverId::new(9), &no("V2")),
            Err(DispatchError::NotFound(Missing::DriverAssignment(_)))
        ));
        assert!(matches!(
            dispatcher.assign_vehicle(DriverId::new(2), &no("V9")),
            Err(DispatchError::NotFound(Missing::Vehicle(_)))
        ));
    }
}
