//! Geofenced job completion.

use log::{info, warn};

use super::Dispatcher;
use crate::{DispatchError, DispatchStore, Job, JobId, JobStatus, haversine_km};

impl<S> Dispatcher<S>
where
    S: DispatchStore,
{
    /// Complete `id` if its vehicle is within the geofence of the drop-off.
    ///
    /// The boundary is inclusive. On success the job becomes `completed`,
    /// the vehicle is freed and the driver's active job is cleared in a
    /// single transaction; the driver keeps holding the vehicle.
    ///
    /// # Errors
    /// - [`DispatchError::NotFound`] when the job, its vehicle or the
    ///   assignment holding the vehicle does not exist.
    /// - [`DispatchError::JobAlreadyCompleted`] for finished jobs.
    /// - [`DispatchError::JobNotInTransit`] for jobs no vehicle is serving
    ///   yet.
    /// - [`DispatchError::OutOfRange`] when the vehicle is farther than the
    ///   configured geofence; nothing is written.
    /// - [`DispatchError::Store`] when the store fails or the deadline
    ///   elapses.
    pub fn complete(&self, id: JobId) -> Result<Job, DispatchError> {
        let limit_km = self.config.geofence_km;
        let job = self
            .store
            .transaction(self.config.transaction_deadline, |ledgers| {
                let mut current = ledgers.get(id)?;
                match current.status {
                    JobStatus::InTransit => {}
                    JobStatus::Completed => {
                        return Err(DispatchError::JobAlreadyCompleted { job: id });
                    }
                    status @ JobStatus::Created => {
                        return Err(DispatchError::JobNotInTransit { job: id, status });
                    }
                }

                let vehicle = ledgers.get_vehicle(&current.vehicle_no)?;
                let distance_km = haversine_km(vehicle.position, current.dropoff);
                if distance_km > limit_km {
                    return Err(DispatchError::OutOfRange {
                        job: id,
                        distance_km,
                        limit_km,
                    });
                }

                ledgers.set_status(id, JobStatus::Completed)?;
                ledgers.set_busy(&current.vehicle_no, false)?;
                ledgers.clear_job(&current.vehicle_no)?;
                current.status = JobStatus::Completed;
                Ok(current)
            })
            .inspect_err(|err| {
                if let DispatchError::OutOfRange { distance_km, .. } = err {
                    warn!(
                        "refused to complete job {id}: vehicle is {distance_km:.3} km from the drop-off"
                    );
                }
            })?;
        info!("completed job {} and released vehicle {}", job.id, job.vehicle_no);
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;
    use crate::{
        DEFAULT_TRANSACTION_DEADLINE, DispatchConfig, DispatchRequest, DriverId, ErrorKind,
        NewJob, RequesterId, Vehicle, VehicleNo, VehicleType, position,
    };
    use chrono::Utc;
    use geo::Coord;
    use rstest::{fixture, rstest};

    const DROPOFF: (f64, f64) = (28.535_5, 77.391_0);

    fn no() -> VehicleNo {
        VehicleNo::new("V1").expect("valid vehicle number")
    }

    fn dropoff() -> Coord<f64> {
        position(DROPOFF.0, DROPOFF.1).expect("valid position")
    }

    /// A dispatcher with V1 reserved for a job ending at [`DROPOFF`].
    #[fixture]
    fn reserved() -> (Dispatcher<MemoryStore>, Job) {
        let store = MemoryStore::default();
        store
            .register_vehicle(&Vehicle::new(
                no(),
                VehicleType::new("van").expect("valid type"),
                position(28.61, 77.21).expect("valid position"),
            ))
            .expect("register vehicle");
        store
            .register_driver(DriverId::new(1))
            .expect("register driver");
        let dispatcher = Dispatcher::new(store);
        dispatcher
            .assign_vehicle(DriverId::new(1), &no())
            .expect("bind driver");
        let job = dispatcher
            .reserve(
                &no(),
                &DispatchRequest {
                    requester: RequesterId::new(5),
                    kind: VehicleType::new("van").expect("valid type"),
                    pickup: position(28.61, 77.21).expect("valid position"),
                    dropoff: dropoff(),
                    distance_km: 19.0,
                    cost: 350.0,
                },
            )
            .expect("reserve");
        (dispatcher, job)
    }

    #[rstest]
    fn far_vehicle_is_out_of_range_and_nothing_changes(reserved: (Dispatcher<MemoryStore>, Job)) {
        let (dispatcher, job) = reserved;
        let err = dispatcher.complete(job.id).expect_err("still far away");
        assert!(matches!(err, DispatchError::OutOfRange { limit_km, .. } if limit_km == 5.0));

        assert_eq!(
            dispatcher.job(job.id).expect("job").status,
            JobStatus::InTransit
        );
        assert!(dispatcher.vehicle(&no()).expect("vehicle").busy);
        assert_eq!(
            dispatcher
                .assignment(DriverId::new(1))
                .expect("assignment")
                .active_job,
            Some(job.id)
        );
    }

    #[rstest]
    fn completion_releases_vehicle_and_unlinks_job(reserved: (Dispatcher<MemoryStore>, Job)) {
        let (dispatcher, job) = reserved;
        dispatcher
            .update_position(&no(), dropoff())
            .expect("arrive");

        let done = dispatcher.complete(job.id).expect("complete");
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(dispatcher.job(job.id).expect("job"), done);
        assert!(dispatcher.vehicle(&no()).expect("vehicle").is_free());
        let assignment = dispatcher.assignment(DriverId::new(1)).expect("assignment");
        assert_eq!(assignment.active_job, None);
        assert_eq!(assignment.vehicle_no, Some(no()));
    }

    #[rstest]
    fn completed_jobs_cannot_complete_again(reserved: (Dispatcher<MemoryStore>, Job)) {
        let (dispatcher, job) = reserved;
        dispatcher
            .update_position(&no(), dropoff())
            .expect("arrive");
        dispatcher.complete(job.id).expect("complete");

        let err = dispatcher.complete(job.id).expect_err("already done");
        assert!(matches!(err, DispatchError::JobAlreadyCompleted { job: j } if j == job.id));
        assert!(dispatcher.vehicle(&no()).expect("vehicle").is_free());
    }

    #[rstest]
    fn jobs_not_yet_in_transit_are_not_reported_as_completed(
        reserved: (Dispatcher<MemoryStore>, Job),
    ) {
        let (dispatcher, first) = reserved;
        let pending = dispatcher
            .store()
            .transaction(DEFAULT_TRANSACTION_DEADLINE, |ledgers| {
                Ok(ledgers.create(NewJob {
                    requester: RequesterId::new(6),
                    vehicle_no: no(),
                    driver: DriverId::new(1),
                    pickup: first.pickup,
                    dropoff: dropoff(),
                    distance_km: 19.0,
                    cost: 350.0,
                    status: JobStatus::Created,
                    created_at: Utc::now(),
                })?)
            })
            .expect("record pending job");
        dispatcher
            .update_position(&no(), dropoff())
            .expect("arrive");

        let err = dispatcher.complete(pending.id).expect_err("not in transit");
        assert!(matches!(
            err,
            DispatchError::JobNotInTransit { job, status: JobStatus::Created } if job == pending.id
        ));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(dispatcher.vehicle(&no()).expect("vehicle").busy);
        assert_eq!(
            dispatcher.job(pending.id).expect("job").status,
            JobStatus::Created
        );
    }

    #[rstest]
    fn unknown_job_is_not_found(reserved: (Dispatcher<MemoryStore>, Job)) {
        let (dispatcher, _) = reserved;
        assert!(matches!(
            dispatcher.complete(JobId::new(404)),
            Err(DispatchError::NotFound(_))
        ));
    }

    #[rstest]
    fn geofence_radius_is_configurable(reserved: (Dispatcher<MemoryStore>, Job)) {
        let (dispatcher, job) = reserved;
        let wide = Dispatcher::with_config(
            dispatcher.store(),
            DispatchConfig {
                geofence_km: 25.0,
                ..DispatchConfig::default()
            },
        );
        let done = wide.complete(job.id).expect("inside the wider fence");
        assert_eq!(done.status, JobStatus::Completed);
    }
}
