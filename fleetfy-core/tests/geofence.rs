//! Geofence boundary behaviour of job completion on both store backends.

use fleetfy_core::test_support::MemoryStore;
use fleetfy_core::{
    DEFAULT_GEOFENCE_KM, DispatchConfig, DispatchError, DispatchRequest, DispatchStore, Dispatcher,
    DriverId, Job, JobStatus, RequesterId, SqliteDispatchStore, Vehicle, VehicleNo, VehicleType,
    haversine_km, position,
};
use geo::Coord;
use rstest::rstest;

const KM_PER_DEGREE: f64 = 111.194_926_644_558_73;
const DROPOFF: (f64, f64) = (12.971_6, 77.594_6);

fn v1() -> VehicleNo {
    VehicleNo::new("V1").unwrap_or_else(|err| panic!("valid vehicle number: {err}"))
}

fn dropoff() -> Coord<f64> {
    position(DROPOFF.0, DROPOFF.1).unwrap_or_else(|err| panic!("valid position: {err}"))
}

#[expect(
    clippy::float_arithmetic,
    reason = "positions are offset along the meridian by a distance"
)]
fn north_of_dropoff(distance_km: f64) -> Coord<f64> {
    position(DROPOFF.0 + distance_km / KM_PER_DEGREE, DROPOFF.1)
        .unwrap_or_else(|err| panic!("valid position: {err}"))
}

enum Backend {
    Memory,
    Sqlite,
}

/// Seed a store with V1, bind driver 1 and reserve V1 for a job ending at
/// [`DROPOFF`].
fn reserve_with<S>(store: S, config: DispatchConfig) -> (Dispatcher<S>, Job)
where
    S: DispatchStore,
{
    let dispatcher = Dispatcher::with_config(store, config);
    dispatcher
        .assign_vehicle(DriverId::new(1), &v1())
        .unwrap_or_else(|err| panic!("bind driver: {err}"));
    let job = dispatcher
        .reserve(
            &v1(),
            &DispatchRequest {
                requester: RequesterId::new(8),
                kind: VehicleType::new("van").unwrap_or_else(|err| panic!("valid type: {err}")),
                pickup: north_of_dropoff(20.0),
                dropoff: dropoff(),
                distance_km: 20.0,
                cost: 260.0,
            },
        )
        .unwrap_or_else(|err| panic!("reserve V1: {err}"));
    (dispatcher, job)
}

fn seeded_vehicle() -> Vehicle {
    Vehicle::new(
        v1(),
        VehicleType::new("van").unwrap_or_else(|err| panic!("valid type: {err}")),
        north_of_dropoff(20.0),
    )
}

/// Move V1 to `at` and attempt completion with the given geofence.
fn complete_at(backend: &Backend, at: Coord<f64>, config: DispatchConfig) -> Result<Job, DispatchError> {
    match backend {
        Backend::Memory => {
            let store = MemoryStore::default();
            store
                .register_vehicle(&seeded_vehicle())
                .unwrap_or_else(|err| panic!("register vehicle: {err}"));
            store
                .register_driver(DriverId::new(1))
                .unwrap_or_else(|err| panic!("register driver: {err}"));
            let (dispatcher, job) = reserve_with(store, config);
            move_and_complete(&dispatcher, &job, at)
        }
        Backend::Sqlite => {
            let store = SqliteDispatchStore::open_in_memory()
                .unwrap_or_else(|err| panic!("open store: {err}"));
            store
                .register_vehicle(&seeded_vehicle())
                .unwrap_or_else(|err| panic!("register vehicle: {err}"));
            store
                .register_driver(DriverId::new(1))
                .unwrap_or_else(|err| panic!("register driver: {err}"));
            let (dispatcher, job) = reserve_with(store, config);
            move_and_complete(&dispatcher, &job, at)
        }
    }
}

fn move_and_complete<S>(
    dispatcher: &Dispatcher<S>,
    job: &Job,
    at: Coord<f64>,
) -> Result<Job, DispatchError>
where
    S: DispatchStore,
{
    dispatcher
        .update_position(&v1(), at)
        .unwrap_or_else(|err| panic!("move V1: {err}"));
    let outcome = dispatcher.complete(job.id);
    let stored = dispatcher
        .job(job.id)
        .unwrap_or_else(|err| panic!("load job: {err}"));
    let vehicle = dispatcher
        .vehicle(&v1())
        .unwrap_or_else(|err| panic!("load vehicle: {err}"));
    match &outcome {
        Ok(_) => {
            assert_eq!(stored.status, JobStatus::Completed);
            assert!(vehicle.is_free());
        }
        Err(_) => {
            assert_eq!(stored.status, JobStatus::InTransit);
            assert!(vehicle.busy);
        }
    }
    outcome
}

#[rstest]
#[case(Backend::Memory)]
#[case(Backend::Sqlite)]
#[expect(
    clippy::float_arithmetic,
    reason = "the measured offset is compared within a tolerance"
)]
fn a_vehicle_exactly_on_the_fence_completes(#[case] backend: Backend) {
    // Use the measured distance as the radius so equality is exact.
    let at = north_of_dropoff(5.0);
    let measured = haversine_km(at, dropoff());
    assert!((measured - 5.0).abs() < 1e-9, "offset should measure 5 km, got {measured}");

    let config = DispatchConfig {
        geofence_km: measured,
        ..DispatchConfig::default()
    };
    let job = complete_at(&backend, at, config).unwrap_or_else(|err| panic!("complete: {err}"));
    assert_eq!(job.status, JobStatus::Completed);
}

/// A nominal 5 km offset measures within a nanometre of the fence, so the
/// default 5.0 km fence accepts it exactly when the measured distance does
/// not exceed 5.0.
#[rstest]
#[case(Backend::Memory)]
#[case(Backend::Sqlite)]
#[expect(
    clippy::float_arithmetic,
    reason = "the measured offset is compared within a tolerance"
)]
fn a_nominal_five_kilometre_offset_follows_the_measured_distance(#[case] backend: Backend) {
    let at = north_of_dropoff(5.0);
    let measured = haversine_km(at, dropoff());
    assert!((measured - 5.0).abs() < 1e-9, "offset should measure 5 km, got {measured}");

    let outcome = complete_at(&backend, at, DispatchConfig::default());
    if measured <= DEFAULT_GEOFENCE_KM {
        let job = outcome.unwrap_or_else(|err| panic!("{measured} km is on the fence: {err}"));
        assert_eq!(job.status, JobStatus::Completed);
    } else {
        assert!(
            matches!(outcome, Err(DispatchError::OutOfRange { distance_km, .. }) if distance_km == measured),
            "{measured} km is past the fence, got {outcome:?}"
        );
    }
}

#[rstest]
#[case(Backend::Memory, 0.0)]
#[case(Backend::Memory, 2.0)]
#[case(Backend::Memory, 4.999)]
#[case(Backend::Memory, 4.9999)]
#[case(Backend::Sqlite, 0.0)]
#[case(Backend::Sqlite, 4.999)]
#[case(Backend::Sqlite, 4.9999)]
fn vehicles_inside_the_default_fence_complete(#[case] backend: Backend, #[case] km: f64) {
    let job = complete_at(&backend, north_of_dropoff(km), DispatchConfig::default())
        .unwrap_or_else(|err| panic!("complete at {km} km: {err}"));
    assert_eq!(job.status, JobStatus::Completed);
}

#[rstest]
#[case(Backend::Memory, 5.0001)]
#[case(Backend::Memory, 5.001)]
#[case(Backend::Memory, 5.2)]
#[case(Backend::Sqlite, 5.0001)]
#[case(Backend::Sqlite, 5.001)]
#[case(Backend::Sqlite, 40.0)]
#[expect(
    clippy::float_arithmetic,
    reason = "the reported distance is compared within a tolerance"
)]
fn vehicles_beyond_the_default_fence_are_refused(#[case] backend: Backend, #[case] km: f64) {
    let err = complete_at(&backend, north_of_dropoff(km), DispatchConfig::default())
        .expect_err("outside the fence");
    match err {
        DispatchError::OutOfRange {
            distance_km,
            limit_km,
            ..
        } => {
            assert_eq!(limit_km, DEFAULT_GEOFENCE_KM);
            assert!(distance_km > limit_km, "{distance_km} km should be past the fence");
            assert!((distance_km - km).abs() < 1e-6);
        }
        other => panic!("expected OutOfRange, got {other:?}"),
    }
}
