//! Concurrent reservations of a single vehicle.
//!
//! Every contender races for the same van; exactly one reservation may
//! commit and every loser must see `VehicleUnavailable` with no partial
//! writes left behind.

use std::sync::Barrier;
use std::thread;

use camino::Utf8PathBuf;
use fleetfy_core::test_support::MemoryStore;
use fleetfy_core::{
    DispatchError, DispatchRequest, DispatchStore, Dispatcher, DriverId, Job, JobId, RequesterId,
    SqliteDispatchStore, Vehicle, VehicleNo, VehicleType, position,
};
use rstest::{fixture, rstest};
use tempfile::TempDir;

fn v1() -> VehicleNo {
    VehicleNo::new("V1").unwrap_or_else(|err| panic!("valid vehicle number: {err}"))
}

fn van() -> VehicleType {
    VehicleType::new("van").unwrap_or_else(|err| panic!("valid type: {err}"))
}

fn request(requester: u64) -> DispatchRequest {
    DispatchRequest {
        requester: RequesterId::new(requester),
        kind: van(),
        pickup: position(28.61, 77.21).unwrap_or_else(|err| panic!("valid position: {err}")),
        dropoff: position(28.53, 77.39).unwrap_or_else(|err| panic!("valid position: {err}")),
        distance_km: 19.4,
        cost: 480.0,
    }
}

fn seed_vehicle() -> Vehicle {
    Vehicle::new(
        v1(),
        van(),
        position(28.6, 77.2).unwrap_or_else(|err| panic!("valid position: {err}")),
    )
}

/// Race `contenders` reservations of V1, one per dispatcher, and return the
/// outcomes.
fn race<S>(dispatchers: &[Dispatcher<S>]) -> Vec<Result<Job, DispatchError>>
where
    S: DispatchStore,
{
    let barrier = Barrier::new(dispatchers.len());
    thread::scope(|scope| {
        let handles: Vec<_> = dispatchers
            .iter()
            .zip(1_u64..)
            .map(|(dispatcher, requester)| {
                let gate = &barrier;
                scope.spawn(move || {
                    gate.wait();
                    dispatcher.reserve(&v1(), &request(requester))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| panic!("reservation thread panicked"))
            })
            .collect()
    })
}

fn assert_single_winner<S>(outcomes: &[Result<Job, DispatchError>], observer: &Dispatcher<S>)
where
    S: DispatchStore,
{
    let winners: Vec<&Job> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1, "exactly one reservation must commit");
    for outcome in outcomes {
        if let Err(err) = outcome {
            assert!(
                matches!(err, DispatchError::VehicleUnavailable { vehicle_no } if *vehicle_no == v1()),
                "losers must see VehicleUnavailable, got {err:?}"
            );
        }
    }

    let Some(winner) = winners.first() else {
        panic!("winner checked above");
    };
    let vehicle = observer
        .vehicle(&v1())
        .unwrap_or_else(|err| panic!("load vehicle: {err}"));
    assert!(vehicle.busy);
    let assignment = observer
        .assignment(DriverId::new(1))
        .unwrap_or_else(|err| panic!("load assignment: {err}"));
    assert_eq!(assignment.active_job, Some(winner.id));
    assert!(
        matches!(observer.job(JobId::new(winner.id.get() + 1)), Err(DispatchError::NotFound(_))),
        "losing reservations must not leave jobs behind"
    );
}

#[fixture]
fn memory_store() -> MemoryStore {
    let store = MemoryStore::default();
    store
        .register_vehicle(&seed_vehicle())
        .unwrap_or_else(|err| panic!("register vehicle: {err}"));
    store
        .register_driver(DriverId::new(1))
        .unwrap_or_else(|err| panic!("register driver: {err}"));
    Dispatcher::new(&store)
        .assign_vehicle(DriverId::new(1), &v1())
        .unwrap_or_else(|err| panic!("bind driver: {err}"));
    store
}

#[rstest]
#[case(2)]
#[case(8)]
#[case(32)]
fn one_winner_on_the_memory_store(memory_store: MemoryStore, #[case] contenders: usize) {
    let dispatchers: Vec<_> = (0..contenders).map(|_| Dispatcher::new(&memory_store)).collect();
    let outcomes = race(&dispatchers);
    assert_single_winner(&outcomes, &Dispatcher::new(&memory_store));
}

#[rstest]
#[case(2)]
#[case(8)]
fn one_winner_on_a_shared_sqlite_connection(#[case] contenders: usize) {
    let store = SqliteDispatchStore::open_in_memory()
        .unwrap_or_else(|err| panic!("open store: {err}"));
    store
        .register_vehicle(&seed_vehicle())
        .unwrap_or_else(|err| panic!("register vehicle: {err}"));
    store
        .register_driver(DriverId::new(1))
        .unwrap_or_else(|err| panic!("register driver: {err}"));
    Dispatcher::new(&store)
        .assign_vehicle(DriverId::new(1), &v1())
        .unwrap_or_else(|err| panic!("bind driver: {err}"));

    let dispatchers: Vec<_> = (0..contenders).map(|_| Dispatcher::new(&store)).collect();
    let outcomes = race(&dispatchers);
    assert_single_winner(&outcomes, &Dispatcher::new(&store));
}

/// Each contender opens its own connection to one database file, so the
/// race is settled by `SQLite`'s write lock rather than the in-process mutex.
#[rstest]
#[case(2)]
#[case(6)]
fn one_winner_across_sqlite_connections(#[case] contenders: usize) {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let path = Utf8PathBuf::from_path_buf(dir.path().join("fleet.sqlite3"))
        .unwrap_or_else(|raw| panic!("non UTF-8 temp path {}", raw.display()));

    let seed = SqliteDispatchStore::open(&path).unwrap_or_else(|err| panic!("open store: {err}"));
    seed.register_vehicle(&seed_vehicle())
        .unwrap_or_else(|err| panic!("register vehicle: {err}"));
    seed.register_driver(DriverId::new(1))
        .unwrap_or_else(|err| panic!("register driver: {err}"));
    Dispatcher::new(&seed)
        .assign_vehicle(DriverId::new(1), &v1())
        .unwrap_or_else(|err| panic!("bind driver: {err}"));

    let dispatchers: Vec<_> = (0..contenders)
        .map(|_| {
            Dispatcher::new(
                SqliteDispatchStore::open(&path).unwrap_or_else(|err| panic!("open store: {err}")),
            )
        })
        .collect();
    let outcomes = race(&dispatchers);
    assert_single_winner(&outcomes, &Dispatcher::new(&seed));
}
