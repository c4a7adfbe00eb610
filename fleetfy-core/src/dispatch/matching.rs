//! Nearest-vehicle selection.

use geo::Coord;
use log::debug;

use super::Dispatcher;
use crate::{DispatchError, DispatchStore, Vehicle, VehicleType, haversine_km};

/// Pick the candidate closest to `pickup`.
///
/// Candidates are compared in ascending vehicle-number order and a later
/// candidate only wins when strictly closer, so ties always resolve to the
/// smallest vehicle number regardless of input order.
///
/// # Examples
/// ```
/// use fleetfy_core::{Vehicle, VehicleNo, VehicleType, position, select_nearest};
///
/// let van = VehicleType::new("van")?;
/// let fleet = [
///     Vehicle::new(VehicleNo::new("V2")?, van.clone(), position(0.0, 0.01)?),
///     Vehicle::new(VehicleNo::new("V1")?, van, position(0.0, 0.05)?),
/// ];
/// let nearest = select_nearest(&fleet, position(0.0, 0.0)?);
/// assert_eq!(nearest.map(|v| v.vehicle_no.as_str()), Some("V2"));
/// assert!(select_nearest(&[], position(0.0, 0.0)?).is_none());
/// # Ok::<(), fleetfy_core::ValidationError>(())
/// ```
#[must_use]
pub fn select_nearest(candidates: &[Vehicle], pickup: Coord<f64>) -> Option<&Vehicle> {
    let mut ordered: Vec<&Vehicle> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.vehicle_no.cmp(&b.vehicle_no));

    let mut best: Option<(&Vehicle, f64)> = None;
    for vehicle in ordered {
        let distance = haversine_km(vehicle.position, pickup);
        match best {
            Some((_, shortest)) if distance >= shortest => {}
            _ => best = Some((vehicle, distance)),
        }
    }
    best.map(|(vehicle, _)| vehicle)
}

impl<S> Dispatcher<S>
where
    S: DispatchStore,
{
    /// Find the free vehicle of `kind` closest to `pickup`.
    ///
    /// The read is advisory: the vehicle may be claimed by another request
    /// before it is reserved.
    ///
    /// # Errors
    /// Returns [`DispatchError::NoCandidate`] when no vehicle of `kind` is
    /// free, or a store error when the fleet cannot be read.
    pub fn nearest_free(
        &self,
        kind: &VehicleType,
        pickup: Coord<f64>,
    ) -> Result<Vehicle, DispatchError> {
        let candidates = self.store.free_vehicles(kind)?;
        let nearest = select_nearest(&candidates, pickup)
            .cloned()
            .ok_or_else(|| DispatchError::NoCandidate { kind: kind.clone() })?;
        debug!(
            "matched {kind} request to vehicle {} out of {} candidates",
            nearest.vehicle_no,
            candidates.len()
        );
        Ok(nearest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;
    use crate::{VehicleNo, position};
    use rstest::{fixture, rstest};

    fn vehicle(no: &str, kind: &str, latitude: f64, longitude: f64) -> Vehicle {
        Vehicle::new(
            VehicleNo::new(no).expect("valid vehicle number"),
            VehicleType::new(kind).expect("valid type"),
            position(latitude, longitude).expect("valid position"),
        )
    }

    #[fixture]
    fn pickup() -> Coord<f64> {
        position(28.6129, 77.2295).expect("valid position")
    }

    #[rstest]
    fn equidistant_candidates_resolve_to_the_smallest_number(pickup: Coord<f64>) {
        // Every vehicle sits on the same point.
        let fleet = [
            vehicle("V3", "van", 28.62, 77.23),
            vehicle("V1", "van", 28.62, 77.23),
            vehicle("V2", "van", 28.62, 77.23),
        ];
        let nearest = select_nearest(&fleet, pickup).expect("candidate");
        assert_eq!(nearest.vehicle_no.as_str(), "V1");
    }

    #[rstest]
    fn closer_candidate_wins_over_ordering(pickup: Coord<f64>) {
        let fleet = [
            vehicle("A", "van", 28.70, 77.30),
            vehicle("Z", "van", 28.6130, 77.2296),
        ];
        let nearest = select_nearest(&fleet, pickup).expect("candidate");
        assert_eq!(nearest.vehicle_no.as_str(), "Z");
    }

    #[rstest]
    fn nearest_free_ignores_busy_and_other_kinds(pickup: Coord<f64>) {
        let store = MemoryStore::default();
        let mut busy = vehicle("V0", "van", 28.6129, 77.2295);
        busy.busy = true;
        for entry in [
            busy,
            vehicle("T1", "truck", 28.6129, 77.2295),
            vehicle("V9", "van", 28.90, 77.50),
        ] {
            store.register_vehicle(&entry).expect("register vehicle");
        }
        let dispatcher = Dispatcher::new(store);

        let van = VehicleType::new("van").expect("valid type");
        let nearest = dispatcher.nearest_free(&van, pickup).expect("candidate");
        assert_eq!(nearest.vehicle_no.as_str(), "V9");
    }

    #[rstest]
    fn empty_pool_reports_no_candidate(pickup: Coord<f64>) {
        let dispatcher = Dispatcher::new(MemoryStore::default());
        let bike = VehicleType::new("bike").expect("valid type");
        let err = dispatcher
            .nearest_free(&bike, pickup)
            .expect_err("no bikes registered");
        assert!(matches!(err, DispatchError::NoCandidate { kind } if kind == bike));
    }
}
