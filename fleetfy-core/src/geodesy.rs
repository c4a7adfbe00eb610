//! Great-circle distances between WGS84 positions.
//!
//! Positions use `geo::Coord` with `x = longitude` and `y = latitude`, both in
//! degrees, matching the rest of the crate.

use geo::Coord;

/// Mean Earth radius used by the haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Return the great-circle distance between two positions in kilometres.
///
/// The `atan2` form of the haversine formula is used and the intermediate
/// term is clamped to `[0, 1]`, so identical and antipodal points yield `0`
/// and half the Earth's circumference respectively instead of `NaN`.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use fleetfy_core::haversine_km;
///
/// let delhi = Coord { x: 77.216_721, y: 28.612_894 };
/// assert_eq!(haversine_km(delhi, delhi), 0.0);
///
/// let north = Coord { x: 0.0, y: 1.0 };
/// let origin = Coord { x: 0.0, y: 0.0 };
/// assert!((haversine_km(origin, north) - 111.19).abs() < 0.01);
/// ```
#[must_use]
#[expect(
    clippy::float_arithmetic,
    reason = "the haversine formula is inherently floating-point"
)]
pub fn haversine_km(from: Coord<f64>, to: Coord<f64>) -> f64 {
    let lat_from = from.y.to_radians();
    let lat_to = to.y.to_radians();
    let delta_lat = (to.y - from.y).to_radians();
    let delta_lon = (to.x - from.x).to_radians();

    let half_chord = ((delta_lat / 2.0).sin().powi(2)
        + lat_from.cos() * lat_to.cos() * (delta_lon / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let angle = 2.0 * half_chord.sqrt().atan2((1.0 - half_chord).sqrt());

    EARTH_RADIUS_KM * angle
}

#[cfg(test)]
#[expect(
    clippy::float_arithmetic,
    reason = "tests compare distances within a tolerance"
)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::f64::consts::PI;

    const fn coord(lat: f64, lon: f64) -> Coord<f64> {
        Coord { x: lon, y: lat }
    }

    #[rstest]
    #[case(coord(0.0, 0.0))]
    #[case(coord(28.612_894, 77.216_721))]
    #[case(coord(-89.999, 179.999))]
    fn identical_points_are_zero_apart(#[case] point: Coord<f64>) {
        assert_eq!(haversine_km(point, point), 0.0);
    }

    #[rstest]
    #[case(coord(0.0, 0.0), coord(0.0, 180.0))]
    #[case(coord(90.0, 0.0), coord(-90.0, 0.0))]
    #[case(coord(45.0, 10.0), coord(-45.0, -170.0))]
    fn antipodal_points_are_half_circumference(
        #[case] from: Coord<f64>,
        #[case] to: Coord<f64>,
    ) {
        let distance = haversine_km(from, to);
        assert!(distance.is_finite());
        assert!((distance - PI * EARTH_RADIUS_KM).abs() < 1e-3);
    }

    #[rstest]
    fn distance_is_symmetric() {
        let a = coord(28.6139, 77.2090);
        let b = coord(19.0760, 72.8777);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
    }

    #[rstest]
    fn delhi_to_mumbai_matches_reference() {
        let delhi = coord(28.6139, 77.2090);
        let mumbai = coord(19.0760, 72.8777);
        let distance = haversine_km(delhi, mumbai);
        assert!((distance - 1148.1).abs() < 1.0, "got {distance}");
    }
}
