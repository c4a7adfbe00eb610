//! Vehicles tracked by the fleet state.

use std::{fmt, str::FromStr};

use geo::Coord;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Stable registration number identifying a vehicle.
///
/// Surrounding whitespace is trimmed; blank numbers are rejected.
///
/// # Examples
/// ```
/// use fleetfy_core::VehicleNo;
///
/// let no = VehicleNo::new(" DL-01-1234 ")?;
/// assert_eq!(no.as_str(), "DL-01-1234");
/// assert!(VehicleNo::new("  ").is_err());
/// # Ok::<(), fleetfy_core::ValidationError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct VehicleNo(String);

impl VehicleNo {
    /// Validate and construct a vehicle number.
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptyVehicleNo`] for blank input.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyVehicleNo);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VehicleNo {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for VehicleNo {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VehicleNo> for String {
    fn from(value: VehicleNo) -> Self {
        value.0
    }
}

/// Category of vehicle a job can request, such as `van` or `truck`.
///
/// Tags are free-form but normalised: trimmed and lower-cased, so `" Van"`
/// and `"van"` name the same pool.
///
/// # Examples
/// ```
/// use fleetfy_core::VehicleType;
///
/// let kind: VehicleType = " Van ".parse()?;
/// assert_eq!(kind.as_str(), "van");
/// # Ok::<(), fleetfy_core::ValidationError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct VehicleType(String);

impl VehicleType {
    /// Validate and normalise a vehicle type tag.
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptyVehicleType`] for blank input.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyVehicleType);
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// Borrow the normalised tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VehicleType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for VehicleType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VehicleType> for String {
    fn from(value: VehicleType) -> Self {
        value.0
    }
}

/// Build a position from latitude and longitude in degrees.
///
/// The returned coordinate follows the crate convention of `x = longitude`
/// and `y = latitude`.
///
/// # Errors
/// Returns [`ValidationError::Latitude`] or [`ValidationError::Longitude`]
/// when a component is out of range or not finite.
///
/// # Examples
/// ```
/// use fleetfy_core::position;
///
/// let p = position(28.612_894, 77.216_721)?;
/// assert_eq!(p.y, 28.612_894);
/// assert!(position(91.0, 0.0).is_err());
/// # Ok::<(), fleetfy_core::ValidationError>(())
/// ```
pub fn position(latitude: f64, longitude: f64) -> Result<Coord<f64>, ValidationError> {
    let coord = Coord {
        x: longitude,
        y: latitude,
    };
    validate_position(coord)?;
    Ok(coord)
}

/// Check a coordinate lies on the WGS84 globe.
///
/// # Errors
/// Returns [`ValidationError::Latitude`] or [`ValidationError::Longitude`]
/// when a component is out of range or not finite.
pub fn validate_position(coord: Coord<f64>) -> Result<(), ValidationError> {
    if !(-90.0..=90.0).contains(&coord.y) {
        return Err(ValidationError::Latitude(coord.y));
    }
    if !(-180.0..=180.0).contains(&coord.x) {
        return Err(ValidationError::Longitude(coord.x));
    }
    Ok(())
}

/// A vehicle in the fleet.
///
/// `busy` is set only by the reservation transaction and cleared only by the
/// completion transaction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vehicle {
    /// Registration number.
    pub vehicle_no: VehicleNo,
    /// Requestable vehicle type.
    pub kind: VehicleType,
    /// Last reported position (`x = longitude`, `y = latitude`).
    pub position: Coord<f64>,
    /// Whether the vehicle is serving an active job.
    pub busy: bool,
}

impl Vehicle {
    /// Construct a free vehicle at `position`.
    ///
    /// # Examples
    /// ```
    /// use fleetfy_core::{Vehicle, VehicleNo, VehicleType, position};
    ///
    /// let vehicle = Vehicle::new(
    ///     VehicleNo::new("V1")?,
    ///     VehicleType::new("van")?,
    ///     position(28.6, 77.2)?,
    /// );
    /// assert!(vehicle.is_free());
    /// # Ok::<(), fleetfy_core::ValidationError>(())
    /// ```
    #[must_use]
    pub const fn new(vehicle_no: VehicleNo, kind: VehicleType, position: Coord<f64>) -> Self {
        Self {
            vehicle_no,
            kind,
            position,
            busy: false,
        }
    }

    /// Whether the vehicle can be matched to a new job.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        !self.busy
    }
}
