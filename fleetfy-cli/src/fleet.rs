//! Fleet onboarding commands: `init`, `add-vehicle`, `add-driver`, `assign`
//! and `move`.

use camino::Utf8PathBuf;
use clap::Parser;
use fleetfy_core::{
    Assignment, DispatchConfig, DriverId, SCHEMA_VERSION, Vehicle, VehicleNo, VehicleType,
    position,
};
use geo::Coord;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_DATABASE, ARG_DRIVER, ARG_KIND, ARG_LAT, ARG_LON, ARG_VEHICLE_NO, CliError,
    ENV_ADD_DRIVER_DRIVER, ENV_ADD_VEHICLE_KIND, ENV_ADD_VEHICLE_LAT, ENV_ADD_VEHICLE_LON,
    ENV_ADD_VEHICLE_VEHICLE_NO, ENV_ASSIGN_DRIVER, ENV_ASSIGN_VEHICLE_NO, ENV_MOVE_LAT,
    ENV_MOVE_LON, ENV_MOVE_VEHICLE_NO, database_or_default, open_dispatcher, open_store, require,
};

/// Depot coordinate given to vehicles onboarded without a position.
pub(crate) const DEPOT: (f64, f64) = (28.612_894, 77.216_721);

/// CLI arguments for the `init` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Create or verify the dispatch database schema")]
#[ortho_config(prefix = "FLEETFY")]
pub(crate) struct InitArgs {
    /// Path to the dispatch database file.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
}

/// Summary printed by `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct InitReport {
    pub(crate) database: Utf8PathBuf,
    pub(crate) schema_version: i64,
}

impl InitArgs {
    pub(crate) fn into_config(self) -> Result<Utf8PathBuf, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        Ok(database_or_default(merged.database))
    }
}

pub(crate) fn run_init(args: InitArgs) -> Result<InitReport, CliError> {
    let database = args.into_config()?;
    open_store(&database)?;
    info!("dispatch database ready at {database}");
    Ok(InitReport {
        database,
        schema_version: SCHEMA_VERSION,
    })
}

/// CLI arguments for the `add-vehicle` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Onboard a vehicle. Vehicle numbers are unique; onboarding \
                 a known number fails and leaves the vehicle untouched. \
                 Vehicles given neither --lat nor --lon start at the depot.",
    about = "Onboard a vehicle"
)]
#[ortho_config(prefix = "FLEETFY")]
pub(crate) struct AddVehicleArgs {
    /// Path to the dispatch database file.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Registration number identifying the vehicle.
    #[arg(long = ARG_VEHICLE_NO, value_name = "number")]
    #[serde(default)]
    pub(crate) vehicle_no: Option<String>,
    /// Vehicle type matched against dispatch requests (e.g. "van").
    #[arg(long = ARG_KIND, value_name = "type")]
    #[serde(default)]
    pub(crate) kind: Option<String>,
    /// Starting latitude in degrees; requires --lon.
    #[arg(long = ARG_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lat: Option<f64>,
    /// Starting longitude in degrees; requires --lat.
    #[arg(long = ARG_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lon: Option<f64>,
}

impl AddVehicleArgs {
    pub(crate) fn into_config(self) -> Result<AddVehicleConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        AddVehicleConfig::try_from(merged)
    }
}

/// Resolved `add-vehicle` configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AddVehicleConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) vehicle: Vehicle,
}

impl TryFrom<AddVehicleArgs> for AddVehicleConfig {
    type Error = CliError;

    fn try_from(args: AddVehicleArgs) -> Result<Self, Self::Error> {
        let vehicle_no = parse_vehicle_no(&require(
            args.vehicle_no,
            ARG_VEHICLE_NO,
            ENV_ADD_VEHICLE_VEHICLE_NO,
        )?)?;
        let raw_kind = require(args.kind, ARG_KIND, ENV_ADD_VEHICLE_KIND)?;
        let kind = VehicleType::new(raw_kind).map_err(|source| CliError::InvalidArgument {
            field: ARG_KIND,
            source,
        })?;
        let at = match (args.lat, args.lon) {
            (None, None) => parse_position(DEPOT.0, DEPOT.1)?,
            (latitude, longitude) => parse_position(
                require(latitude, ARG_LAT, ENV_ADD_VEHICLE_LAT)?,
                require(longitude, ARG_LON, ENV_ADD_VEHICLE_LON)?,
            )?,
        };
        Ok(Self {
            database: database_or_default(args.database),
            vehicle: Vehicle::new(vehicle_no, kind, at),
        })
    }
}

pub(crate) fn run_add_vehicle(args: AddVehicleArgs) -> Result<Vehicle, CliError> {
    let config = args.into_config()?;
    let dispatcher = open_dispatcher(&config.database, DispatchConfig::default())?;
    dispatcher
        .store()
        .register_vehicle(&config.vehicle)
        .map_err(|source| CliError::Register {
            entity: "vehicle",
            source,
        })?;
    Ok(dispatcher.vehicle(&config.vehicle.vehicle_no)?)
}

/// CLI arguments for the `add-driver` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Onboard a driver with no vehicle")]
#[ortho_config(prefix = "FLEETFY")]
pub(crate) struct AddDriverArgs {
    /// Path to the dispatch database file.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Driver identifier.
    #[arg(long = ARG_DRIVER, value_name = "id")]
    #[serde(default)]
    pub(crate) driver: Option<u64>,
}

impl AddDriverArgs {
    pub(crate) fn into_config(self) -> Result<AddDriverConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        AddDriverConfig::try_from(merged)
    }
}

/// Resolved `add-driver` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AddDriverConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) driver: DriverId,
}

impl TryFrom<AddDriverArgs> for AddDriverConfig {
    type Error = CliError;

    fn try_from(args: AddDriverArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            driver: DriverId::new(require(args.driver, ARG_DRIVER, ENV_ADD_DRIVER_DRIVER)?),
            database: database_or_default(args.database),
        })
    }
}

pub(crate) fn run_add_driver(args: AddDriverArgs) -> Result<Assignment, CliError> {
    let config = args.into_config()?;
    let dispatcher = open_dispatcher(&config.database, DispatchConfig::default())?;
    dispatcher
        .store()
        .register_driver(config.driver)
        .map_err(|source| CliError::Register {
            entity: "driver",
            source,
        })?;
    Ok(dispatcher.assignment(config.driver)?)
}

/// CLI arguments for the `assign` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Bind a driver to a vehicle. Switching vehicles releases \
                 the previous one; a driver with a job in transit cannot \
                 switch.",
    about = "Bind a driver to a vehicle"
)]
#[ortho_config(prefix = "FLEETFY")]
pub(crate) struct AssignArgs {
    /// Path to the dispatch database file.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Driver identifier.
    #[arg(long = ARG_DRIVER, value_name = "id")]
    #[serde(default)]
    pub(crate) driver: Option<u64>,
    /// Vehicle the driver claims.
    #[arg(long = ARG_VEHICLE_NO, value_name = "number")]
    #[serde(default)]
    pub(crate) vehicle_no: Option<String>,
}

impl AssignArgs {
    pub(crate) fn into_config(self) -> Result<AssignConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        AssignConfig::try_from(merged)
    }
}

/// Resolved `assign` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AssignConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) driver: DriverId,
    pub(crate) vehicle_no: VehicleNo,
}

impl TryFrom<AssignArgs> for AssignConfig {
    type Error = CliError;

    fn try_from(args: AssignArgs) -> Result<Self, Self::Error> {
        let driver = DriverId::new(require(args.driver, ARG_DRIVER, ENV_ASSIGN_DRIVER)?);
        let vehicle_no = parse_vehicle_no(&require(
            args.vehicle_no,
            ARG_VEHICLE_NO,
            ENV_ASSIGN_VEHICLE_NO,
        )?)?;
        Ok(Self {
            database: database_or_default(args.database),
            driver,
            vehicle_no,
        })
    }
}

pub(crate) fn run_assign(args: AssignArgs) -> Result<Assignment, CliError> {
    let config = args.into_config()?;
    let dispatcher = open_dispatcher(&config.database, DispatchConfig::default())?;
    Ok(dispatcher.assign_vehicle(config.driver, &config.vehicle_no)?)
}

/// CLI arguments for the `move` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Record a vehicle's reported position")]
#[ortho_config(prefix = "FLEETFY")]
pub(crate) struct MoveArgs {
    /// Path to the dispatch database file.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Vehicle reporting its position.
    #[arg(long = ARG_VEHICLE_NO, value_name = "number")]
    #[serde(default)]
    pub(crate) vehicle_no: Option<String>,
    /// Reported latitude in degrees.
    #[arg(long = ARG_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lat: Option<f64>,
    /// Reported longitude in degrees.
    #[arg(long = ARG_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) lon: Option<f64>,
}

impl MoveArgs {
    pub(crate) fn into_config(self) -> Result<MoveConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        MoveConfig::try_from(merged)
    }
}

/// Resolved `move` configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MoveConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) vehicle_no: VehicleNo,
    pub(crate) at: Coord<f64>,
}

impl TryFrom<MoveArgs> for MoveConfig {
    type Error = CliError;

    fn try_from(args: MoveArgs) -> Result<Self, Self::Error> {
        let vehicle_no = parse_vehicle_no(&require(
            args.vehicle_no,
            ARG_VEHICLE_NO,
            ENV_MOVE_VEHICLE_NO,
        )?)?;
        let at = parse_position(
            require(args.lat, ARG_LAT, ENV_MOVE_LAT)?,
            require(args.lon, ARG_LON, ENV_MOVE_LON)?,
        )?;
        Ok(Self {
            database: database_or_default(args.database),
            vehicle_no,
            at,
        })
    }
}

pub(crate) fn run_move(args: MoveArgs) -> Result<Vehicle, CliError> {
    let config = args.into_config()?;
    let dispatcher = open_dispatcher(&config.database, DispatchConfig::default())?;
    Ok(dispatcher.update_position(&config.vehicle_no, config.at)?)
}

pub(crate) fn parse_vehicle_no(raw: &str) -> Result<VehicleNo, CliError> {
    VehicleNo::new(raw).map_err(|source| CliError::InvalidArgument {
        field: ARG_VEHICLE_NO,
        source,
    })
}

pub(crate) fn parse_position(latitude: f64, longitude: f64) -> Result<Coord<f64>, CliError> {
    position(latitude, longitude).map_err(|source| CliError::InvalidArgument {
        field: "position",
        source,
    })
}
