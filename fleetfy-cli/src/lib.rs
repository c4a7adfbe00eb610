//! Command-line interface for operating a Fleetfy dispatch database.
//!
//! Every subcommand opens the `SQLite` database named by `--database`
//! (`fleetfy.sqlite3` by default), performs one engine operation and prints
//! the resulting record as JSON on stdout.
#![forbid(unsafe_code)]

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use fleetfy_core::{DispatchConfig, Dispatcher, SqliteDispatchStore};
use serde::Serialize;

mod error;
mod fleet;
mod jobs;

pub use error::CliError;
use fleet::{AddDriverArgs, AddVehicleArgs, AssignArgs, InitArgs, MoveArgs};
use jobs::{CompleteArgs, DispatchArgs, JobArgs};

const ARG_DATABASE: &str = "database";
const ARG_VEHICLE_NO: &str = "vehicle-no";
const ARG_KIND: &str = "kind";
const ARG_DRIVER: &str = "driver";
const ARG_LAT: &str = "lat";
const ARG_LON: &str = "lon";
const ARG_REQUESTER: &str = "requester";
const ARG_PICKUP_LAT: &str = "pickup-lat";
const ARG_PICKUP_LON: &str = "pickup-lon";
const ARG_DROPOFF_LAT: &str = "dropoff-lat";
const ARG_DROPOFF_LON: &str = "dropoff-lon";
const ARG_DISTANCE_KM: &str = "distance-km";
const ARG_COST: &str = "cost";
const ARG_JOB: &str = "job";
const ARG_GEOFENCE_KM: &str = "geofence-km";
const ARG_DEADLINE_MS: &str = "deadline-ms";

const ENV_ADD_VEHICLE_VEHICLE_NO: &str = "FLEETFY_CMDS_ADD_VEHICLE_VEHICLE_NO";
const ENV_ADD_VEHICLE_KIND: &str = "FLEETFY_CMDS_ADD_VEHICLE_KIND";
const ENV_ADD_VEHICLE_LAT: &str = "FLEETFY_CMDS_ADD_VEHICLE_LAT";
const ENV_ADD_VEHICLE_LON: &str = "FLEETFY_CMDS_ADD_VEHICLE_LON";
const ENV_ADD_DRIVER_DRIVER: &str = "FLEETFY_CMDS_ADD_DRIVER_DRIVER";
const ENV_ASSIGN_DRIVER: &str = "FLEETFY_CMDS_ASSIGN_DRIVER";
const ENV_ASSIGN_VEHICLE_NO: &str = "FLEETFY_CMDS_ASSIGN_VEHICLE_NO";
const ENV_MOVE_VEHICLE_NO: &str = "FLEETFY_CMDS_MOVE_VEHICLE_NO";
const ENV_MOVE_LAT: &str = "FLEETFY_CMDS_MOVE_LAT";
const ENV_MOVE_LON: &str = "FLEETFY_CMDS_MOVE_LON";
const ENV_DISPATCH_REQUESTER: &str = "FLEETFY_CMDS_DISPATCH_REQUESTER";
const ENV_DISPATCH_KIND: &str = "FLEETFY_CMDS_DISPATCH_KIND";
const ENV_DISPATCH_PICKUP_LAT: &str = "FLEETFY_CMDS_DISPATCH_PICKUP_LAT";
const ENV_DISPATCH_PICKUP_LON: &str = "FLEETFY_CMDS_DISPATCH_PICKUP_LON";
const ENV_DISPATCH_DROPOFF_LAT: &str = "FLEETFY_CMDS_DISPATCH_DROPOFF_LAT";
const ENV_DISPATCH_DROPOFF_LON: &str = "FLEETFY_CMDS_DISPATCH_DROPOFF_LON";
const ENV_DISPATCH_DISTANCE_KM: &str = "FLEETFY_CMDS_DISPATCH_DISTANCE_KM";
const ENV_DISPATCH_COST: &str = "FLEETFY_CMDS_DISPATCH_COST";
const ENV_COMPLETE_JOB: &str = "FLEETFY_CMDS_COMPLETE_JOB";
const ENV_JOB_JOB: &str = "FLEETFY_CMDS_JOB_JOB";

/// Database used when neither `--database` nor a configuration layer names one.
const DEFAULT_DATABASE: &str = "fleetfy.sqlite3";

/// Run the Fleetfy CLI with the current process arguments and environment.
///
/// # Errors
/// Returns a [`CliError`] describing the first failure; argument parsing
/// errors (including `--help`) surface as [`CliError::ArgumentParsing`].
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    run_command(cli.command, &mut stdout)
}

fn run_command(command: Command, writer: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Init(args) => write_json(writer, &fleet::run_init(args)?),
        Command::AddVehicle(args) => write_json(writer, &fleet::run_add_vehicle(args)?),
        Command::AddDriver(args) => write_json(writer, &fleet::run_add_driver(args)?),
        Command::Assign(args) => write_json(writer, &fleet::run_assign(args)?),
        Command::Move(args) => write_json(writer, &fleet::run_move(args)?),
        Command::Dispatch(args) => write_json(writer, &jobs::run_dispatch(args)?),
        Command::Complete(args) => write_json(writer, &jobs::run_complete(args)?),
        Command::Job(args) => write_json(writer, &jobs::run_job(args)?),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "fleetfy",
    about = "Operate the Fleetfy vehicle dispatch engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or verify the dispatch database schema.
    Init(InitArgs),
    /// Onboard a vehicle.
    AddVehicle(AddVehicleArgs),
    /// Onboard a driver with no vehicle.
    AddDriver(AddDriverArgs),
    /// Bind a driver to a vehicle.
    Assign(AssignArgs),
    /// Record a vehicle's reported position.
    Move(MoveArgs),
    /// Match a request to the nearest free vehicle and reserve it.
    Dispatch(DispatchArgs),
    /// Complete a job once its vehicle is inside the drop-off geofence.
    Complete(CompleteArgs),
    /// Show a job.
    Job(JobArgs),
}

fn database_or_default(database: Option<Utf8PathBuf>) -> Utf8PathBuf {
    database.unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE))
}

fn open_store(path: &Utf8Path) -> Result<SqliteDispatchStore, CliError> {
    SqliteDispatchStore::open(path).map_err(|source| CliError::OpenStore {
        path: path.to_path_buf(),
        source,
    })
}

fn open_dispatcher(
    path: &Utf8Path,
    config: DispatchConfig,
) -> Result<Dispatcher<SqliteDispatchStore>, CliError> {
    Ok(Dispatcher::with_config(open_store(path)?, config))
}

fn require<T>(value: Option<T>, field: &'static str, env: &'static str) -> Result<T, CliError> {
    value.ok_or(CliError::MissingArgument { field, env })
}

fn write_json<T>(writer: &mut dyn Write, value: &T) -> Result<(), CliError>
where
    T: Serialize,
{
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerialiseOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
mod tests;
