//! Job commands: `dispatch`, `complete` and `job`.

use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use fleetfy_core::{
    DEFAULT_GEOFENCE_KM, DEFAULT_TRANSACTION_DEADLINE, DispatchConfig, DispatchRequest, Job,
    JobId, RequesterId, VehicleType,
};
use log::debug;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::fleet::parse_position;
use crate::{
    ARG_COST, ARG_DATABASE, ARG_DEADLINE_MS, ARG_DISTANCE_KM, ARG_DROPOFF_LAT, ARG_DROPOFF_LON,
    ARG_GEOFENCE_KM, ARG_JOB, ARG_KIND, ARG_PICKUP_LAT, ARG_PICKUP_LON, ARG_REQUESTER, CliError,
    ENV_COMPLETE_JOB, ENV_DISPATCH_COST, ENV_DISPATCH_DISTANCE_KM, ENV_DISPATCH_DROPOFF_LAT,
    ENV_DISPATCH_DROPOFF_LON, ENV_DISPATCH_KIND, ENV_DISPATCH_PICKUP_LAT, ENV_DISPATCH_PICKUP_LON,
    ENV_DISPATCH_REQUESTER, ENV_JOB_JOB, database_or_default, open_dispatcher, require,
};

/// CLI arguments for the `dispatch` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Match a request to the nearest free vehicle of the \
                 requested type and reserve it for a new job. The job is \
                 printed as JSON once the reservation commits.",
    about = "Match and reserve a vehicle"
)]
#[ortho_config(prefix = "FLEETFY")]
pub(crate) struct DispatchArgs {
    /// Path to the dispatch database file.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Identifier of the party requesting the job.
    #[arg(long = ARG_REQUESTER, value_name = "id")]
    #[serde(default)]
    pub(crate) requester: Option<u64>,
    /// Requested vehicle type.
    #[arg(long = ARG_KIND, value_name = "type")]
    #[serde(default)]
    pub(crate) kind: Option<String>,
    /// Pickup latitude in degrees.
    #[arg(long = ARG_PICKUP_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) pickup_lat: Option<f64>,
    /// Pickup longitude in degrees.
    #[arg(long = ARG_PICKUP_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) pickup_lon: Option<f64>,
    /// Drop-off latitude in degrees.
    #[arg(long = ARG_DROPOFF_LAT, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) dropoff_lat: Option<f64>,
    /// Drop-off longitude in degrees.
    #[arg(long = ARG_DROPOFF_LON, value_name = "degrees", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) dropoff_lon: Option<f64>,
    /// Declared trip distance in kilometres.
    #[arg(long = ARG_DISTANCE_KM, value_name = "km")]
    #[serde(default)]
    pub(crate) distance_km: Option<f64>,
    /// Precomputed trip cost.
    #[arg(long = ARG_COST, value_name = "amount")]
    #[serde(default)]
    pub(crate) cost: Option<f64>,
    /// Transaction deadline in milliseconds.
    #[arg(long = ARG_DEADLINE_MS, value_name = "ms")]
    #[serde(default)]
    pub(crate) deadline_ms: Option<u64>,
}

impl DispatchArgs {
    pub(crate) fn into_config(self) -> Result<DispatchJobConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        DispatchJobConfig::try_from(merged)
    }
}

/// Resolved `dispatch` configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DispatchJobConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) request: DispatchRequest,
    pub(crate) engine: DispatchConfig,
}

impl TryFrom<DispatchArgs> for DispatchJobConfig {
    type Error = CliError;

    fn try_from(args: DispatchArgs) -> Result<Self, Self::Error> {
        let requester = require(args.requester, ARG_REQUESTER, ENV_DISPATCH_REQUESTER)?;
        let raw_kind = require(args.kind, ARG_KIND, ENV_DISPATCH_KIND)?;
        let kind = VehicleType::new(raw_kind).map_err(|source| CliError::InvalidArgument {
            field: ARG_KIND,
            source,
        })?;
        let pickup = parse_position(
            require(args.pickup_lat, ARG_PICKUP_LAT, ENV_DISPATCH_PICKUP_LAT)?,
            require(args.pickup_lon, ARG_PICKUP_LON, ENV_DISPATCH_PICKUP_LON)?,
        )?;
        let dropoff = parse_position(
            require(args.dropoff_lat, ARG_DROPOFF_LAT, ENV_DISPATCH_DROPOFF_LAT)?,
            require(args.dropoff_lon, ARG_DROPOFF_LON, ENV_DISPATCH_DROPOFF_LON)?,
        )?;
        let request = DispatchRequest {
            requester: RequesterId::new(requester),
            kind,
            pickup,
            dropoff,
            distance_km: require(args.distance_km, ARG_DISTANCE_KM, ENV_DISPATCH_DISTANCE_KM)?,
            cost: require(args.cost, ARG_COST, ENV_DISPATCH_COST)?,
        };
        request
            .validate()
            .map_err(|source| CliError::InvalidArgument {
                field: "request",
                source,
            })?;
        Ok(Self {
            database: database_or_default(args.database),
            request,
            engine: engine_config(None, args.deadline_ms)?,
        })
    }
}

pub(crate) fn run_dispatch(args: DispatchArgs) -> Result<Job, CliError> {
    let config = args.into_config()?;
    debug!(
        "dispatching a {} for requester {}",
        config.request.kind, config.request.requester
    );
    let dispatcher = open_dispatcher(&config.database, config.engine)?;
    Ok(dispatcher.dispatch(&config.request)?)
}

/// CLI arguments for the `complete` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Complete a job in transit. The job's vehicle must report \
                 a position within the geofence radius of the drop-off; \
                 otherwise nothing changes and the command fails.",
    about = "Complete a job inside the drop-off geofence"
)]
#[ortho_config(prefix = "FLEETFY")]
pub(crate) struct CompleteArgs {
    /// Identifier of the job to complete.
    #[arg(value_name = "job")]
    #[serde(default)]
    pub(crate) job: Option<u64>,
    /// Path to the dispatch database file.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Geofence radius around the drop-off in kilometres.
    #[arg(long = ARG_GEOFENCE_KM, value_name = "km")]
    #[serde(default)]
    pub(crate) geofence_km: Option<f64>,
    /// Transaction deadline in milliseconds.
    #[arg(long = ARG_DEADLINE_MS, value_name = "ms")]
    #[serde(default)]
    pub(crate) deadline_ms: Option<u64>,
}

impl CompleteArgs {
    pub(crate) fn into_config(self) -> Result<CompleteConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        CompleteConfig::try_from(merged)
    }
}

/// Resolved `complete` configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompleteConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) job: JobId,
    pub(crate) engine: DispatchConfig,
}

impl TryFrom<CompleteArgs> for CompleteConfig {
    type Error = CliError;

    fn try_from(args: CompleteArgs) -> Result<Self, Self::Error> {
        let job = JobId::new(require(args.job, ARG_JOB, ENV_COMPLETE_JOB)?);
        Ok(Self {
            database: database_or_default(args.database),
            job,
            engine: engine_config(args.geofence_km, args.deadline_ms)?,
        })
    }
}

pub(crate) fn run_complete(args: CompleteArgs) -> Result<Job, CliError> {
    let config = args.into_config()?;
    let dispatcher = open_dispatcher(&config.database, config.engine)?;
    Ok(dispatcher.complete(config.job)?)
}

/// CLI arguments for the `job` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Show a job")]
#[ortho_config(prefix = "FLEETFY")]
pub(crate) struct JobArgs {
    /// Identifier of the job to show.
    #[arg(value_name = "job")]
    #[serde(default)]
    pub(crate) job: Option<u64>,
    /// Path to the dispatch database file.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
}

impl JobArgs {
    pub(crate) fn into_config(self) -> Result<JobConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        JobConfig::try_from(merged)
    }
}

/// Resolved `job` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JobConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) job: JobId,
}

impl TryFrom<JobArgs> for JobConfig {
    type Error = CliError;

    fn try_from(args: JobArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            job: JobId::new(require(args.job, ARG_JOB, ENV_JOB_JOB)?),
            database: database_or_default(args.database),
        })
    }
}

pub(crate) fn run_job(args: JobArgs) -> Result<Job, CliError> {
    let config = args.into_config()?;
    let dispatcher = open_dispatcher(&config.database, DispatchConfig::default())?;
    Ok(dispatcher.job(config.job)?)
}

/// Build the engine configuration from optional overrides.
pub(crate) fn engine_config(
    geofence_km: Option<f64>,
    deadline_ms: Option<u64>,
) -> Result<DispatchConfig, CliError> {
    let radius_km = geofence_km.unwrap_or(DEFAULT_GEOFENCE_KM);
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(CliError::InvalidSetting {
            field: ARG_GEOFENCE_KM,
            value: radius_km.to_string(),
            expected: "a positive number of kilometres",
        });
    }
    let transaction_deadline = match deadline_ms {
        None => DEFAULT_TRANSACTION_DEADLINE,
        Some(0) => {
            return Err(CliError::InvalidSetting {
                field: ARG_DEADLINE_MS,
                value: "0".to_owned(),
                expected: "at least one millisecond",
            });
        }
        Some(ms) => Duration::from_millis(ms),
    };
    Ok(DispatchConfig {
        geofence_km: radius_km,
        transaction_deadline,
    })
}

#[cfg(test)]
pub(crate) fn dispatch_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<DispatchJobConfig, CliError> {
    let merged = DispatchArgs::merge_from_layers(layers).map_err(CliError::from)?;
    DispatchJobConfig::try_from(merged)
}
