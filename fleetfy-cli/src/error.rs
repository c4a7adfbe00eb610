//! Error types emitted by the Fleetfy CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use fleetfy_core::{DispatchError, ErrorKind, SqliteOpenError, StoreError, ValidationError};
use thiserror::Error;

/// Errors emitted by the Fleetfy CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Flag name without the leading dashes.
        field: &'static str,
        /// Environment variable that can supply the value.
        env: &'static str,
    },
    /// A provided value failed domain validation.
    #[error("invalid {field}: {source}")]
    InvalidArgument {
        /// Flag or value group that failed validation.
        field: &'static str,
        /// Domain validation failure.
        #[source]
        source: ValidationError,
    },
    /// A numeric setting lies outside its accepted range.
    #[error("invalid {field}: {value} (expected {expected})")]
    InvalidSetting {
        /// Flag name without the leading dashes.
        field: &'static str,
        /// Rejected value as given.
        value: String,
        /// Description of the accepted range.
        expected: &'static str,
    },
    /// Opening or initialising the dispatch database failed.
    #[error("failed to open dispatch database at {path:?}: {source}")]
    OpenStore {
        /// Database location.
        path: Utf8PathBuf,
        /// Failure reported by the store.
        #[source]
        source: SqliteOpenError,
    },
    /// Onboarding a vehicle or driver failed.
    #[error("failed to register {entity}: {source}")]
    Register {
        /// Kind of record being onboarded.
        entity: &'static str,
        /// Failure reported by the store.
        #[source]
        source: StoreError,
    },
    /// The dispatch engine rejected the operation.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Serializing the command output failed.
    #[error("failed to serialize command output: {0}")]
    SerialiseOutput(#[source] serde_json::Error),
    /// Writing the command output failed.
    #[error("failed to write command output: {0}")]
    WriteOutput(#[source] std::io::Error),
}

impl CliError {
    /// Process exit status reported for this error.
    ///
    /// Usage and configuration problems exit with 2. Engine rejections map
    /// their [`ErrorKind`] onto 3 (not found), 4 (conflict) and
    /// 5 (precondition failed); onboarding a known vehicle number is a
    /// conflict too. Everything else exits with 1.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::ArgumentParsing(_)
            | Self::Configuration(_)
            | Self::MissingArgument { .. }
            | Self::InvalidArgument { .. }
            | Self::InvalidSetting { .. } => 2,
            Self::Dispatch(err) => match err.kind() {
                ErrorKind::InvalidRequest => 2,
                ErrorKind::NotFound => 3,
                ErrorKind::Conflict => 4,
                ErrorKind::PreconditionFailed => 5,
                ErrorKind::ServerFault => 1,
            },
            Self::Register {
                source: StoreError::AlreadyRegistered { .. },
                ..
            } => 4,
            Self::OpenStore { .. }
            | Self::Register { .. }
            | Self::SerialiseOutput(_)
            | Self::WriteOutput(_) => 1,
        }
    }
}
