//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use std::process::ExitCode;

use fleetfy_cli::CliError;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "FLEETFY_LOG";

#[expect(
    clippy::print_stderr,
    reason = "the binary reports failures to the operator on stderr"
)]
fn main() -> ExitCode {
    // `log` records are forwarded to the subscriber by its `tracing-log` bridge.
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match fleetfy_cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("fleetfy: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
