//! Test helpers for driving CLI commands against a scratch database.

use super::*;
use serde_json::Value;
use tempfile::TempDir;

/// A temporary directory holding one dispatch database.
#[derive(Debug)]
pub(super) struct Workspace {
    _dir: TempDir,
    database: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self {
            database: root.join("state").join("fleet.sqlite3"),
            _dir: dir,
        }
    }

    pub(super) fn database(&self) -> &Utf8Path {
        &self.database
    }

    /// Parse `fleetfy <subcommand> --database <db> <rest...>` and run it,
    /// returning the JSON the command printed.
    pub(super) fn invoke(&self, subcommand: &str, rest: &[&str]) -> Result<Value, CliError> {
        let mut invocation = vec![
            "fleetfy".to_owned(),
            subcommand.to_owned(),
            format!("--{ARG_DATABASE}"),
            self.database.as_str().to_owned(),
        ];
        invocation.extend(rest.iter().map(|arg| (*arg).to_owned()));
        let cli = Cli::try_parse_from(invocation).map_err(CliError::ArgumentParsing)?;

        let mut output = Vec::new();
        run_command(cli.command, &mut output)?;
        let text = String::from_utf8(output).expect("utf-8 output");
        assert!(text.ends_with('\n'), "output should end with a newline");
        Ok(serde_json::from_str(&text).expect("command prints JSON"))
    }

    /// Run a command that must succeed.
    pub(super) fn succeed(&self, subcommand: &str, rest: &[&str]) -> Value {
        self.invoke(subcommand, rest)
            .unwrap_or_else(|err| panic!("`{subcommand}` failed: {err}"))
    }
}
