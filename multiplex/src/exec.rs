//! Running an external executable with the configuration injected.
//!
//! This adapter performs no validation of the program or its arguments.
//! Only enable the `run-command` feature when the configuration file is
//! trusted.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use multiplex_core::ConfigTree;
use tracing::info;

use crate::error::{MultiplexError, Result};

/// Environment variable holding the configuration as JSON.
pub const CONFIG_ENV_VAR: &str = "MULTIPLEX_CONFIG";

/// Runs `program` with `args`, passing `config` as JSON in
/// [`CONFIG_ENV_VAR`], and waits for it.
///
/// Standard streams are inherited.
///
/// # Errors
///
/// [`MultiplexError::Spawn`] if the program cannot be started.
pub fn run_command<I, S>(program: &Path, args: I, config: &ConfigTree) -> Result<ExitStatus>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let payload = config.clone().into_value().to_string();
    info!(program = %program.display(), bytes = payload.len(), "running external program");

    Command::new(program)
        .args(args)
        .env(CONFIG_ENV_VAR, payload)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|source| MultiplexError::Spawn {
            program: program.to_path_buf(),
            source,
        })
}

#[cfg(all(test, unix))]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_config_reaches_the_child() {
        let config = ConfigTree::try_from(json!({"lr": 0.5})).unwrap();
        let status = run_command(
            Path::new("sh"),
            ["-c", r#"test "$MULTIPLEX_CONFIG" = '{"lr":0.5}'"#],
            &config,
        )
        .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_missing_program() {
        let err = run_command(Path::new("/nonexistent/program"), Vec::<String>::new(), &ConfigTree::new())
            .unwrap_err();
        assert!(matches!(err, MultiplexError::Spawn { .. }));
    }
}
