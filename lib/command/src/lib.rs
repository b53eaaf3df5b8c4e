//! Local-host command execution. The `host == "local"` leg of the Remote
//! Executor (component B) is just this crate; the SSH leg lives in
//! `executor` and wraps the same [`CommandLog`] shape for a uniform result.

use std::path::Path;

use run_command::{CommandOutput, async_run_command};
use serde::{Deserialize, Serialize};

/// The outcome of one command, whether run locally or over SSH.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLog {
  pub stage: String,
  pub command: String,
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
  pub start_ts: i64,
  pub end_ts: i64,
}

pub async fn run_local_command(
  stage: &str,
  path: impl Into<Option<&Path>>,
  command: impl AsRef<str>,
) -> CommandLog {
  let command = if let Some(path) = path.into() {
    format!("cd {} && {}", path.display(), command.as_ref())
  } else {
    command.as_ref().to_string()
  };
  let start_ts = chrono::Utc::now().timestamp_millis();
  let output = async_run_command(&command).await;
  output_into_log(stage, command, start_ts, output)
}

/// Runs a local command after sanitizing any secret values out of the
/// logged command/stdout/stderr, per the Secrets Store's no-leak rule
/// (`spec.md` §4.F).
pub async fn run_local_command_with_sanitization(
  stage: &str,
  path: impl Into<Option<&Path>>,
  command: impl AsRef<str>,
  replacers: &[(String, String)],
) -> CommandLog {
  let mut log = run_local_command(stage, path, command).await;
  log.command = svi::replace_in_string(&log.command, replacers);
  log.stdout = svi::replace_in_string(&log.stdout, replacers);
  log.stderr = svi::replace_in_string(&log.stderr, replacers);
  log
}

pub fn output_into_log(stage: &str, command: String, start_ts: i64, output: CommandOutput) -> CommandLog {
  let success = output.success();
  CommandLog {
    stage: stage.to_string(),
    stdout: output.stdout,
    stderr: output.stderr,
    command,
    success,
    start_ts,
    end_ts: chrono::Utc::now().timestamp_millis(),
  }
}
