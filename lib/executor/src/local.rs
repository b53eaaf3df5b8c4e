use std::{path::Path, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use bollard::{Docker, exec::{CreateExecOptions, StartExecResults}};
use command::run_local_command;
use futures_util::StreamExt;

use crate::{ExecResult, RemoteExecutor};

fn docker_client() -> &'static Docker {
  static DOCKER: OnceLock<Docker> = OnceLock::new();
  DOCKER.get_or_init(|| Docker::connect_with_defaults().expect("failed to connect to local docker daemon"))
}

/// The `host == "local"` leg of the Remote Executor: shell commands run via
/// `command::run_local_command`, container exec via `bollard` against the
/// local Docker daemon.
pub struct LocalExecutor;

impl LocalExecutor {
  pub fn new() -> Self {
    Self
  }
}

impl Default for LocalExecutor {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
  async fn run(
    &self,
    _host: &str,
    _user: &str,
    cmd: &str,
    _stdin: Option<&[u8]>,
    timeout: Duration,
  ) -> anyhow::Result<ExecResult> {
    let log = tokio::time::timeout(timeout, run_local_command("local exec", None, cmd))
      .await
      .map_err(|_| anyhow::anyhow!("local command timed out after {timeout:?}"))?;
    Ok(ExecResult {
      exit: if log.success { 0 } else { 1 },
      stdout: log.stdout,
      stderr: log.stderr,
    })
  }

  async fn upload(&self, _host: &str, _user: &str, path: &str, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await.map_err(Into::into)
  }

  async fn download(&self, _host: &str, _user: &str, path: &str) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(Into::into)
  }

  async fn exec_in_container(
    &self,
    _host: &str,
    _user: &str,
    container: &str,
    cmd: &[String],
    timeout: Duration,
  ) -> anyhow::Result<ExecResult> {
    let docker = docker_client();
    let exec = docker
      .create_exec(
        container,
        CreateExecOptions {
          cmd: Some(cmd.iter().map(String::as_str).collect()),
          attach_stdout: Some(true),
          attach_stderr: Some(true),
          ..Default::default()
        },
      )
      .await?;

    let run = async {
      let mut stdout = String::new();
      let mut stderr = String::new();
      if let StartExecResults::Attached { mut output, .. } = docker.start_exec(&exec.id, None).await? {
        while let Some(Ok(msg)) = output.next().await {
          use bollard::container::LogOutput;
          match msg {
            LogOutput::StdOut { message } | LogOutput::Console { message } => {
              stdout.push_str(&String::from_utf8_lossy(&message));
            }
            LogOutput::StdErr { message } => {
              stderr.push_str(&String::from_utf8_lossy(&message));
            }
            LogOutput::StdIn { .. } => {}
          }
        }
      }
      let inspect = docker.inspect_exec(&exec.id).await?;
      anyhow::Ok(ExecResult { exit: inspect.exit_code.unwrap_or(0) as i32, stdout, stderr })
    };

    tokio::time::timeout(timeout, run)
      .await
      .map_err(|_| anyhow::anyhow!("exec in container {container} timed out after {timeout:?}"))?
  }
}
