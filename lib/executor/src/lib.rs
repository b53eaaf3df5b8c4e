//! Component B — Remote Executor.
//!
//! A uniform contract over "run a command on a host" whether that host is
//! the local machine or reached over SSH (`spec.md` §4.B): `run`, `upload`,
//! `download`, `exec_in_container`. Callers supply idempotent commands; this
//! crate only retries on transport-level failure.

mod local;
mod retry;
mod ssh;

pub use local::LocalExecutor;
pub use ssh::SshExecutor;

use std::time::Duration;

use async_trait::async_trait;

pub const LOCAL_HOST: &str = "local";

/// `spec.md` §4.B: up to 3 retries, exponential backoff capped at 8s.
pub const MAX_TRANSPORT_RETRIES: u32 = 3;
pub const MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct ExecResult {
  pub exit: i32,
  pub stdout: String,
  pub stderr: String,
}

impl ExecResult {
  pub fn success(&self) -> bool {
    self.exit == 0
  }
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
  async fn run(
    &self,
    host: &str,
    user: &str,
    cmd: &str,
    stdin: Option<&[u8]>,
    timeout: Duration,
  ) -> anyhow::Result<ExecResult>;

  async fn upload(&self, host: &str, user: &str, path: &str, bytes: &[u8]) -> anyhow::Result<()>;

  async fn download(&self, host: &str, user: &str, path: &str) -> anyhow::Result<Vec<u8>>;

  async fn exec_in_container(
    &self,
    host: &str,
    user: &str,
    container: &str,
    cmd: &[String],
    timeout: Duration,
  ) -> anyhow::Result<ExecResult>;
}

/// Dispatches to [`LocalExecutor`] for `host == "local"`, [`SshExecutor`]
/// otherwise. This is the executor every other component (`deploy`,
/// `monitor`, `sidecar`, `secrets`) is written against.
pub struct Executor {
  local: LocalExecutor,
  ssh: SshExecutor,
}

impl Executor {
  pub fn new() -> Self {
    Self { local: LocalExecutor::new(), ssh: SshExecutor::new() }
  }

  fn backend(&self, host: &str) -> &dyn RemoteExecutor {
    if host == LOCAL_HOST { &self.local } else { &self.ssh }
  }
}

impl Default for Executor {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl RemoteExecutor for Executor {
  async fn run(
    &self,
    host: &str,
    user: &str,
    cmd: &str,
    stdin: Option<&[u8]>,
    timeout: Duration,
  ) -> anyhow::Result<ExecResult> {
    retry::with_transport_retry(|| self.backend(host).run(host, user, cmd, stdin, timeout)).await
  }

  async fn upload(&self, host: &str, user: &str, path: &str, bytes: &[u8]) -> anyhow::Result<()> {
    retry::with_transport_retry(|| self.backend(host).upload(host, user, path, bytes)).await
  }

  async fn download(&self, host: &str, user: &str, path: &str) -> anyhow::Result<Vec<u8>> {
    retry::with_transport_retry(|| self.backend(host).download(host, user, path)).await
  }

  async fn exec_in_container(
    &self,
    host: &str,
    user: &str,
    container: &str,
    cmd: &[String],
    timeout: Duration,
  ) -> anyhow::Result<ExecResult> {
    retry::with_transport_retry(|| self.backend(host).exec_in_container(host, user, container, cmd, timeout))
      .await
  }
}
