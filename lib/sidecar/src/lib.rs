//! Component E — Sidecar Configurator.
//!
//! Each host runs a long-lived reverse-proxy container with a mounted
//! `stream.d/`/`http.d/` directory. For each service present on the host
//! this crate writes one config file (`drydock_client::entities::sidecar`
//! renders its contents) and triggers a graceful reload. On reload failure
//! the previous file is restored so the old configuration stays in force
//! (`spec.md` §4.E).

use std::time::Duration;

use drydock_client::entities::{error::DeployError, sidecar::SidecarStreamBlock};
use executor::{Executor, RemoteExecutor};

const SIDECAR_ROOT: &str = "/var/lib/deploy/sidecar";
const RELOAD_COMMAND: &str = "docker kill -s HUP drydock_sidecar";
const RELOAD_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SidecarConfigurator<'a> {
  executor: &'a Executor,
}

impl<'a> SidecarConfigurator<'a> {
  pub fn new(executor: &'a Executor) -> Self {
    Self { executor }
  }

  fn sub_dir(block: &SidecarStreamBlock) -> &'static str {
    if block.http { "http.d" } else { "stream.d" }
  }

  fn path(block: &SidecarStreamBlock) -> String {
    format!("{SIDECAR_ROOT}/{}/{}", Self::sub_dir(block), block.file_name())
  }

  /// Whether a service's backend set should be addressed by container name
  /// (single host in the zone) or private IP + host port (multi-host),
  /// per `spec.md` §4.E.
  pub fn choose_mode(hosts_in_zone_for_service: usize) -> drydock_client::entities::sidecar::SidecarMode {
    use drydock_client::entities::sidecar::SidecarMode;
    if hosts_in_zone_for_service <= 1 { SidecarMode::SingleHost } else { SidecarMode::MultiHost }
  }

  /// Writes the rendered block and reloads. On reload failure, restores
  /// `previous_contents` (the file as it stood before this write) so the
  /// old configuration stays in force, and returns a `SidecarReload` error
  /// for the caller (the rollout coordinator) to act on.
  pub async fn write_and_reload(
    &self,
    host: &str,
    block: &SidecarStreamBlock,
    previous_contents: Option<&str>,
  ) -> Result<(), DeployError> {
    let path = Self::path(block);
    self
      .executor
      .upload(host, "root", &path, block.render().as_bytes())
      .await
      .map_err(|e| DeployError::SidecarReload { host: host.to_string(), message: e.to_string() })?;

    match self.executor.run(host, "root", RELOAD_COMMAND, None, RELOAD_TIMEOUT).await {
      Ok(result) if result.success() => Ok(()),
      Ok(result) => {
        self.restore(host, block, previous_contents).await;
        Err(DeployError::SidecarReload { host: host.to_string(), message: result.stderr })
      }
      Err(e) => {
        self.restore(host, block, previous_contents).await;
        Err(DeployError::SidecarReload { host: host.to_string(), message: e.to_string() })
      }
    }
  }

  /// Reloads the sidecar against whatever config is already on disk, with
  /// no write step. Used by the `/reload_sidecar` route, where the caller
  /// only wants the proxy to pick up a file it wrote some other way.
  pub async fn reload(&self, host: &str) -> Result<(), DeployError> {
    match self.executor.run(host, "root", RELOAD_COMMAND, None, RELOAD_TIMEOUT).await {
      Ok(result) if result.success() => Ok(()),
      Ok(result) => Err(DeployError::SidecarReload { host: host.to_string(), message: result.stderr }),
      Err(e) => Err(DeployError::SidecarReload { host: host.to_string(), message: e.to_string() }),
    }
  }

  async fn restore(&self, host: &str, block: &SidecarStreamBlock, previous_contents: Option<&str>) {
    let path = Self::path(block);
    match previous_contents {
      Some(contents) => {
        let _ = self.executor.upload(host, "root", &path, contents.as_bytes()).await;
      }
      None => {
        let _ = self.executor.run(host, "root", &format!("rm -f '{path}'"), None, Duration::from_secs(5)).await;
      }
    }
    let _ = self.executor.run(host, "root", RELOAD_COMMAND, None, RELOAD_TIMEOUT).await;
  }

  pub async fn read_current(&self, host: &str, block: &SidecarStreamBlock) -> Option<String> {
    let path = Self::path(block);
    self.executor.download(host, "root", &path).await.ok().map(|b| String::from_utf8_lossy(&b).into_owned())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chooses_single_host_mode_for_one_host() {
    assert_eq!(
      SidecarConfigurator::choose_mode(1),
      drydock_client::entities::sidecar::SidecarMode::SingleHost
    );
  }

  #[test]
  fn chooses_multi_host_mode_for_more_than_one_host() {
    assert_eq!(
      SidecarConfigurator::choose_mode(3),
      drydock_client::entities::sidecar::SidecarMode::MultiHost
    );
  }
}
