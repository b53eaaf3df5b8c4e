//! The agent's runtime — one instance built once in `main`, shared across
//! every axum handler and the monitor tick loop behind an `Arc`. Per
//! `SPEC_FULL.md` §9: explicit owner struct, no module-level globals beyond
//! the `OnceLock`-backed config/logger (`crate::config::agent_config`).

use bollard::{API_DEFAULT_VERSION, Docker};
use executor::Executor;
use inventory::{AwsProvider, CloudProvider};
use provisioner::TemplateProvisioner;
use secrets::SecretsStore;
use sidecar::SidecarConfigurator;

use crate::config::AgentConfig;

pub struct AgentRuntime {
  pub config: AgentConfig,
  pub docker: Docker,
  pub executor: Executor,
  pub provider: Box<dyn CloudProvider>,
}

impl AgentRuntime {
  pub async fn new(config: AgentConfig) -> anyhow::Result<Self> {
    let socket_path = config
      .docker_socket_path
      .to_str()
      .ok_or_else(|| anyhow::anyhow!("docker socket path is not valid UTF-8"))?;
    let docker = Docker::connect_with_unix(socket_path, 120, API_DEFAULT_VERSION)?;
    Ok(Self { config, docker, executor: Executor::new(), provider: Box::new(AwsProvider::connect().await) })
  }

  pub fn provisioner(&self) -> TemplateProvisioner<'_> {
    TemplateProvisioner::new(
      self.provider.as_ref(),
      &self.executor,
      self.config.base_image_id.clone(),
      self.config.bake_script.clone(),
    )
  }

  pub fn sidecar(&self) -> SidecarConfigurator<'_> {
    SidecarConfigurator::new(&self.executor)
  }

  pub fn secrets(&self) -> SecretsStore<'_> {
    SecretsStore::new(&self.executor, self.config.root_directory.clone())
  }
}
