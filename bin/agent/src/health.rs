//! Assembles the `GET /health` body (`drydock_client::entities::health::HostHealth`):
//! whether the local Docker daemon answers, host disk/uptime, and the state
//! of every container this host's Deployment Engine manages (tagged with the
//! `deploy.tuple` label, per `spec.md` §6 "Container labels").

use std::time::Duration;

use bollard::{
  Docker,
  query_parameters::{InspectContainerOptions, ListContainersOptions},
  secret::ContainerStateStatusEnum,
};
use drydock_client::entities::health::{ContainerHealth, ContainerState, HostHealth};
use executor::{Executor, LOCAL_HOST, RemoteExecutor};

pub struct HealthCollector<'a> {
  docker: &'a Docker,
  executor: &'a Executor,
}

impl<'a> HealthCollector<'a> {
  pub fn new(docker: &'a Docker, executor: &'a Executor) -> Self {
    Self { docker, executor }
  }

  pub async fn collect(&self) -> HostHealth {
    let docker_ok = self.docker.ping().await.is_ok();
    let disk_free_mb = self.disk_free_mb().await.unwrap_or_else(|e| {
      tracing::warn!(error = %e, "failed to read disk free space");
      0
    });
    let uptime_s = self.uptime_s().await.unwrap_or_else(|e| {
      tracing::warn!(error = %e, "failed to read host uptime");
      0
    });
    let containers = self.containers().await.unwrap_or_else(|e| {
      tracing::warn!(error = %e, "failed to list managed containers");
      Vec::new()
    });
    HostHealth { docker_ok, disk_free_mb, uptime_s, containers }
  }

  async fn disk_free_mb(&self) -> anyhow::Result<u64> {
    let out = self
      .executor
      .run(LOCAL_HOST, "root", "df --output=avail -BM / | tail -n1", None, Duration::from_secs(5))
      .await?;
    parse_df_avail_mb(&out.stdout).ok_or_else(|| anyhow::anyhow!("unparseable df output: {:?}", out.stdout))
  }

  async fn uptime_s(&self) -> anyhow::Result<u64> {
    let out = self.executor.run(LOCAL_HOST, "root", "cat /proc/uptime", None, Duration::from_secs(5)).await?;
    parse_proc_uptime(&out.stdout).ok_or_else(|| anyhow::anyhow!("unparseable /proc/uptime: {:?}", out.stdout))
  }

  async fn containers(&self) -> anyhow::Result<Vec<ContainerHealth>> {
    let managed = self
      .docker
      .list_containers(Some(ListContainersOptions {
        all: true,
        filters: Some(std::collections::HashMap::from([(
          "label".to_string(),
          vec!["deploy.tuple".to_string()],
        )])),
        ..Default::default()
      }))
      .await?;

    let mut out = Vec::with_capacity(managed.len());
    for summary in managed {
      let Some(name) = summary.names.and_then(|mut n| n.pop()).map(|n| n.trim_start_matches('/').to_string()) else {
        continue;
      };
      out.push(self.inspect_one(&name).await);
    }
    Ok(out)
  }

  async fn inspect_one(&self, name: &str) -> ContainerHealth {
    match self.docker.inspect_container(name, None::<InspectContainerOptions>).await {
      Ok(inspect) => {
        let state = inspect.state.as_ref().and_then(|s| s.status).map(container_state).unwrap_or(ContainerState::Missing);
        let exit_code = inspect.state.as_ref().and_then(|s| s.exit_code).map(|c| c as i32);
        let restarts = inspect.restart_count.unwrap_or(0) as u32;
        ContainerHealth { name: name.to_string(), state, restarts, exit_code }
      }
      Err(_) => ContainerHealth { name: name.to_string(), state: ContainerState::Missing, restarts: 0, exit_code: None },
    }
  }
}

fn container_state(status: ContainerStateStatusEnum) -> ContainerState {
  match status {
    ContainerStateStatusEnum::RUNNING => ContainerState::Running,
    ContainerStateStatusEnum::RESTARTING => ContainerState::Restarting,
    ContainerStateStatusEnum::EXITED | ContainerStateStatusEnum::DEAD => ContainerState::Exited,
    _ => ContainerState::Missing,
  }
}

fn parse_df_avail_mb(stdout: &str) -> Option<u64> {
  stdout.trim().trim_end_matches('M').parse().ok()
}

fn parse_proc_uptime(stdout: &str) -> Option<u64> {
  stdout.split_whitespace().next()?.parse::<f64>().ok().map(|secs| secs as u64)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_df_avail_output() {
    assert_eq!(parse_df_avail_mb("10240M\n"), Some(10240));
  }

  #[test]
  fn parses_proc_uptime_first_field() {
    assert_eq!(parse_proc_uptime("12345.67 54321.10\n"), Some(12345));
  }

  #[test]
  fn rejects_garbage_df_output() {
    assert_eq!(parse_df_avail_mb("not a number"), None);
  }

  #[test]
  fn maps_docker_exited_and_dead_to_exited() {
    assert_eq!(container_state(ContainerStateStatusEnum::EXITED), ContainerState::Exited);
    assert_eq!(container_state(ContainerStateStatusEnum::DEAD), ContainerState::Exited);
    assert_eq!(container_state(ContainerStateStatusEnum::RUNNING), ContainerState::Running);
  }
}
