//! Drives Component J's per-service dump/verify/prune cycle on a fixed
//! interval. `lib/backup::BackupOrchestrator` does the actual work over one
//! host; this module finds which hosts and services need a run this tick.
//!
//! There's no per-service retention field on `ServiceConfig` — everything
//! uses the same keep-count, matching the single `backup_interval_s` knob
//! `ControlConfig` already carries for cadence.

use std::collections::HashMap;

use backup::BackupOrchestrator;
use drydock_client::{api::AgentClient, entities::server::Server};

use crate::state::ControlRuntime;

const RETENTION_COUNT: u32 = 7;

pub async fn tick(runtime: &ControlRuntime) {
  let projects = runtime.projects.load();
  for project in projects.iter() {
    if let Err(e) = tick_project(runtime, project).await {
      tracing::warn!(
        error = %e,
        tenant = %project.tenant, project = %project.project, env = %project.env,
        "backup cycle failed for project"
      );
    }
  }
}

async fn tick_project(
  runtime: &ControlRuntime,
  project: &drydock_client::entities::service::ProjectConfig,
) -> anyhow::Result<()> {
  let stateful: Vec<_> = project.services.iter().filter(|s| s.kind.is_stateful()).collect();
  if stateful.is_empty() {
    return Ok(());
  }

  let hosts = runtime.provider.list(&[]).await?;
  let hosts: Vec<&Server> =
    hosts.iter().filter(|s| s.hosts_scope(&project.tenant, &project.project, &project.env)).collect();
  let orchestrator = BackupOrchestrator::new(&runtime.executor);

  for service in stateful {
    let tuple = service.tuple(&project.tenant, &project.project, &project.env);

    let mut containers_by_host: HashMap<&str, Vec<String>> = HashMap::new();
    for host in &hosts {
      let client = AgentClient::new(
        format!("http://{}:{}", host.private_ip, runtime.config.agent_port),
        runtime.config.agent_shared_secret.clone(),
      );
      let Ok(health) = client.get_health().await else { continue };
      let names: Vec<String> =
        health.containers.iter().filter(|c| c.name.starts_with(&tuple.to_string())).map(|c| c.name.clone()).collect();
      if !names.is_empty() {
        containers_by_host.insert(host.id.as_str(), names);
      }
    }

    for host in &hosts {
      let Some(names) = containers_by_host.get(host.id.as_str()) else { continue };
      for container_name in names {
        match orchestrator.run_backup(&host.private_ip.to_string(), &tuple, container_name, &service.kind).await {
          Ok(result) => tracing::info!(%tuple, path = %result.path, size_bytes = result.size_bytes, "backup taken"),
          Err(e) => tracing::warn!(error = %e, %tuple, container_name, "backup run failed"),
        }
      }
      if let Err(e) = orchestrator.prune_retention(&host.private_ip.to_string(), &tuple, RETENTION_COUNT).await {
        tracing::warn!(error = %e, %tuple, "backup retention prune failed");
      }
    }
  }
  Ok(())
}
