//! Drives `deploy::decide_scaling` off a live-probed resource signal
//! (`spec.md` §4.G Auto-scaling): every cycle, for each service carrying an
//! `auto_scaling` policy, probe every host in its `(tenant, project, env)`
//! scope over the Health Agent's `/health` route and fold the result into a
//! [`ResourceSample`].
//!
//! The Health Agent's `HostHealth` doesn't carry CPU/memory/RPS gauges —
//! deep per-container resource metrics are out of scope here the way
//! `spec.md`'s Non-goals scope out a full observability stack. As an
//! interim load signal this cycle instead derives `cpu_pct` from the
//! fraction of a service's containers that are not `Running`, which moves
//! in the same direction a real gauge would (crash-looping or missing
//! containers mean the service is under strain) without claiming to be
//! an actual utilization reading.

use std::collections::HashMap;

use chrono::Utc;
use deploy::{MAX_SERVER_CPU, MIN_SERVER_CPU, ResourceSample, ScalingDecision, SampleWindow, decide_with_cooldown};
use drydock_client::{
  api::AgentClient,
  entities::{health::ContainerState, server::Server, service::ProjectConfig},
};
use inventory::CloudProvider;
use provisioner::TemplateProvisioner;

use crate::state::ControlRuntime;

pub async fn tick(runtime: &ControlRuntime, windows: &mut HashMap<String, SampleWindow>) {
  let projects = runtime.projects.load();
  for project in projects.iter() {
    if let Err(e) = tick_project(runtime, project, windows).await {
      tracing::warn!(error = %e, tenant = %project.tenant, project = %project.project, env = %project.env, "autoscale cycle failed for project");
    }
  }
}

async fn tick_project(
  runtime: &ControlRuntime,
  project: &ProjectConfig,
  windows: &mut HashMap<String, SampleWindow>,
) -> anyhow::Result<()> {
  let hosts = runtime.provider.list(&[]).await?;
  let hosts: Vec<&Server> =
    hosts.iter().filter(|s| s.hosts_scope(&project.tenant, &project.project, &project.env)).collect();

  for service in &project.services {
    let Some(scaling) = &service.auto_scaling else { continue };
    let tuple = service.tuple(&project.tenant, &project.project, &project.env);

    let mut sample = ResourceSample::default();
    let mut probed = 0u32;
    for host in &hosts {
      let client = AgentClient::new(format!("http://{}:{}", host.private_ip, runtime.config.agent_port), runtime.config.agent_shared_secret.clone());
      let Ok(health) = client.get_health().await else { continue };
      let relevant: Vec<_> = health.containers.iter().filter(|c| c.name.starts_with(&tuple.to_string())).collect();
      if relevant.is_empty() {
        continue;
      }
      let down = relevant.iter().filter(|c| c.state != ContainerState::Running).count() as f32;
      sample.cpu_pct += (down / relevant.len() as f32) * 100.0;
      probed += 1;
    }
    if probed == 0 {
      continue;
    }
    sample.cpu_pct /= probed as f32;

    let window = windows.entry(tuple.to_string()).or_default();
    window.push(sample);
    let decision =
      decide_with_cooldown(window, &scaling.thresholds, service.servers_count, service.server_cpu, Utc::now());

    match decision {
      ScalingDecision::Horizontal { up } => {
        tracing::info!(%tuple, up, "auto-scaling horizontally");
        let replicas = if up {
          service.servers_count + 1
        } else {
          service.servers_count.saturating_sub(1).max(scaling.min_replicas)
        };
        redeploy_with_replicas(runtime, project, service, replicas).await;
      }
      ScalingDecision::Vertical { up } => {
        tracing::info!(%tuple, up, "auto-scaling vertically");
        redeploy_with_resize(runtime, project, service, up).await;
      }
      ScalingDecision::None => {}
    }
  }
  Ok(())
}

async fn redeploy_with_replicas(
  runtime: &ControlRuntime,
  project: &ProjectConfig,
  service: &drydock_client::entities::service::ServiceConfig,
  replicas: u32,
) {
  let mut scaled = service.clone();
  scaled.servers_count = replicas;
  redeploy_scaled_service(runtime, project, scaled).await;
}

/// Halves or doubles `server_cpu`/`server_memory_mb` within
/// `[MIN_SERVER_CPU, MAX_SERVER_CPU]`, then redeploys so the resize takes
/// effect on the next host `deploy_service` provisions or reuses.
async fn redeploy_with_resize(
  runtime: &ControlRuntime,
  project: &ProjectConfig,
  service: &drydock_client::entities::service::ServiceConfig,
  up: bool,
) {
  let mut scaled = service.clone();
  scaled.server_cpu = if up {
    (scaled.server_cpu + 1).min(MAX_SERVER_CPU)
  } else {
    scaled.server_cpu.saturating_sub(1).max(MIN_SERVER_CPU)
  };
  scaled.server_memory_mb = if up { scaled.server_memory_mb * 2 } else { (scaled.server_memory_mb / 2).max(512) };
  redeploy_scaled_service(runtime, project, scaled).await;
}

async fn redeploy_scaled_service(
  runtime: &ControlRuntime,
  project: &ProjectConfig,
  scaled: drydock_client::entities::service::ServiceConfig,
) {
  let Some(version) = runtime.version_for(&project.tenant, &project.project, &project.env) else {
    tracing::warn!(service = %scaled.name, "no known deployed version for auto-scale redeploy, skipping");
    return;
  };
  let provisioner: TemplateProvisioner<'_> = runtime.provisioner();
  let ctx = runtime.deploy_ctx(&provisioner);
  match deploy::deploy_service(&ctx, project, &scaled, &version).await {
    Ok(()) => runtime.remember_scaled_service(project, scaled),
    Err(e) => tracing::warn!(error = %e, service = %scaled.name, "auto-scale redeploy failed"),
  }
}
