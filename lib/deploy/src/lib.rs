//! Component G — the Deployment Engine.
//!
//! Runs the per-service rollout state machine (`spec.md` §4.G):
//! `Plan -> AllocateHosts -> ForEachHost{DetermineToggle -> Start -> HealthGate
//! -> RecordDeployment} -> UpdateSidecarsAllHosts -> StopOldContainers ->
//! ReclaimHosts -> Done | Failed(rollback)`. A `deploy_lock:{T}` tag on
//! every host a rollout touches keeps two concurrent rollouts of the same
//! tuple from racing; a rollout that fails its health gate on any host
//! rolls back every container it started on the others and never points
//! the sidecar at a half-healthy backend set.

mod autoscale;
mod health_gate;
mod toggle;

pub use autoscale::{
  MAX_SERVER_CPU, MIN_SERVER_CPU, ResourceSample, SampleWindow, ScalingDecision,
  decide as decide_scaling, decide_with_cooldown,
};

use std::net::IpAddr;
use std::time::Duration;

use chrono::Utc;
use drydock_client::entities::{
  deployment::DeploymentRecord,
  error::{DeployError, ProviderErrorKind},
  server::{Server, ServerSpec, ServerStatus},
  service::{ProjectConfig, ServiceConfig, ServiceKind},
  sidecar::{SidecarMode, SidecarStreamBlock, Upstream},
  tuple::{Toggle, Tuple},
};
use executor::{Executor, RemoteExecutor};
use inventory::CloudProvider;
use provisioner::TemplateProvisioner;
use secrets::SecretsStore;
use sidecar::SidecarConfigurator;

const DEPLOY_LOCK_PREFIX: &str = "deploy_lock:";
const SECRETS_MOUNT_POINT: &str = "/run/secrets";

/// Everything a rollout needs beyond what's in the `ProjectConfig`/`ServiceConfig`.
pub struct DeployCtx<'a> {
  pub provider: &'a dyn CloudProvider,
  pub executor: &'a Executor,
  pub provisioner: &'a TemplateProvisioner<'a>,
  pub secrets_root: std::path::PathBuf,
  pub docker_hub_user: String,
  pub template_version: u32,
}

impl<'a> DeployCtx<'a> {
  fn sidecar(&self) -> SidecarConfigurator<'a> {
    SidecarConfigurator::new(self.executor)
  }

  fn secrets(&self) -> SecretsStore<'a> {
    SecretsStore::new(self.executor, self.secrets_root.clone())
  }
}

/// Deploys every service in `project`, tier by tier (`ProjectConfig::startup_order`).
/// Services sharing a tier roll out concurrently; a tier never starts until
/// every service in the tier before it has finished (successfully or not —
/// a dependency that failed to deploy is still "finished" as far as
/// ordering goes, since its dependents would fail their own health gate
/// against it regardless).
pub async fn deploy_project(
  ctx: &DeployCtx<'_>,
  project: &ProjectConfig,
  version: &str,
) -> Vec<(String, Result<(), DeployError>)> {
  let mut outcomes = Vec::new();
  for tier in project.startup_order() {
    let results =
      futures_util::future::join_all(tier.iter().map(|service| deploy_service(ctx, project, service, version)))
        .await;
    for (service, result) in tier.into_iter().zip(results) {
      outcomes.push((service.name.clone(), result));
    }
  }
  reclaim_excess_hosts(ctx, project).await;
  outcomes
}

/// Rolls out one service: acquires the per-host deploy lock, runs the
/// blue/green state machine, and always releases the lock on the way out.
pub async fn deploy_service(
  ctx: &DeployCtx<'_>,
  project: &ProjectConfig,
  service: &ServiceConfig,
  version: &str,
) -> Result<(), DeployError> {
  let tuple = service.tuple(&project.tenant, &project.project, &project.env);

  if !service.kind.is_long_running() {
    return deploy_scheduled(ctx, &tuple, service, version).await;
  }

  // A read-only scope lookup, not a tag write: lets scenario 6's "reject
  // within 1 s, no host touched" hold even while `allocate_hosts` below
  // could otherwise provision a brand-new host before the per-host lock
  // loop ever runs.
  if rollout_locked(ctx, &tuple, service)
    .await
    .map_err(|e| DeployError::Provider { kind: ProviderErrorKind::Transient, message: e.to_string() })?
  {
    return Err(DeployError::RolloutInProgress(tuple));
  }

  let hosts = allocate_hosts(ctx, &tuple, service)
    .await
    .map_err(|e| DeployError::Provider { kind: ProviderErrorKind::Transient, message: e.to_string() })?;

  let mut locked = Vec::new();
  for host in &hosts {
    let acquired = inventory::try_acquire_tag_lock(ctx.provider, &host.id, DEPLOY_LOCK_PREFIX, &tuple.to_string())
      .await
      .map_err(|e| DeployError::Provider { kind: ProviderErrorKind::Transient, message: e.to_string() })?;
    if !acquired {
      release_locks(ctx, &locked).await;
      return Err(DeployError::RolloutInProgress(tuple));
    }
    locked.push(host.id.clone());
  }

  let result = roll_out_to_hosts(ctx, &tuple, service, version, &hosts).await;
  release_locks(ctx, &locked).await;
  result
}

async fn release_locks(ctx: &DeployCtx<'_>, server_ids: &[String]) {
  for id in server_ids {
    let _ = inventory::release_tag_lock(ctx.provider, id, DEPLOY_LOCK_PREFIX).await;
  }
}

/// One-shot cron services never hold a blue/green slot: a fresh rollout
/// just re-pulls the image and replaces the crontab entry.
async fn deploy_scheduled(
  ctx: &DeployCtx<'_>,
  tuple: &Tuple,
  service: &ServiceConfig,
  version: &str,
) -> Result<(), DeployError> {
  let ServiceKind::Scheduled { schedule, .. } = &service.kind else {
    unreachable!("deploy_scheduled called with a long-running kind")
  };

  let hosts = allocate_hosts(ctx, tuple, service)
    .await
    .map_err(|e| DeployError::Provider { kind: ProviderErrorKind::Transient, message: e.to_string() })?;
  let host = hosts.first().ok_or_else(|| DeployError::Provider {
    kind: ProviderErrorKind::Permanent,
    message: format!("no host allocated for scheduled service {tuple}"),
  })?;
  let host_ip = host.private_ip.to_string();
  let image = naming::image_tag(tuple, &ctx.docker_hub_user, version);
  let container_name = naming::container_name(tuple);

  let pull = ctx
    .executor
    .run(&host_ip, "root", &format!("docker pull {image}"), None, Duration::from_secs(300))
    .await
    .map_err(|e| DeployError::Transport { host: host_ip.clone(), message: e.to_string() })?;
  if !pull.success() {
    return Err(DeployError::Transport { host: host_ip, message: pull.stderr });
  }

  let cron_line = format!("{} docker run --rm --name {container_name}_$(date +\\%s) {image}", schedule.expression);
  let install = ctx
    .executor
    .run(
      &host_ip,
      "root",
      &format!("(crontab -l 2>/dev/null | grep -v '{container_name}'; echo \"{cron_line}\") | crontab -"),
      None,
      Duration::from_secs(10),
    )
    .await
    .map_err(|e| DeployError::Transport { host: host_ip.clone(), message: e.to_string() })?;
  if !install.success() {
    return Err(DeployError::Transport { host: host_ip, message: install.stderr });
  }
  Ok(())
}

/// Whether any host already in `tuple`'s scope carries a live
/// `deploy_lock:{tuple}` tag. A plain read against the provider, taken
/// before `allocate_hosts` can provision anything.
async fn rollout_locked(ctx: &DeployCtx<'_>, tuple: &Tuple, service: &ServiceConfig) -> anyhow::Result<bool> {
  let scoped = vec![
    format!("owner:{}", tuple.tenant),
    format!("project:{}", tuple.project),
    format!("env:{}", tuple.env),
    format!("zone:{}", service.server_zone),
  ];
  let lock_tag = format!("{DEPLOY_LOCK_PREFIX}{tuple}");
  let hosts = ctx.provider.list(&scoped).await?;
  Ok(hosts.iter().any(|h| h.tags.contains(&lock_tag)))
}

/// Picks (or provisions) `service.servers_count` active hosts in
/// `service.server_zone` owned by this tuple's scope. Reserve-pool hosts
/// are claimed first; only once the reserve is empty does this clone a
/// fresh host from the zone's template (`spec.md` §4.D/§4.C).
async fn allocate_hosts(ctx: &DeployCtx<'_>, tuple: &Tuple, service: &ServiceConfig) -> anyhow::Result<Vec<Server>> {
  let scoped = vec![
    format!("owner:{}", tuple.tenant),
    format!("project:{}", tuple.project),
    format!("env:{}", tuple.env),
    format!("zone:{}", service.server_zone),
  ];
  let mut hosts: Vec<Server> =
    ctx.provider.list(&scoped).await?.into_iter().filter(|s| s.status() == Some(ServerStatus::Active)).collect();

  while (hosts.len() as u32) < service.servers_count {
    let reserve = ctx
      .provider
      .list(&[format!("zone:{}", service.server_zone), "status:reserve".to_string()])
      .await?
      .into_iter()
      .next();

    let server = match reserve {
      Some(reserved) => {
        let mut tags: Vec<String> =
          reserved.tags.iter().filter(|t| t.as_str() != "status:reserve").cloned().collect();
        tags.push("status:active".to_string());
        tags.push(format!("owner:{}", tuple.tenant));
        tags.push(format!("project:{}", tuple.project));
        tags.push(format!("env:{}", tuple.env));
        ctx.provider.set_tags(&reserved.id, &tags).await?;
        Server { tags: tags.into_iter().collect(), ..reserved }
      }
      None => {
        let snapshot_id = ctx.provisioner.ensure_template(&service.server_zone, ctx.template_version).await?;
        let mut tags = std::collections::BTreeSet::new();
        tags.insert("status:active".to_string());
        tags.insert(format!("owner:{}", tuple.tenant));
        tags.insert(format!("project:{}", tuple.project));
        tags.insert(format!("env:{}", tuple.env));
        tags.insert(format!("zone:{}", service.server_zone));
        ctx
          .provisioner
          .clone_server(
            &snapshot_id,
            ServerSpec { region: service.server_zone.clone(), cpu: service.server_cpu, memory_mb: service.server_memory_mb, tags },
          )
          .await?
      }
    };
    hosts.push(server);
  }

  hosts.truncate(service.servers_count as usize);
  Ok(hosts)
}

/// After a project-wide rollout, hosts this tenant/project/env no longer
/// needs are moved to `status:reserve` (up to `reserve_budget`) rather than
/// destroyed outright, so the next scale-up or rollout can reclaim them
/// without a fresh boot.
async fn reclaim_excess_hosts(ctx: &DeployCtx<'_>, project: &ProjectConfig) {
  let needed: u32 = project.services.iter().map(|s| if s.kind.is_long_running() { s.servers_count } else { 0 }).sum();
  let scoped =
    vec![format!("owner:{}", project.tenant), format!("project:{}", project.project), format!("env:{}", project.env)];
  let Ok(active) = ctx.provider.list(&scoped).await else { return };
  let mut active: Vec<Server> = active.into_iter().filter(|s| s.status() == Some(ServerStatus::Active)).collect();
  active.sort_by_key(|s| s.created_at);

  let mut reserved_so_far = 0u32;
  while (active.len() as u32) > needed {
    let Some(excess) = active.pop() else { break };
    if reserved_so_far < project.reserve_budget {
      let tags: Vec<String> = excess
        .tags
        .iter()
        .filter(|t| !t.starts_with("status:") && !t.starts_with("owner:") && !t.starts_with("project:") && !t.starts_with("env:"))
        .cloned()
        .chain(std::iter::once("status:reserve".to_string()))
        .collect();
      if ctx.provider.set_tags(&excess.id, &tags).await.is_ok() {
        reserved_so_far += 1;
      }
    } else {
      let _ = ctx.provider.destroy(&excess.id).await;
    }
  }
}

/// The blue/green rollout across every allocated host: start the new
/// container on each, health-gate it, then only once *every* host is
/// healthy cut the sidecar over and remove the old containers. Any health
/// gate failure rolls back every container started so far and leaves the
/// previous backend set serving untouched.
async fn roll_out_to_hosts(
  ctx: &DeployCtx<'_>,
  tuple: &Tuple,
  service: &ServiceConfig,
  version: &str,
  hosts: &[Server],
) -> Result<(), DeployError> {
  let mut live = Vec::new();
  let mode = SidecarConfigurator::choose_mode(hosts.len());

  for host in hosts {
    let host_ip = host.private_ip.to_string();
    let decision = toggle::determine_toggle(ctx.executor, &host_ip, tuple)
      .await
      .map_err(|e| DeployError::Transport { host: host_ip.clone(), message: e.to_string() })?;

    let record = start_container(ctx, tuple, service, version, &host_ip, decision.next, mode).await;
    let record = match record {
      Ok(record) => record,
      Err(e) => {
        rollback(ctx, &live).await;
        return Err(e);
      }
    };

    if let Err(e) = health_gate::health_gate(
      ctx.executor,
      &host_ip,
      tuple,
      &record.container_name,
      record.host_port,
      &service.kind,
    )
    .await
    {
      let _ = ctx.executor.run(&host_ip, "root", &format!("docker rm -f {}", record.container_name), None, Duration::from_secs(15)).await;
      rollback(ctx, &live).await;
      return Err(e);
    }

    if let Some(stale_toggle) = decision.stale {
      let stale_name = naming::container_name_for(tuple, stale_toggle);
      let _ = ctx.executor.run(&host_ip, "root", &format!("docker rm -f {stale_name}"), None, Duration::from_secs(15)).await;
    }

    live.push((host.private_ip, record));
  }

  let block = build_sidecar_block(tuple, service, &live, mode);
  let sidecar = ctx.sidecar();
  for (host_ip, _) in &live {
    let host_ip = host_ip.to_string();
    let previous = sidecar.read_current(&host_ip, &block).await;
    sidecar.write_and_reload(&host_ip, &block, previous.as_deref()).await?;
  }

  for (host_ip, record) in &live {
    let old_toggle = record.toggle.other();
    let old_name = naming::container_name_for(tuple, old_toggle);
    let _ = ctx
      .executor
      .run(&host_ip.to_string(), "root", &format!("docker rm -f {old_name}"), None, Duration::from_secs(15))
      .await;
  }

  Ok(())
}

async fn rollback(ctx: &DeployCtx<'_>, started: &[(IpAddr, DeploymentRecord)]) {
  for (host_ip, record) in started {
    let _ = ctx
      .executor
      .run(&host_ip.to_string(), "root", &format!("docker rm -f {}", record.container_name), None, Duration::from_secs(15))
      .await;
  }
}

async fn start_container(
  ctx: &DeployCtx<'_>,
  tuple: &Tuple,
  service: &ServiceConfig,
  version: &str,
  host_ip: &str,
  toggle: Toggle,
  mode: SidecarMode,
) -> Result<DeploymentRecord, DeployError> {
  if service.kind.is_stateful() {
    ctx
      .secrets()
      .generate_if_missing(host_ip, tuple, "password")
      .await
      .map_err(|e| DeployError::Transport { host: host_ip.to_string(), message: e.to_string() })?;
  }

  let container_name = naming::container_name_for(tuple, toggle);
  let image = naming::image_tag(tuple, &ctx.docker_hub_user, version);
  // Host-port binding only applies in multi-host mode (`spec.md` §4.E):
  // single-host mode resolves upstreams by container name, no published port.
  let host_port = if matches!(mode, SidecarMode::MultiHost) {
    service.kind.container_port().map(|p| naming::host_port_for(tuple, p, toggle))
  } else {
    None
  };

  let record = DeploymentRecord {
    tuple: tuple.clone(),
    toggle,
    container_name: container_name.clone(),
    version: version.to_string(),
    host_port,
    started_at: Utc::now(),
    image_digest: image.clone(),
  };

  let mut cmd = format!("docker run -d --name {container_name} --restart unless-stopped");
  for (key, value) in record.to_labels() {
    cmd.push_str(&format!(" --label {key}={value}"));
  }
  if let (Some(host_port), Some(container_port)) = (host_port, service.kind.container_port()) {
    cmd.push_str(&format!(" -p {host_port}:{container_port}"));
  }
  if service.kind.is_stateful() {
    let secrets_dir = secrets_mount_dir(&ctx.secrets_root, tuple);
    cmd.push_str(&format!(" -v {secrets_dir}:{SECRETS_MOUNT_POINT}:ro"));
  }
  cmd.push_str(&format!(" {image}"));

  let result = ctx
    .executor
    .run(host_ip, "root", &cmd, None, Duration::from_secs(60))
    .await
    .map_err(|e| DeployError::Transport { host: host_ip.to_string(), message: e.to_string() })?;
  if !result.success() {
    return Err(DeployError::Transport { host: host_ip.to_string(), message: result.stderr });
  }
  Ok(record)
}

fn secrets_mount_dir(root: &std::path::Path, tuple: &Tuple) -> String {
  root.join(&tuple.tenant).join(&tuple.project).join(&tuple.env).join("secrets").join(&tuple.service).to_string_lossy().into_owned()
}

fn build_sidecar_block(
  tuple: &Tuple,
  service: &ServiceConfig,
  live: &[(IpAddr, DeploymentRecord)],
  mode: SidecarMode,
) -> SidecarStreamBlock {
  let container_port = service.kind.container_port().unwrap_or(0);
  let upstreams = live
    .iter()
    .map(|(host_ip, record)| match mode {
      SidecarMode::SingleHost => Upstream::ContainerName { name: record.container_name.clone(), port: container_port },
      SidecarMode::MultiHost => Upstream::HostPort { private_ip: *host_ip, port: record.host_port.unwrap_or(container_port) },
    })
    .collect();

  SidecarStreamBlock {
    tuple: tuple.clone(),
    listen: naming::internal_port(tuple),
    upstreams,
    mode,
    connect_timeout: Duration::from_secs(1),
    idle_timeout: Duration::from_secs(60),
    http: matches!(service.kind, ServiceKind::Web { .. }),
  }
}
