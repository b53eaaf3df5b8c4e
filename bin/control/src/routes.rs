//! The control plane's small HTTP surface: trigger a rollout, rotate a
//! service's secret, and inspect what's currently tracked. Everything else
//! (auto-scaling, backups) runs off the background tick loops in `main`,
//! not a route.

use std::sync::Arc;

use axum::{Json, extract::State};
use drydock_client::{api::AgentClient, entities::server::Server, entities::service::ProjectConfig};
use provisioner::TemplateProvisioner;
use response::Response;
use secrets::SecretsStore;
use serde::{Deserialize, Serialize};
use serror::AddStatusCodeError;

use crate::state::ControlRuntime;

#[derive(Debug, Deserialize)]
pub struct DeployRequest {
  pub project: ProjectConfig,
  pub version: String,
}

#[derive(Debug, Serialize)]
pub struct DeployResponse {
  pub outcomes: Vec<ServiceOutcome>,
}

#[derive(Debug, Serialize)]
pub struct ServiceOutcome {
  pub service: String,
  pub ok: bool,
  pub error: Option<String>,
}

/// `POST /deploy`: validates the project, runs the full rollout, and on any
/// partial success still records the version so the auto-scale loop has
/// something to redeploy against (a later fix to one failed tier shouldn't
/// have to replay every other tier's already-healthy services).
pub async fn deploy(
  State(runtime): State<Arc<ControlRuntime>>,
  Json(req): Json<DeployRequest>,
) -> serror::Result<Response<DeployResponse>> {
  req.project.validate().map_err(|e| anyhow::anyhow!(e).status_code(reqwest::StatusCode::BAD_REQUEST))?;

  let provisioner: TemplateProvisioner<'_> = runtime.provisioner();
  let ctx = runtime.deploy_ctx(&provisioner);
  let outcomes = deploy::deploy_project(&ctx, &req.project, &req.version).await;

  for (service, ok) in &outcomes {
    tracing::info!("{}", formatting::step(service, ok.is_ok()));
  }
  runtime.remember_project(req.project, &req.version);

  Ok(Response(DeployResponse {
    outcomes: outcomes
      .into_iter()
      .map(|(service, result)| match result {
        Ok(()) => ServiceOutcome { service, ok: true, error: None },
        Err(e) => ServiceOutcome { service, ok: false, error: Some(e.to_string()) },
      })
      .collect(),
  }))
}

#[derive(Debug, Deserialize)]
pub struct RotateSecretRequest {
  pub tenant: String,
  pub project: String,
  pub env: String,
  pub service: String,
  pub key: String,
}

#[derive(Debug, Serialize)]
pub struct RotateSecretResponse {
  pub hosts_rotated: usize,
  pub hosts_fanned_out: usize,
}

/// `POST /secrets/rotate`: rotates `key` on every host carrying the named
/// service, then fans the new value out to every other service in the
/// project that lists it under `depends_on` (`spec.md` §4.F).
pub async fn rotate_secret(
  State(runtime): State<Arc<ControlRuntime>>,
  Json(req): Json<RotateSecretRequest>,
) -> serror::Result<Response<RotateSecretResponse>> {
  let projects = runtime.projects.load();
  let project = projects
    .iter()
    .find(|p| p.tenant == req.tenant && p.project == req.project && p.env == req.env)
    .ok_or_else(|| anyhow::anyhow!("unknown project").status_code(reqwest::StatusCode::NOT_FOUND))?;
  let service = project
    .services
    .iter()
    .find(|s| s.name == req.service)
    .ok_or_else(|| anyhow::anyhow!("unknown service").status_code(reqwest::StatusCode::NOT_FOUND))?;

  let source_tuple = service.tuple(&project.tenant, &project.project, &project.env);
  let consumers: Vec<_> = project.services.iter().filter(|s| s.depends_on.iter().any(|d| d == &req.service)).collect();
  let consumer_tuples: Vec<_> =
    consumers.iter().map(|s| s.tuple(&project.tenant, &project.project, &project.env)).collect();

  let all_hosts =
    runtime.provider.list(&[]).await.map_err(|e| e.status_code(reqwest::StatusCode::INTERNAL_SERVER_ERROR))?;
  let project_hosts: Vec<&Server> =
    all_hosts.iter().filter(|s| s.hosts_scope(&project.tenant, &project.project, &project.env)).collect();
  let source_hosts = hosts_running(runtime.as_ref(), &project_hosts, &source_tuple).await;

  let store = SecretsStore::new(&runtime.executor, runtime.config.secrets_root.clone());
  let mut hosts_rotated = 0;
  for host in &source_hosts {
    match store.rotate(&host.private_ip.to_string(), &source_tuple, &req.key).await {
      Ok(_) => hosts_rotated += 1,
      Err(e) => tracing::warn!(error = %e, host = %host.id, tuple = %source_tuple, "secret rotation failed on host"),
    }
  }

  let mut hosts_fanned_out = 0;
  for host in &source_hosts {
    if let Err(e) = store.fan_out(&host.private_ip.to_string(), &source_tuple, &req.key, &consumer_tuples).await {
      tracing::warn!(error = %e, host = %host.id, tuple = %source_tuple, "secret fan-out failed on host");
      continue;
    }
    hosts_fanned_out += 1;
  }

  Ok(Response(RotateSecretResponse { hosts_rotated, hosts_fanned_out }))
}

async fn hosts_running<'a>(runtime: &ControlRuntime, hosts: &[&'a Server], tuple: &drydock_client::entities::tuple::Tuple) -> Vec<&'a Server> {
  let mut running = Vec::new();
  for host in hosts {
    let client = AgentClient::new(
      format!("http://{}:{}", host.private_ip, runtime.config.agent_port),
      runtime.config.agent_shared_secret.clone(),
    );
    let Ok(health) = client.get_health().await else { continue };
    if health.containers.iter().any(|c| c.name.starts_with(&tuple.to_string())) {
      running.push(*host);
    }
  }
  running
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
  pub projects: Vec<ProjectStatus>,
}

#[derive(Debug, Serialize)]
pub struct ProjectStatus {
  pub tenant: String,
  pub project: String,
  pub env: String,
  pub version: Option<String>,
  pub service_count: usize,
}

/// `GET /status`: what this control plane currently believes is deployed,
/// for an operator to sanity-check against the provider's own tags.
pub async fn status(State(runtime): State<Arc<ControlRuntime>>) -> Response<StatusResponse> {
  let projects = runtime
    .projects
    .load()
    .iter()
    .map(|p| ProjectStatus {
      tenant: p.tenant.clone(),
      project: p.project.clone(),
      env: p.env.clone(),
      version: runtime.version_for(&p.tenant, &p.project, &p.env),
      service_count: p.services.len(),
    })
    .collect();
  Response(StatusResponse { projects })
}
