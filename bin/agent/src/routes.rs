//! Handlers for the four routes the Health Agent exposes (`spec.md` §4.H):
//! `GET /health`, `POST /restart`, `POST /deploy`, `POST /reload_sidecar`.
//! Every route is wrapped with [`crate::auth::require_shared_secret`] in
//! `crate::main`.

use std::{sync::Arc, time::Duration};

use axum::{Json, extract::State};
use drydock_client::{
  api::{DeployRequest, DeployResponse, ReloadSidecarResponse, RestartRequest, RestartResponse},
  entities::health::ContainerState,
};
use executor::{LOCAL_HOST, RemoteExecutor};
use reqwest::StatusCode;
use response::Response;
use serror::AddStatusCodeError;

use crate::{health::HealthCollector, state::AgentRuntime};

pub async fn get_health(State(runtime): State<Arc<AgentRuntime>>) -> Response<drydock_client::api::GetHealthResponse> {
  let health = HealthCollector::new(&runtime.docker, &runtime.executor).collect().await;
  Response(health)
}

#[tracing::instrument(skip(runtime), fields(container = %body.container_name))]
pub async fn restart_container(
  State(runtime): State<Arc<AgentRuntime>>,
  Json(body): Json<RestartRequest>,
) -> serror::Result<Response<RestartResponse>> {
  let cmd = format!("docker restart {}", body.container_name);
  let result = runtime
    .executor
    .run(LOCAL_HOST, "root", &cmd, None, Duration::from_secs(20))
    .await
    .map_err(|e| e.status_code(StatusCode::INTERNAL_SERVER_ERROR))?;

  if !result.success() {
    return Err(
      anyhow::anyhow!("docker restart failed: {}", result.stderr).status_code(StatusCode::INTERNAL_SERVER_ERROR),
    );
  }

  let health = HealthCollector::new(&runtime.docker, &runtime.executor).collect().await;
  let state = health
    .containers
    .iter()
    .find(|c| c.name == body.container_name)
    .map(|c| c.state)
    .unwrap_or(ContainerState::Missing);

  Ok(Response(RestartResponse { restarted: true, state }))
}

#[tracing::instrument(skip(runtime, body), fields(container = %body.container_spec.name))]
pub async fn deploy(
  State(runtime): State<Arc<AgentRuntime>>,
  Json(body): Json<DeployRequest>,
) -> serror::Result<Response<DeployResponse>> {
  let spec = body.container_spec;

  let inspect = runtime.docker.inspect_container(&spec.name, None::<bollard::query_parameters::InspectContainerOptions>).await;
  if inspect.is_ok() {
    return Ok(Response(DeployResponse { container_id: spec.name.clone(), already_existed: true }));
  }

  let mut cmd = format!("docker run -d --name {} --restart unless-stopped", spec.name);
  for (key, value) in &spec.labels {
    cmd.push_str(&format!(" --label {key}={value}"));
  }
  for (key, value) in &spec.env {
    cmd.push_str(&format!(" -e {key}={value}"));
  }
  if let Some(binding) = &spec.host_port_binding {
    cmd.push_str(&format!(" -p {}:{}", binding.host_port, binding.container_port));
  }
  for mount in &spec.mounts {
    let ro = if mount.read_only { ":ro" } else { "" };
    cmd.push_str(&format!(" -v {}:{}{ro}", mount.host_path, mount.container_path));
  }
  cmd.push_str(&format!(" {}", spec.image));
  if let Some(command) = &spec.command {
    cmd.push_str(&format!(" {}", command.join(" ")));
  }

  let result = runtime
    .executor
    .run(LOCAL_HOST, "root", &cmd, None, Duration::from_secs(60))
    .await
    .map_err(|e| e.status_code(StatusCode::INTERNAL_SERVER_ERROR))?;
  if !result.success() {
    return Err(anyhow::anyhow!("docker run failed: {}", result.stderr).status_code(StatusCode::INTERNAL_SERVER_ERROR));
  }

  Ok(Response(DeployResponse { container_id: spec.name, already_existed: false }))
}

pub async fn reload_sidecar(State(runtime): State<Arc<AgentRuntime>>) -> serror::Result<Response<ReloadSidecarResponse>> {
  runtime
    .sidecar()
    .reload(LOCAL_HOST)
    .await
    .map_err(|e| anyhow::Error::from(e).status_code(StatusCode::INTERNAL_SERVER_ERROR))?;
  Ok(Response(ReloadSidecarResponse { reloaded: true }))
}
