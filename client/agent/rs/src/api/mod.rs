//! The Health Agent's wire API (`spec.md` §4.H, §6): request/response
//! bodies shared between the agent's axum routes and every caller (the
//! Health Monitor, and the control plane's rollout coordinator).

mod client;

pub use client::AgentClient;

use serde::{Deserialize, Serialize};

use crate::entities::health::HostHealth;

pub const AUTH_HEADER: &str = "X-Deploy-Auth";

/// `GET /health`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetHealthRequest {}

pub type GetHealthResponse = HostHealth;

/// `POST /restart`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartRequest {
  pub container_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartResponse {
  pub restarted: bool,
  pub state: crate::entities::health::ContainerState,
}

/// `POST /deploy`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
  pub container_spec: ContainerSpec,
}

/// Everything the Agent needs to run a container matching the Deployment
/// Engine's Start step (`spec.md` §4.G step 4): idempotent by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
  pub name: String,
  pub image: String,
  pub labels: Vec<(String, String)>,
  /// `None` in single-host mode (no host-port binding).
  pub host_port_binding: Option<HostPortBinding>,
  pub mounts: Vec<MountSpec>,
  pub env: Vec<(String, String)>,
  pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostPortBinding {
  pub host_port: u16,
  pub container_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSpec {
  pub host_path: String,
  pub container_path: String,
  pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
  pub container_id: String,
  pub already_existed: bool,
}

/// `POST /reload_sidecar`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReloadSidecarRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadSidecarResponse {
  pub reloaded: bool,
}
