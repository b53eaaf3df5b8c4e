use anyhow::{Context, anyhow};
use reqwest::StatusCode;

use super::{
  AUTH_HEADER, DeployRequest, DeployResponse, GetHealthResponse, ReloadSidecarRequest,
  ReloadSidecarResponse, RestartRequest, RestartResponse,
};

/// A thin reqwest wrapper over one Health Agent's HTTP surface
/// (`spec.md` §4.H). Used by the control plane's rollout coordinator and by
/// peer Health Monitors probing each other.
pub struct AgentClient {
  http: reqwest::Client,
  base_url: String,
  shared_secret: String,
}

impl AgentClient {
  pub fn new(base_url: impl Into<String>, shared_secret: impl Into<String>) -> Self {
    Self {
      http: reqwest::Client::new(),
      base_url: base_url.into(),
      shared_secret: shared_secret.into(),
    }
  }

  pub async fn get_health(&self) -> anyhow::Result<GetHealthResponse> {
    self.send_get(&format!("{}/health", self.base_url)).await
  }

  pub async fn restart_container(
    &self,
    container_name: impl Into<String>,
  ) -> anyhow::Result<RestartResponse> {
    self
      .send_post(
        &format!("{}/restart", self.base_url),
        &RestartRequest { container_name: container_name.into() },
      )
      .await
  }

  pub async fn deploy(&self, req: DeployRequest) -> anyhow::Result<DeployResponse> {
    self.send_post(&format!("{}/deploy", self.base_url), &req).await
  }

  pub async fn reload_sidecar(&self) -> anyhow::Result<ReloadSidecarResponse> {
    self
      .send_post(&format!("{}/reload_sidecar", self.base_url), &ReloadSidecarRequest {})
      .await
  }

  async fn send_get<T: serde::de::DeserializeOwned>(&self, url: &str) -> anyhow::Result<T> {
    let res = self
      .http
      .get(url)
      .header(AUTH_HEADER, &self.shared_secret)
      .send()
      .await
      .with_context(|| format!("failed to reach agent at {url}"))?;
    Self::into_body(res).await
  }

  async fn send_post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
    &self,
    url: &str,
    body: &B,
  ) -> anyhow::Result<T> {
    let res = self
      .http
      .post(url)
      .header(AUTH_HEADER, &self.shared_secret)
      .json(body)
      .send()
      .await
      .with_context(|| format!("failed to reach agent at {url}"))?;
    Self::into_body(res).await
  }

  async fn into_body<T: serde::de::DeserializeOwned>(res: reqwest::Response) -> anyhow::Result<T> {
    let status = res.status();
    if status == StatusCode::UNAUTHORIZED {
      return Err(anyhow!("agent rejected X-Deploy-Auth"));
    }
    if !status.is_success() {
      let text = res.text().await.unwrap_or_default();
      return Err(anyhow!("agent returned {status}: {text}"));
    }
    res.json::<T>().await.context("failed to decode agent response body")
  }
}
