//! The control plane's runtime — one instance built once in `main`, shared
//! across every axum handler and the two background tick loops behind an
//! `Arc`. Per `SPEC_FULL.md` §9: explicit owner struct, no module-level
//! globals beyond the `OnceLock`-backed config/logger
//! (`crate::config::control_config`).

use std::collections::HashMap;

use arc_swap::ArcSwap;
use drydock_client::entities::service::ProjectConfig;
use executor::Executor;
use inventory::{AwsProvider, CloudProvider};
use provisioner::TemplateProvisioner;
use deploy::DeployCtx;

use crate::config::ControlConfig;

pub struct ControlRuntime {
  pub config: ControlConfig,
  pub executor: Executor,
  pub provider: Box<dyn CloudProvider>,
  /// Every project this control plane has been asked to deploy, kept
  /// in-memory so the auto-scaling and backup tick loops have something to
  /// iterate. Reset on restart — there is no durable store beyond the
  /// provider's own tags (`spec.md` §5).
  pub projects: ArcSwap<Vec<ProjectConfig>>,
  /// The image version last deployed for each `(tenant, project, env)`
  /// scope (keyed by `Tuple::scope` joined with `_`), so a later
  /// auto-scale redeploy knows what to re-pull.
  pub versions: ArcSwap<HashMap<String, String>>,
}

impl ControlRuntime {
  pub async fn new(config: ControlConfig) -> anyhow::Result<Self> {
    Ok(Self {
      config,
      executor: Executor::new(),
      provider: Box::new(AwsProvider::connect().await),
      projects: ArcSwap::new(std::sync::Arc::new(Vec::new())),
      versions: ArcSwap::new(std::sync::Arc::new(HashMap::new())),
    })
  }

  pub fn provisioner(&self) -> TemplateProvisioner<'_> {
    TemplateProvisioner::new(
      self.provider.as_ref(),
      &self.executor,
      self.config.base_image_id.clone(),
      self.config.bake_script.clone(),
    )
  }

  pub fn deploy_ctx<'a>(&'a self, provisioner: &'a TemplateProvisioner<'a>) -> DeployCtx<'a> {
    DeployCtx {
      provider: self.provider.as_ref(),
      executor: &self.executor,
      provisioner,
      secrets_root: self.config.secrets_root.clone(),
      docker_hub_user: self.config.docker_hub_user.clone(),
      template_version: self.config.template_version,
    }
  }

  /// Replaces any prior entry for the same `(tenant, project, env)` and
  /// records this one, so the tick loops pick it up on their next pass.
  pub fn remember_project(&self, project: ProjectConfig, version: &str) {
    let scope_key = format!("{}_{}_{}", project.tenant, project.project, project.env);
    let mut projects = (**self.projects.load()).clone();
    projects.retain(|p| !(p.tenant == project.tenant && p.project == project.project && p.env == project.env));
    projects.push(project);
    self.projects.store(std::sync::Arc::new(projects));

    let mut versions = (**self.versions.load()).clone();
    versions.insert(scope_key, version.to_string());
    self.versions.store(std::sync::Arc::new(versions));
  }

  pub fn version_for(&self, tenant: &str, project: &str, env: &str) -> Option<String> {
    self.versions.load().get(&format!("{tenant}_{project}_{env}")).cloned()
  }

  /// Persists an auto-scaled service (replica count or `server_cpu`/
  /// `server_memory_mb` resize) back into its project, keeping the image
  /// version unchanged since only the topology moved.
  pub fn remember_scaled_service(&self, project: &ProjectConfig, scaled: drydock_client::entities::service::ServiceConfig) {
    let Some(version) = self.version_for(&project.tenant, &project.project, &project.env) else { return };
    let mut updated = project.clone();
    for service in &mut updated.services {
      if service.name == scaled.name {
        *service = scaled.clone();
        break;
      }
    }
    self.remember_project(updated, &version);
  }
}
