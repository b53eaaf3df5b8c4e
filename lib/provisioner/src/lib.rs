//! Component D — Template Provisioner.
//!
//! For each region, lazily bakes (or reuses) a template snapshot carrying
//! the container runtime, sidecar binary + empty `stream.d/`, health-agent
//! binary/unit, and health-monitor schedule. New servers clone from that
//! snapshot (`spec.md` §4.D); reprovisioning the template is a deliberate,
//! manual act — it never retroactively touches already-running servers.

use std::time::Duration;

use drydock_client::entities::server::{Server, ServerSpec};
use executor::{Executor, LOCAL_HOST, RemoteExecutor};
use inventory::CloudProvider;

/// `spec.md` §4.D: boot-to-ready must land within 90s of the clone call.
const BOOT_READY_TIMEOUT: Duration = Duration::from_secs(90);
const BOOT_POLL_INTERVAL: Duration = Duration::from_secs(3);

pub struct TemplateProvisioner<'a> {
  provider: &'a dyn CloudProvider,
  executor: &'a Executor,
  base_image_id: String,
  /// Installs the container runtime, sidecar, health-agent, and monitor
  /// schedule onto a freshly-booted transient VM before it's snapshotted.
  bake_script: String,
}

impl<'a> TemplateProvisioner<'a> {
  pub fn new(
    provider: &'a dyn CloudProvider,
    executor: &'a Executor,
    base_image_id: impl Into<String>,
    bake_script: impl Into<String>,
  ) -> Self {
    Self { provider, executor, base_image_id: base_image_id.into(), bake_script: bake_script.into() }
  }

  /// Returns the snapshot id for `region`'s template at `version`, baking a
  /// new one if none is tagged yet.
  pub async fn ensure_template(&self, region: &str, version: u32) -> anyhow::Result<String> {
    let existing = self
      .provider
      .list(&[format!("template:{version}"), format!("zone:{region}")])
      .await?;
    if let Some(server) = existing.first() {
      if let Some(snapshot_id) = server.tag_value_snapshot() {
        return Ok(snapshot_id);
      }
    }
    self.bake_new_template(region, version).await
  }

  async fn bake_new_template(&self, region: &str, version: u32) -> anyhow::Result<String> {
    tracing::info!(region, version, "baking new template snapshot");
    let mut tags = std::collections::BTreeSet::new();
    tags.insert("status:baking".to_string());
    tags.insert(format!("zone:{region}"));
    tags.insert("template:0".to_string());

    let transient = self
      .provider
      .clone_from_snapshot(
        &self.base_image_id,
        ServerSpec { region: region.to_string(), cpu: 1, memory_mb: 1024, tags },
      )
      .await?;

    self.wait_until_reachable(&transient).await?;

    let install = self
      .executor
      .run(&transient.private_ip.to_string(), "root", &self.bake_script, None, Duration::from_secs(600))
      .await?;
    if !install.success() {
      self.provider.destroy(&transient.id).await.ok();
      return Err(anyhow::anyhow!("template bake script failed: {}", install.stderr));
    }

    let snapshot_id = self.provider.snapshot(&transient.id, &format!("region-{region}-v{version}")).await?;

    // Keep the baking VM around, retagged, as the queryable record of this
    // template: `status:template` keeps it out of `allocate_hosts`'s
    // `status:active`/`status:reserve` scans, while the `template:{version}`
    // + `zone:{region}` tags are exactly what `ensure_template`'s `list`
    // looks up to reuse this snapshot instead of rebaking.
    let tags: Vec<String> = vec![
      "status:template".to_string(),
      format!("zone:{region}"),
      format!("template:{version}"),
      format!("snapshot:{snapshot_id}"),
    ];
    self.provider.set_tags(&transient.id, &tags).await?;

    tracing::info!(region, version, snapshot_id, "template baked");
    Ok(snapshot_id)
  }

  /// Clones a new server from `snapshot_id` and blocks until it answers
  /// on the executor (boot-to-ready ≤ 90s, `spec.md` §4.D).
  pub async fn clone_server(&self, snapshot_id: &str, spec: ServerSpec) -> anyhow::Result<Server> {
    let server = self.provider.clone_from_snapshot(snapshot_id, spec).await?;
    self.wait_until_reachable(&server).await?;
    Ok(server)
  }

  async fn wait_until_reachable(&self, server: &Server) -> anyhow::Result<()> {
    let host = if server.private_ip.to_string() == "0.0.0.0" { LOCAL_HOST.to_string() } else { server.private_ip.to_string() };
    tokio::time::timeout(BOOT_READY_TIMEOUT, async {
      loop {
        if self.executor.run(&host, "root", "true", None, Duration::from_secs(5)).await.is_ok() {
          return;
        }
        tokio::time::sleep(BOOT_POLL_INTERVAL).await;
      }
    })
    .await
    .map_err(|_| anyhow::anyhow!("server {} did not become reachable within {BOOT_READY_TIMEOUT:?}", server.id))
  }
}

trait SnapshotTag {
  fn tag_value_snapshot(&self) -> Option<String>;
}

impl SnapshotTag for Server {
  fn tag_value_snapshot(&self) -> Option<String> {
    self.tags.iter().find_map(|t| t.strip_prefix("snapshot:")).map(str::to_string)
  }
}
