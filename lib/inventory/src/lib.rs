//! Component C — Server Inventory.
//!
//! Stateless: every query goes straight to the provider, never cached
//! across calls, so concurrent callers always see live tag state
//! (`spec.md` §4.C). The provider is reached through [`CloudProvider`], an
//! object-safe trait, so a mock/test provider can stand in for AWS in unit
//! tests without a network.

mod aws;
mod backoff;

pub use aws::AwsProvider;

use async_trait::async_trait;
use drydock_client::entities::server::{Server, ServerSpec};

#[async_trait]
pub trait CloudProvider: Send + Sync {
  /// `list(filter=tags)`. Tags are ANDed.
  async fn list(&self, filter_tags: &[String]) -> anyhow::Result<Vec<Server>>;

  /// Replaces the full tag set on a server. Read-modify-write: callers
  /// that only want to add/remove a subset should `list` first.
  async fn set_tags(&self, id: &str, tags: &[String]) -> anyhow::Result<()>;

  async fn destroy(&self, id: &str) -> anyhow::Result<()>;

  /// Returns the new snapshot id.
  async fn snapshot(&self, id: &str, name: &str) -> anyhow::Result<String>;

  async fn clone_from_snapshot(&self, snapshot_id: &str, spec: ServerSpec) -> anyhow::Result<Server>;
}

/// Advisory-lock tag compare-and-set, built on top of `list`/`set_tags`
/// since the provider is the only shared mutable store (`spec.md` §5).
/// Used for both `deploy_lock:{T}` and `recovery_owner:{leader_ip}:{nonce}`.
pub async fn try_acquire_tag_lock(
  provider: &dyn CloudProvider,
  server_id: &str,
  lock_prefix: &str,
  lock_value: &str,
) -> anyhow::Result<bool> {
  let servers = provider.list(&[]).await?;
  let Some(server) = servers.into_iter().find(|s| s.id == server_id) else {
    return Err(anyhow::anyhow!("server {server_id} not found while acquiring lock"));
  };
  if server.tags.iter().any(|t| t.starts_with(lock_prefix)) {
    return Ok(false);
  }
  let mut tags: Vec<String> = server.tags.into_iter().collect();
  tags.push(format!("{lock_prefix}{lock_value}"));
  provider.set_tags(server_id, &tags).await?;
  Ok(true)
}

pub async fn release_tag_lock(
  provider: &dyn CloudProvider,
  server_id: &str,
  lock_prefix: &str,
) -> anyhow::Result<()> {
  let servers = provider.list(&[]).await?;
  let Some(server) = servers.into_iter().find(|s| s.id == server_id) else {
    return Ok(());
  };
  let tags: Vec<String> = server.tags.into_iter().filter(|t| !t.starts_with(lock_prefix)).collect();
  provider.set_tags(server_id, &tags).await
}
