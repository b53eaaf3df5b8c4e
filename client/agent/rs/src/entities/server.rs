use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A VM as seen through the Server Inventory. All mutable state is carried
/// as provider-side tags (`status`, `owner`, `project`, `env`, `zone`,
/// `template`, plus advisory lock tags) — this struct is the stateless view
/// the Inventory hands back on every query, never cached across calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
  pub id: String,
  pub private_ip: std::net::IpAddr,
  pub public_ip: Option<std::net::IpAddr>,
  pub region: String,
  pub cpu: u32,
  pub memory_mb: u64,
  pub created_at: DateTime<Utc>,
  pub tags: BTreeSet<String>,
}

impl Server {
  pub fn status(&self) -> Option<ServerStatus> {
    self.tag_value("status").and_then(|v| v.parse().ok())
  }

  pub fn template_version(&self) -> Option<u32> {
    self.tag_value("template").and_then(|v| v.parse().ok())
  }

  pub fn owner(&self) -> Option<&str> {
    self.tag_value_ref("owner")
  }

  pub fn projects(&self) -> Vec<&str> {
    self.tag_values_ref("project")
  }

  pub fn envs(&self) -> Vec<&str> {
    self.tag_values_ref("env")
  }

  pub fn zone(&self) -> Option<&str> {
    self.tag_value_ref("zone")
  }

  /// Whether this server is currently tagged as hosting the given
  /// `(tenant, project, env)` scope.
  pub fn hosts_scope(&self, tenant: &str, project: &str, env: &str) -> bool {
    self.owner() == Some(tenant)
      && self.projects().contains(&project)
      && self.envs().contains(&env)
  }

  fn tag_value(&self, key: &str) -> Option<String> {
    self.tag_value_ref(key).map(str::to_string)
  }

  fn tag_value_ref(&self, key: &str) -> Option<&str> {
    let prefix = format!("{key}:");
    self.tags.iter().find_map(|t| t.strip_prefix(prefix.as_str()))
  }

  fn tag_values_ref(&self, key: &str) -> Vec<&str> {
    let prefix = format!("{key}:");
    self
      .tags
      .iter()
      .filter_map(|t| t.strip_prefix(prefix.as_str()))
      .collect()
  }
}

/// `status:{active|reserve|destroying}` — see `spec.md` §3 Lifecycle.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServerStatus {
  Active,
  Reserve,
  Destroying,
  /// Stage 2 recovery exhausted its 3 attempts; left for manual cleanup.
  DestroyingManual,
}

/// A request to create a new server from a snapshot or base image, handed
/// to the Server Inventory / Template Provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSpec {
  pub region: String,
  pub cpu: u32,
  pub memory_mb: u64,
  pub tags: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  fn server(tags: &[&str]) -> Server {
    Server {
      id: "srv-1".into(),
      private_ip: Ipv4Addr::new(10, 0, 0, 1).into(),
      public_ip: None,
      region: "lon1".into(),
      cpu: 2,
      memory_mb: 4096,
      created_at: Utc::now(),
      tags: tags.iter().map(|s| s.to_string()).collect(),
    }
  }

  #[test]
  fn reads_single_valued_tags() {
    let s = server(&["status:active", "owner:u1", "zone:lon1", "template:3"]);
    assert_eq!(s.status(), Some(ServerStatus::Active));
    assert_eq!(s.owner(), Some("u1"));
    assert_eq!(s.zone(), Some("lon1"));
    assert_eq!(s.template_version(), Some(3));
  }

  #[test]
  fn reads_multi_valued_tags_and_scope() {
    let s = server(&[
      "status:active",
      "owner:u1",
      "project:myapp",
      "project:other",
      "env:prod",
    ]);
    assert!(s.hosts_scope("u1", "myapp", "prod"));
    assert!(s.hosts_scope("u1", "other", "prod"));
    assert!(!s.hosts_scope("u1", "myapp", "staging"));
  }
}
