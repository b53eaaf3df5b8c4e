use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::tuple::{Toggle, Tuple};

/// Per `(T, host)` record of what is currently deployed. Written both as a
/// Docker label (authoritative) and as a hint file on the host
/// (`/var/lib/deploy/.../deployment.json`) — see `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
  pub tuple: Tuple,
  pub toggle: Toggle,
  pub container_name: String,
  pub version: String,
  /// `None` in single-host mode, where the container binds no host port.
  pub host_port: Option<u16>,
  pub started_at: DateTime<Utc>,
  pub image_digest: String,
}

impl DeploymentRecord {
  /// The well-known Docker label keys this record round-trips through, per
  /// `spec.md` §6 "Container labels".
  pub const LABEL_TUPLE: &'static str = "deploy.tuple";
  pub const LABEL_VERSION: &'static str = "deploy.version";
  pub const LABEL_HOST_PORT: &'static str = "deploy.host_port";
  pub const LABEL_TOGGLE: &'static str = "deploy.toggle";
  pub const LABEL_STARTED_AT: &'static str = "deploy.started_at";

  pub fn to_labels(&self) -> Vec<(String, String)> {
    let mut labels = vec![
      (Self::LABEL_TUPLE.to_string(), self.tuple.to_string()),
      (Self::LABEL_VERSION.to_string(), self.version.clone()),
      (Self::LABEL_TOGGLE.to_string(), self.toggle.to_string()),
      (
        Self::LABEL_STARTED_AT.to_string(),
        self.started_at.to_rfc3339(),
      ),
    ];
    if let Some(port) = self.host_port {
      labels.push((Self::LABEL_HOST_PORT.to_string(), port.to_string()));
    }
    labels
  }
}

/// Answer to "which of the two toggle slots is currently live on this
/// host", per `spec.md` §4.A reverse query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveContainer {
  pub name: String,
  pub toggle: Toggle,
  pub host_port: Option<u16>,
  pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn labels_include_host_port_only_when_set() {
    let record = DeploymentRecord {
      tuple: Tuple::new("u1", "myapp", "prod", "api"),
      toggle: Toggle::Base,
      container_name: "u1_myapp_prod_api".into(),
      version: "7".into(),
      host_port: None,
      started_at: Utc::now(),
      image_digest: "sha256:abc".into(),
    };
    let labels = record.to_labels();
    assert!(labels.iter().all(|(k, _)| k != DeploymentRecord::LABEL_HOST_PORT));

    let record = DeploymentRecord { host_port: Some(8357), ..record };
    let labels = record.to_labels();
    assert!(labels
      .iter()
      .any(|(k, v)| k == DeploymentRecord::LABEL_HOST_PORT && v == "8357"));
  }
}
