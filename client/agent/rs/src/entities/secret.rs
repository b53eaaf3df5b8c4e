use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::entities::tuple::Tuple;

/// A `{key -> value}` map for one `T`, stored as one file per key under
/// `/var/lib/deploy/{tenant}/{project}/{env}/secrets/{service}/`. See
/// `spec.md` §3, §4.F.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretObject {
  pub entries: Vec<SecretEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretEntry {
  pub key: String,
  pub value: String,
}

impl SecretObject {
  pub fn get(&self, key: &str) -> Option<&str> {
    self.entries.iter().find(|e| e.key == key).map(|e| e.value.as_str())
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    let key = key.into();
    if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
      entry.value = value.into();
    } else {
      self.entries.push(SecretEntry { key, value: value.into() });
    }
  }
}

/// The on-host directory a `T`'s secrets live in, and the `.new`/rename
/// staging path rotation writes through.
pub struct SecretPaths {
  pub root: PathBuf,
}

impl SecretPaths {
  pub fn new(root_directory: &std::path::Path, tuple: &Tuple) -> Self {
    Self {
      root: root_directory
        .join(&tuple.tenant)
        .join(&tuple.project)
        .join(&tuple.env)
        .join("secrets")
        .join(&tuple.service),
    }
  }

  pub fn key_path(&self, key: &str) -> PathBuf {
    self.root.join(key)
  }

  pub fn staged_path(&self, key: &str) -> PathBuf {
    self.root.join(format!("{key}.new"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn set_overwrites_existing_key() {
    let mut secrets = SecretObject::default();
    secrets.set("password", "a");
    secrets.set("password", "b");
    assert_eq!(secrets.entries.len(), 1);
    assert_eq!(secrets.get("password"), Some("b"));
  }

  #[test]
  fn paths_are_rooted_under_tenant_project_env_service() {
    let tuple = Tuple::new("u1", "myapp", "prod", "postgres");
    let paths = SecretPaths::new(std::path::Path::new("/var/lib/deploy"), &tuple);
    assert_eq!(
      paths.key_path("password"),
      std::path::PathBuf::from(
        "/var/lib/deploy/u1/myapp/prod/secrets/postgres/password"
      )
    );
    assert_eq!(
      paths.staged_path("password"),
      std::path::PathBuf::from(
        "/var/lib/deploy/u1/myapp/prod/secrets/postgres/password.new"
      )
    );
  }
}
