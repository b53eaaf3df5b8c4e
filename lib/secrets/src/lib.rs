//! Component F — Secrets Store.
//!
//! File-per-key under `/var/lib/deploy/{tenant}/{project}/{env}/secrets/{service}/`,
//! mounted read-only into the consuming container. Passwords are generated
//! on first deploy of a stateful service; rotation writes a `.new` file
//! then atomically renames it (`spec.md` §4.F).

use drydock_client::entities::{error::DeployError, secret::SecretPaths, tuple::Tuple};
use executor::{Executor, RemoteExecutor};
use rand::Rng;
use std::time::Duration;

const PASSWORD_LEN: usize = 32;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn generate_password() -> String {
  let mut rng = rand::rng();
  (0..PASSWORD_LEN).map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char).collect()
}

pub struct SecretsStore<'a> {
  executor: &'a Executor,
  root: std::path::PathBuf,
}

impl<'a> SecretsStore<'a> {
  pub fn new(executor: &'a Executor, root: std::path::PathBuf) -> Self {
    Self { executor, root }
  }

  /// Generates and writes a value for `key` if it doesn't already exist.
  /// Used on first deploy of a stateful service (`spec.md` §3 Secret object).
  pub async fn generate_if_missing(&self, host: &str, tuple: &Tuple, key: &str) -> anyhow::Result<()> {
    let paths = SecretPaths::new(&self.root, tuple);
    let path = paths.key_path(key);
    let exists = self
      .executor
      .run(host, "root", &format!("test -f '{}'", path.display()), None, Duration::from_secs(5))
      .await
      .map(|r| r.success())
      .unwrap_or(false);
    if exists {
      return Ok(());
    }
    let value = generate_password();
    self.executor.upload(host, "root", &path.to_string_lossy(), value.as_bytes()).await?;
    Ok(())
  }

  /// Writes `.new`, then atomically renames over the live file. A second
  /// rotation attempt while a `.new` file is still pending is reported as
  /// `SecretRotationConflict` rather than silently clobbering it.
  pub async fn rotate(&self, host: &str, tuple: &Tuple, key: &str) -> Result<String, DeployError> {
    let paths = SecretPaths::new(&self.root, tuple);
    let staged = paths.staged_path(key);
    let live = paths.key_path(key);

    let staged_exists = self
      .executor
      .run(host, "root", &format!("test -f '{}'", staged.display()), None, Duration::from_secs(5))
      .await
      .map(|r| r.success())
      .unwrap_or(false);
    if staged_exists {
      return Err(DeployError::SecretRotationConflict { tuple: tuple.clone(), key: key.to_string() });
    }

    let new_value = generate_password();
    let upload = |bytes: Vec<u8>| async {
      self.executor.upload(host, "root", &staged.to_string_lossy(), &bytes).await
    };
    upload(new_value.clone().into_bytes())
      .await
      .map_err(|e| DeployError::Transport { host: host.to_string(), message: e.to_string() })?;

    let rename = self
      .executor
      .run(host, "root", &format!("mv '{}' '{}'", staged.display(), live.display()), None, Duration::from_secs(5))
      .await
      .map_err(|e| DeployError::Transport { host: host.to_string(), message: e.to_string() })?;
    if !rename.success() {
      return Err(DeployError::Transport { host: host.to_string(), message: rename.stderr });
    }
    Ok(new_value)
  }

  /// Copies one service's secret files into the directories of every
  /// service that lists it under `depends_on` (`spec.md` §4.F fan-out).
  pub async fn fan_out(
    &self,
    host: &str,
    source: &Tuple,
    key: &str,
    consumers: &[Tuple],
  ) -> anyhow::Result<()> {
    let source_paths = SecretPaths::new(&self.root, source);
    let value = self.executor.download(host, "root", &source_paths.key_path(key).to_string_lossy()).await?;
    for consumer in consumers {
      let consumer_paths = SecretPaths::new(&self.root, consumer);
      self
        .executor
        .upload(host, "root", &consumer_paths.key_path(key).to_string_lossy(), &value)
        .await?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generated_passwords_are_32_chars_and_alphanumeric() {
    let password = generate_password();
    assert_eq!(password.len(), 32);
    assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
  }

  #[test]
  fn generated_passwords_are_not_constant() {
    assert_ne!(generate_password(), generate_password());
  }
}
