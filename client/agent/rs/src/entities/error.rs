use serde::{Deserialize, Serialize};

use crate::entities::tuple::Tuple;

/// The taxonomised error kinds from `spec.md` §7. Reported structurally in
/// rollout results, not just surfaced as opaque `anyhow` chains — callers
/// (the rollout coordinator, the monitor tick) match on these to decide
/// retry vs. rollback vs. fail-fast.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum DeployError {
  #[error("config error: {0}")]
  Config(String),

  #[error("provider error ({kind:?}): {message}")]
  Provider { kind: ProviderErrorKind, message: String },

  #[error("transport error to {host}: {message}")]
  Transport { host: String, message: String },

  #[error("health gate failed for {tuple} on {host}: {reason:?}")]
  HealthGate { tuple: Tuple, host: String, reason: HealthGateFailureReason },

  #[error("sidecar reload failed on {host}: {message}")]
  SidecarReload { host: String, message: String },

  #[error("rollout already in progress for {0}")]
  RolloutInProgress(Tuple),

  #[error("recovery aborted for host {host} after {attempts} attempts")]
  RecoveryAborted { host: String, attempts: u32 },

  #[error("secret rotation conflict for {tuple} key {key}")]
  SecretRotationConflict { tuple: Tuple, key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderErrorKind {
  Transient,
  Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthGateFailureReason {
  Crash,
  TimedOut,
  UnhealthyResponse,
}
