use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// In-memory, per-peer bookkeeping a Health Monitor keeps across ticks.
/// Explicitly not persisted: a process restart resets the grace window,
/// per `spec.md` §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthRecord {
  pub last_ok_at: Option<DateTime<Utc>>,
  pub consecutive_failures: u32,
  pub last_error: Option<String>,
  /// Set by the most recent failure that reached the agent (`docker_ok`
  /// and reachable, but a container was `missing`/`restarting`), cleared
  /// by an unreachable probe or a success. Distinguishes the Stage 1
  /// (restart) path from the Stage 2 (replace) path at the same
  /// `consecutive_failures` threshold.
  pub degraded: bool,
}

impl HealthRecord {
  pub fn record_success(&mut self, at: DateTime<Utc>) {
    self.last_ok_at = Some(at);
    self.consecutive_failures = 0;
    self.last_error = None;
    self.degraded = false;
  }

  /// The agent was unreachable or returned an error.
  pub fn record_failure(&mut self, error: impl Into<String>) {
    self.consecutive_failures += 1;
    self.last_error = Some(error.into());
    self.degraded = false;
  }

  /// The agent answered (`docker_ok=true`) but a container it reports is
  /// `missing` or `restarting`.
  pub fn record_degraded(&mut self, error: impl Into<String>) {
    self.consecutive_failures += 1;
    self.last_error = Some(error.into());
    self.degraded = true;
  }

  /// Whether this peer is eligible for leader election / considered
  /// healthy by the local observer's view, per `spec.md` §4.I step 4.
  pub fn looks_healthy(&self) -> bool {
    self.consecutive_failures == 0
  }

  /// `spec.md` §4.I step 5: 3 consecutive failures is the threshold for
  /// both Stage 1 and Stage 2 recovery.
  pub fn failing_badly(&self) -> bool {
    self.consecutive_failures >= 3
  }
}

/// Body of `GET /health` on the Health Agent, per `spec.md` §4.H.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostHealth {
  pub docker_ok: bool,
  pub disk_free_mb: u64,
  pub uptime_s: u64,
  pub containers: Vec<ContainerHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHealth {
  pub name: String,
  pub state: ContainerState,
  pub restarts: u32,
  pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContainerState {
  Running,
  Restarting,
  Exited,
  Missing,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn three_consecutive_failures_triggers_recovery_threshold() {
    let mut record = HealthRecord::default();
    for _ in 0..2 {
      record.record_failure("timeout");
      assert!(!record.failing_badly());
    }
    record.record_failure("timeout");
    assert!(record.failing_badly());
    assert!(!record.looks_healthy());
  }

  #[test]
  fn success_resets_failure_count() {
    let mut record = HealthRecord::default();
    record.record_failure("x");
    record.record_failure("x");
    record.record_success(Utc::now());
    assert_eq!(record.consecutive_failures, 0);
    assert!(record.looks_healthy());
  }
}
