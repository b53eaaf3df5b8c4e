use std::time::Duration;

use chrono::{DateTime, Utc};
use drydock_client::entities::tuple::{Toggle, Tuple};
use executor::{Executor, RemoteExecutor};

/// Answers "which of the two toggle slots is currently live on `host`"
/// (`spec.md` §4.A reverse query, §4.G step 3). Queries the Remote Executor
/// for each candidate container's start time via `docker inspect`; if both
/// are live (crash recovery), the older one is reported for removal by the
/// caller and the newer wins.
pub async fn live_containers(
  executor: &Executor,
  host: &str,
  tuple: &Tuple,
) -> anyhow::Result<Vec<(Toggle, DateTime<Utc>)>> {
  let mut live = Vec::new();
  for (toggle, name) in [
    (Toggle::Base, naming::container_name(tuple)),
    (Toggle::Secondary, naming::container_name_alt(tuple)),
  ] {
    let command = format!("docker inspect -f '{{{{.State.StartedAt}}}}' {name} 2>/dev/null");
    if let Ok(result) = executor.run(host, "root", &command, None, Duration::from_secs(10)).await {
      if result.success() {
        if let Ok(started_at) = DateTime::parse_from_rfc3339(result.stdout.trim()) {
          live.push((toggle, started_at.with_timezone(&Utc)));
        }
      }
    }
  }
  Ok(live)
}

/// Determines which slot the *new* container should occupy: the one not
/// currently live, per `spec.md` §4.G step 3. On crash recovery (both
/// live), the older container's slot is reused and the caller is
/// responsible for stopping it first.
pub async fn determine_toggle(executor: &Executor, host: &str, tuple: &Tuple) -> anyhow::Result<ToggleDecision> {
  let mut live = live_containers(executor, host, tuple).await?;
  live.sort_by_key(|(_, started_at)| *started_at);

  Ok(match live.len() {
    0 => ToggleDecision { next: Toggle::Base, stale: None },
    1 => {
      let (live_toggle, _) = live[0];
      ToggleDecision { next: live_toggle.other(), stale: None }
    }
    _ => {
      // Both live: the older occupies the slot the new container reuses.
      let (older, _) = live[0];
      ToggleDecision { next: older, stale: Some(older) }
    }
  })
}

pub struct ToggleDecision {
  pub next: Toggle,
  /// Set only in the crash-recovery case: the stale container at this
  /// toggle must be stopped and removed before starting the new one.
  pub stale: Option<Toggle>,
}
