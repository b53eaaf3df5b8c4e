//! Component I — Health Monitor.
//!
//! Every tick, each host's monitor probes itself and every peer in its
//! `(tenant, project, env)` scope over the Health Agent's `/health` route,
//! and keeps a [`HealthRecord`] per peer. The peer with the lowest private
//! IP among those currently looking healthy is the leader; only the
//! leader drives recovery (`spec.md` §4.I). A leader crash just moves the
//! role to the next-lowest IP on the next tick — there is no separate
//! leader-election protocol to fail.

mod recovery;

pub use recovery::{RecoveryOutcome, RecoveryState};

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_timing_util::{Timelength, wait_until_timelength};
use chrono::Utc;
use drydock_client::{
  api::AgentClient,
  entities::health::{ContainerState, HealthRecord},
  entities::server::Server,
};
use inventory::CloudProvider;

/// Fallback tick cadence when `MonitorCtx::tick_interval` isn't set to one
/// of `async_timing_util`'s named lengths (see [`MonitorCtx::tick_timelength`]).
pub const TICK_INTERVAL: Timelength = Timelength::FiveSeconds;
pub const PEER_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// `spec.md` §4.I step 6 default.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(900);

pub struct MonitorCtx<'a> {
  pub provider: &'a dyn CloudProvider,
  pub provisioner: &'a provisioner::TemplateProvisioner<'a>,
  pub self_private_ip: IpAddr,
  pub agent_port: u16,
  pub shared_secret: String,
  /// How often this host re-probes itself and its peers.
  pub tick_interval: Duration,
  /// How often the leader emits an "all-OK" heartbeat absent a state change.
  pub heartbeat_interval: Duration,
}

impl<'a> MonitorCtx<'a> {
  fn agent_client(&self, ip: IpAddr) -> AgentClient {
    AgentClient::new(format!("http://{ip}:{}", self.agent_port), self.shared_secret.clone())
  }

  /// `wait_until_timelength` only accepts `async_timing_util`'s named
  /// lengths; round the configured interval down to the nearest one so an
  /// arbitrary `tick_interval` still produces a sensible cadence.
  fn tick_timelength(&self) -> Timelength {
    match self.tick_interval.as_secs() {
      0..=4 => Timelength::OneSecond,
      5..=14 => Timelength::FiveSeconds,
      15..=59 => Timelength::FifteenSeconds,
      60..=299 => Timelength::OneMinute,
      _ => Timelength::FiveMinutes,
    }
  }
}

/// Per-scope bookkeeping for `spec.md` §4.I step 6's heartbeat: when the
/// leader last emitted one, and whether the fleet looked all-OK at the time.
#[derive(Debug, Default)]
pub struct HeartbeatState {
  last_emitted_at: Option<chrono::DateTime<Utc>>,
  last_all_ok: Option<bool>,
}

/// Runs the tick loop forever, for the given `(tenant, project, env)` scope.
/// Call once per scope this host participates in.
pub async fn run(ctx: &MonitorCtx<'_>, tenant: &str, project: &str, env: &str) -> ! {
  let mut records: HashMap<String, HealthRecord> = HashMap::new();
  let mut recovery: HashMap<String, RecoveryState> = HashMap::new();
  let mut heartbeat = HeartbeatState::default();
  loop {
    wait_until_timelength(ctx.tick_timelength(), 0).await;
    if let Err(e) = tick(ctx, tenant, project, env, &mut records, &mut recovery, &mut heartbeat).await {
      tracing::warn!(error = %e, tenant, project, env, "health monitor tick failed");
    }
  }
}

/// One probe-and-maybe-recover cycle. Exposed directly (rather than only
/// through [`run`]) so callers can drive it from their own loop and unit
/// tests can exercise a single tick deterministically.
pub async fn tick(
  ctx: &MonitorCtx<'_>,
  tenant: &str,
  project: &str,
  env: &str,
  records: &mut HashMap<String, HealthRecord>,
  recovery: &mut HashMap<String, RecoveryState>,
  heartbeat: &mut HeartbeatState,
) -> anyhow::Result<()> {
  let peers = ctx
    .provider
    .list(&[format!("owner:{tenant}"), format!("project:{project}"), format!("env:{env}")])
    .await?;

  for peer in &peers {
    let record = records.entry(peer.id.clone()).or_default();
    match ctx.agent_client(peer.private_ip).get_health().await {
      Ok(health) => {
        let unhealthy = health.containers.iter().find(|c| matches!(c.state, ContainerState::Missing | ContainerState::Restarting));
        match unhealthy {
          Some(c) => record.record_degraded(format!("container {} is {}", c.name, c.state)),
          None => {
            record.record_success(Utc::now());
            recovery.remove(&peer.id);
          }
        }
      }
      Err(e) => record.record_failure(e.to_string()),
    }
  }

  let Some(leader) = elect_leader(&peers, records) else {
    return Ok(());
  };
  if leader.private_ip != ctx.self_private_ip {
    return Ok(());
  }

  emit_heartbeat(ctx, heartbeat, &peers, records, tenant, project, env);

  for peer in &peers {
    if peer.private_ip == ctx.self_private_ip {
      continue;
    }
    let record = records.entry(peer.id.clone()).or_default();
    if !record.failing_badly() {
      continue;
    }
    let state = recovery.entry(peer.id.clone()).or_default();
    match recovery::recover(ctx, peer, state, record.degraded, tenant, project, env).await {
      Ok(RecoveryOutcome::AwaitingVerification) => {
        tracing::debug!(host = peer.id, "awaiting stage 1 verification window");
      }
      Ok(outcome) => {
        tracing::warn!(host = peer.id, ?outcome, "recovery action taken");
        if matches!(outcome, RecoveryOutcome::Replaced) {
          records.remove(&peer.id);
          recovery.remove(&peer.id);
        }
      }
      Err(e) => tracing::error!(host = peer.id, error = %e, "recovery attempt failed"),
    }
  }

  Ok(())
}

/// `spec.md` §4.I step 6: the leader emits an "all-OK" notification every
/// `heartbeat_interval`, and an immediate event the moment the fleet's
/// overall health flips either direction.
fn emit_heartbeat(
  ctx: &MonitorCtx<'_>,
  heartbeat: &mut HeartbeatState,
  peers: &[Server],
  records: &HashMap<String, HealthRecord>,
  tenant: &str,
  project: &str,
  env: &str,
) {
  let all_ok = peers.iter().all(|p| records.get(&p.id).map(|r| r.looks_healthy()).unwrap_or(true));
  let now = Utc::now();
  let state_changed = heartbeat.last_all_ok != Some(all_ok);
  let interval_elapsed = heartbeat
    .last_emitted_at
    .map(|at| now.signed_duration_since(at).to_std().unwrap_or_default() >= ctx.heartbeat_interval)
    .unwrap_or(true);
  if !state_changed && !interval_elapsed {
    return;
  }
  if all_ok {
    tracing::info!(tenant, project, env, "heartbeat: all OK");
  } else {
    tracing::warn!(tenant, project, env, "heartbeat: one or more peers unhealthy");
  }
  heartbeat.last_emitted_at = Some(now);
  heartbeat.last_all_ok = Some(all_ok);
}

/// The peer with the lowest private IP among those with no recorded
/// failures leads. Ties cannot occur (private IPs are unique); if nobody
/// looks healthy, there is no leader this tick and recovery is skipped.
fn elect_leader<'a>(peers: &'a [Server], records: &HashMap<String, HealthRecord>) -> Option<&'a Server> {
  peers
    .iter()
    .filter(|p| records.get(&p.id).map(|r| r.looks_healthy()).unwrap_or(true))
    .min_by_key(|p| p.private_ip)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  fn server(id: &str, ip: [u8; 4]) -> Server {
    Server {
      id: id.to_string(),
      private_ip: Ipv4Addr::from(ip).into(),
      public_ip: None,
      region: "lon1".into(),
      cpu: 1,
      memory_mb: 1024,
      created_at: Utc::now(),
      tags: Default::default(),
    }
  }

  #[test]
  fn elects_lowest_ip_among_healthy_peers() {
    let peers = vec![server("a", [10, 0, 0, 3]), server("b", [10, 0, 0, 1]), server("c", [10, 0, 0, 2])];
    let records = HashMap::new();
    let leader = elect_leader(&peers, &records).unwrap();
    assert_eq!(leader.id, "b");
  }

  #[test]
  fn skips_unhealthy_peers_when_electing() {
    let peers = vec![server("a", [10, 0, 0, 1]), server("b", [10, 0, 0, 2])];
    let mut records = HashMap::new();
    let mut unhealthy = HealthRecord::default();
    unhealthy.record_failure("x");
    records.insert("a".to_string(), unhealthy);
    let leader = elect_leader(&peers, &records).unwrap();
    assert_eq!(leader.id, "b");
  }

  #[test]
  fn no_leader_when_nobody_looks_healthy() {
    let peers = vec![server("a", [10, 0, 0, 1])];
    let mut records = HashMap::new();
    let mut unhealthy = HealthRecord::default();
    unhealthy.record_failure("x");
    records.insert("a".to_string(), unhealthy);
    assert!(elect_leader(&peers, &records).is_none());
  }
}
