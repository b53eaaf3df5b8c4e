//! Stage 1 (restart the unhealthy container via its Health Agent) and
//! Stage 2 (replace the host entirely) recovery, per `spec.md` §4.I steps
//! 5-6. Stage 2 is guarded by a `recovery_owner:{leader_ip}:{epoch}` tag
//! lock with a 10-minute TTL, so a leader that dies mid-recovery doesn't
//! permanently wedge the host for whichever peer takes over leadership.

use std::time::Duration;

use chrono::Utc;
use drydock_client::entities::{
  error::DeployError,
  health::ContainerState,
  server::{Server, ServerSpec, ServerStatus},
};

use crate::MonitorCtx;

const RECOVERY_LOCK_PREFIX: &str = "recovery_owner:";
const RECOVERY_LOCK_TTL: Duration = Duration::from_secs(600);
pub const MAX_STAGE2_ATTEMPTS: u32 = 3;
/// `spec.md` §4.I step 5: a Stage 1 restart gets 30 s to prove itself
/// before it counts as failed.
const STAGE1_VERIFY_WINDOW: Duration = Duration::from_secs(30);
/// Two failed Stage 1 attempts escalate to Stage 2.
const MAX_STAGE1_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryState {
  stage1_attempts: u32,
  stage1_last_attempt_at: Option<chrono::DateTime<Utc>>,
  stage2_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
  RestartedContainers,
  /// A Stage 1 restart was issued; still inside its 30 s verification
  /// window, so nothing new is done this tick.
  AwaitingVerification,
  LockHeldByElsewhere,
  Replaced,
}

pub async fn recover(
  ctx: &MonitorCtx<'_>,
  peer: &Server,
  state: &mut RecoveryState,
  degraded: bool,
  tenant: &str,
  project: &str,
  env: &str,
) -> anyhow::Result<RecoveryOutcome> {
  if state.stage2_attempts >= MAX_STAGE2_ATTEMPTS {
    mark_manual(ctx, peer).await?;
    return Err(DeployError::RecoveryAborted { host: peer.id.clone(), attempts: state.stage2_attempts }.into());
  }

  // Unreachable (not merely degraded): there's no container list to act
  // on, so there's nothing for Stage 1 to do — go straight to Stage 2.
  if !degraded {
    return replace_host(ctx, peer, state, tenant, project, env).await;
  }

  if let Some(last_attempt) = state.stage1_last_attempt_at {
    let elapsed = Utc::now().signed_duration_since(last_attempt).to_std().unwrap_or_default();
    if elapsed < STAGE1_VERIFY_WINDOW {
      return Ok(RecoveryOutcome::AwaitingVerification);
    }
    // Verification window elapsed and the peer is still degraded: this
    // attempt failed.
    if state.stage1_attempts >= MAX_STAGE1_ATTEMPTS {
      return replace_host(ctx, peer, state, tenant, project, env).await;
    }
  }

  if let Ok(health) = ctx.agent_client(peer.private_ip).get_health().await {
    let unhealthy: Vec<_> = health.containers.iter().filter(|c| c.state != ContainerState::Running).collect();
    for container in &unhealthy {
      let _ = ctx.agent_client(peer.private_ip).restart_container(container.name.clone()).await;
    }
  }
  state.stage1_attempts += 1;
  state.stage1_last_attempt_at = Some(Utc::now());
  Ok(RecoveryOutcome::RestartedContainers)
}

async fn replace_host(
  ctx: &MonitorCtx<'_>,
  peer: &Server,
  state: &mut RecoveryState,
  tenant: &str,
  project: &str,
  env: &str,
) -> anyhow::Result<RecoveryOutcome> {
  if !try_acquire_recovery_lock(ctx, peer).await? {
    return Ok(RecoveryOutcome::LockHeldByElsewhere);
  }

  let zone = peer.zone().unwrap_or("default").to_string();
  let template_version = peer.template_version().unwrap_or(0);
  let snapshot_id = ctx.provisioner.ensure_template(&zone, template_version).await?;

  let mut tags = std::collections::BTreeSet::new();
  tags.insert("status:active".to_string());
  tags.insert(format!("owner:{tenant}"));
  tags.insert(format!("project:{project}"));
  tags.insert(format!("env:{env}"));
  tags.insert(format!("zone:{zone}"));
  let replacement =
    ctx.provisioner.clone_server(&snapshot_id, ServerSpec { region: zone, cpu: peer.cpu, memory_mb: peer.memory_mb, tags }).await;

  state.stage2_attempts += 1;

  let replacement = match replacement {
    Ok(replacement) => replacement,
    Err(e) => return Err(e),
  };
  tracing::info!(old = peer.id, new = replacement.id, "cloned replacement host");

  ctx.provider.destroy(&peer.id).await?;
  Ok(RecoveryOutcome::Replaced)
}

async fn try_acquire_recovery_lock(ctx: &MonitorCtx<'_>, peer: &Server) -> anyhow::Result<bool> {
  let current = ctx.provider.list(&[]).await?;
  let Some(server) = current.into_iter().find(|s| s.id == peer.id) else {
    return Ok(false);
  };
  if let Some(existing) = server.tags.iter().find(|t| t.starts_with(RECOVERY_LOCK_PREFIX)) {
    if let Some(age) = lock_age_secs(existing) {
      if age < RECOVERY_LOCK_TTL.as_secs() as i64 {
        return Ok(false);
      }
    }
  }
  let mut tags: Vec<String> = server.tags.into_iter().filter(|t| !t.starts_with(RECOVERY_LOCK_PREFIX)).collect();
  tags.push(format!("{RECOVERY_LOCK_PREFIX}{}:{}", ctx.self_private_ip, Utc::now().timestamp()));
  ctx.provider.set_tags(&peer.id, &tags).await?;
  Ok(true)
}

fn lock_age_secs(tag: &str) -> Option<i64> {
  let ts: i64 = tag.rsplit(':').next()?.parse().ok()?;
  Some(Utc::now().timestamp() - ts)
}

async fn mark_manual(ctx: &MonitorCtx<'_>, peer: &Server) -> anyhow::Result<()> {
  let mut tags: Vec<String> = peer.tags.iter().filter(|t| !t.starts_with("status:")).cloned().collect();
  tags.push(format!("status:{}", ServerStatus::DestroyingManual));
  ctx.provider.set_tags(&peer.id, &tags).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lock_age_parses_trailing_timestamp() {
    let ts = Utc::now().timestamp() - 30;
    let tag = format!("recovery_owner:10.0.0.1:{ts}");
    let age = lock_age_secs(&tag).unwrap();
    assert!((29..=31).contains(&age));
  }

  #[test]
  fn fresh_state_has_not_tried_stage1() {
    let state = RecoveryState::default();
    assert_eq!(state.stage1_attempts, 0);
    assert!(state.stage1_last_attempt_at.is_none());
    assert_eq!(state.stage2_attempts, 0);
  }
}
