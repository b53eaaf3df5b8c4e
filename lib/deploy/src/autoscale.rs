use std::time::Duration;

use chrono::{DateTime, Utc};
use drydock_client::entities::service::ScalingThresholds;

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(60);
pub const WINDOW: Duration = Duration::from_secs(600);
pub const CYCLE_INTERVAL: Duration = Duration::from_secs(300);
pub const COOLDOWN_UP: Duration = Duration::from_secs(300);
pub const COOLDOWN_DOWN: Duration = Duration::from_secs(600);
pub const MIN_REPLICAS: u32 = 1;
pub const MAX_REPLICAS: u32 = 20;
/// Vertical scaling's own bounds, checked before falling back to
/// horizontal (`spec.md` §4.G: "Vertical is tried before horizontal").
pub const MIN_SERVER_CPU: u32 = 1;
pub const MAX_SERVER_CPU: u32 = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSample {
  pub cpu_pct: f32,
  pub mem_pct: f32,
  pub rps: f32,
}

/// The rolling 10-minute window of per-host samples the leader aggregates
/// every 5 minutes (`spec.md` §4.G Auto-scaling).
#[derive(Debug, Default)]
pub struct SampleWindow {
  samples: Vec<ResourceSample>,
  last_scaled_at: Option<DateTime<Utc>>,
}

impl SampleWindow {
  pub fn push(&mut self, sample: ResourceSample) {
    self.samples.push(sample);
    let max_len = (WINDOW.as_secs() / SAMPLE_INTERVAL.as_secs()) as usize;
    if self.samples.len() > max_len {
      self.samples.remove(0);
    }
  }

  pub fn average(&self) -> ResourceSample {
    if self.samples.is_empty() {
      return ResourceSample::default();
    }
    let n = self.samples.len() as f32;
    let (mut cpu, mut mem, mut rps) = (0.0, 0.0, 0.0);
    for s in &self.samples {
      cpu += s.cpu_pct;
      mem += s.mem_pct;
      rps += s.rps;
    }
    ResourceSample { cpu_pct: cpu / n, mem_pct: mem / n, rps: rps / n }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
  None,
  /// Change `server_cpu`/`server_memory` and redeploy.
  Vertical { up: bool },
  /// Change `servers_count` and redeploy.
  Horizontal { up: bool },
}

/// Decides the scaling action for one service given its aggregated sample,
/// current replica count, and current per-server CPU allotment. Vertical is
/// tried before horizontal within a single cycle (`spec.md` §4.G): only once
/// `current_cpu` is already at its bound does a breached threshold fall
/// through to a replica-count change. Cooldowns are enforced separately by
/// [`decide_with_cooldown`].
pub fn decide(average: ResourceSample, thresholds: &ScalingThresholds, current_replicas: u32, current_cpu: u32) -> ScalingDecision {
  let scale_up = average.cpu_pct >= thresholds.cpu_up_pct
    || average.mem_pct >= thresholds.mem_up_pct
    || average.rps >= thresholds.rps_up;
  let scale_down = average.cpu_pct <= thresholds.cpu_down_pct
    && average.mem_pct <= thresholds.mem_down_pct
    && average.rps <= thresholds.rps_down;

  if scale_up {
    if current_cpu < MAX_SERVER_CPU {
      return ScalingDecision::Vertical { up: true };
    }
    if current_replicas < MAX_REPLICAS {
      return ScalingDecision::Horizontal { up: true };
    }
    return ScalingDecision::None;
  }
  if scale_down {
    if current_cpu > MIN_SERVER_CPU {
      return ScalingDecision::Vertical { up: false };
    }
    if current_replicas > MIN_REPLICAS {
      return ScalingDecision::Horizontal { up: false };
    }
    return ScalingDecision::None;
  }
  ScalingDecision::None
}

/// Wraps [`decide`] with the 5 min up / 10 min down cooldown (`spec.md`
/// §4.G): a decision in the same direction as the last scaling action is
/// suppressed until its cooldown elapses. `window` is updated in place when
/// a decision actually goes through.
pub fn decide_with_cooldown(
  window: &mut SampleWindow,
  thresholds: &ScalingThresholds,
  current_replicas: u32,
  current_cpu: u32,
  now: DateTime<Utc>,
) -> ScalingDecision {
  let decision = decide(window.average(), thresholds, current_replicas, current_cpu);
  let up = match decision {
    ScalingDecision::None => return ScalingDecision::None,
    ScalingDecision::Vertical { up } | ScalingDecision::Horizontal { up } => up,
  };
  let cooldown = if up { COOLDOWN_UP } else { COOLDOWN_DOWN };
  if let Some(last) = window.last_scaled_at {
    let elapsed = now.signed_duration_since(last).to_std().unwrap_or_default();
    if elapsed < cooldown {
      return ScalingDecision::None;
    }
  }
  window.last_scaled_at = Some(now);
  decision
}

#[cfg(test)]
mod tests {
  use super::*;

  fn thresholds() -> ScalingThresholds {
    ScalingThresholds::default()
  }

  #[test]
  fn scales_vertical_up_before_horizontal() {
    let avg = ResourceSample { cpu_pct: 90.0, mem_pct: 10.0, rps: 10.0 };
    assert_eq!(decide(avg, &thresholds(), 3, 1), ScalingDecision::Vertical { up: true });
  }

  #[test]
  fn falls_back_to_horizontal_once_cpu_maxed() {
    let avg = ResourceSample { cpu_pct: 90.0, mem_pct: 10.0, rps: 10.0 };
    assert_eq!(decide(avg, &thresholds(), 3, MAX_SERVER_CPU), ScalingDecision::Horizontal { up: true });
  }

  #[test]
  fn no_action_when_fully_maxed() {
    let avg = ResourceSample { cpu_pct: 90.0, mem_pct: 10.0, rps: 10.0 };
    assert_eq!(decide(avg, &thresholds(), MAX_REPLICAS, MAX_SERVER_CPU), ScalingDecision::None);
  }

  #[test]
  fn stays_put_within_thresholds() {
    let avg = ResourceSample { cpu_pct: 50.0, mem_pct: 50.0, rps: 100.0 };
    assert_eq!(decide(avg, &thresholds(), 3, 1), ScalingDecision::None);
  }

  #[test]
  fn cooldown_suppresses_repeat_scale_up() {
    let mut window = SampleWindow::default();
    window.push(ResourceSample { cpu_pct: 90.0, mem_pct: 10.0, rps: 10.0 });
    let now = Utc::now();
    let first = decide_with_cooldown(&mut window, &thresholds(), 3, 1, now);
    assert_eq!(first, ScalingDecision::Vertical { up: true });
    let second = decide_with_cooldown(&mut window, &thresholds(), 3, 1, now + chrono::Duration::seconds(1));
    assert_eq!(second, ScalingDecision::None);
    let third = decide_with_cooldown(&mut window, &thresholds(), 3, 1, now + chrono::Duration::seconds(301));
    assert_eq!(third, ScalingDecision::Vertical { up: true });
  }

  #[test]
  fn window_drops_oldest_sample_past_capacity() {
    let mut window = SampleWindow::default();
    for i in 0..15 {
      window.push(ResourceSample { cpu_pct: i as f32, mem_pct: 0.0, rps: 0.0 });
    }
    assert_eq!(window.samples.len(), 10);
  }
}
