use serde::{Deserialize, Serialize};

use crate::entities::tuple::Tuple;

/// A closed, enumerated variant over the service shapes the Deployment
/// Engine knows how to roll out, replacing the dynamic "config-as-dicts"
/// the source material used (see `spec.md` §9 Design Notes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum ServiceKind {
  Web {
    container_port: u16,
    #[serde(default = "default_health_path")]
    health_path: String,
    #[serde(default = "default_web_health_timeout_s")]
    health_timeout_s: u32,
  },
  Worker {
    #[serde(default)]
    restart_policy: RestartPolicy,
  },
  Scheduled {
    schedule: CronSchedule,
    smoke_command: Option<String>,
  },
  StatefulDb {
    engine: DbEngine,
    container_port: u16,
    #[serde(default = "default_stateful_health_timeout_s")]
    health_timeout_s: u32,
  },
  StatefulCache {
    engine: CacheEngine,
    container_port: u16,
  },
  StatefulSearch {
    engine: SearchEngine,
    container_port: u16,
  },
}

fn default_health_path() -> String {
  "/".to_string()
}

fn default_web_health_timeout_s() -> u32 {
  60
}

fn default_stateful_health_timeout_s() -> u32 {
  180
}

impl ServiceKind {
  /// Whether instances of this kind are long-running containers toggled
  /// base/secondary, as opposed to one-shot scheduled jobs.
  pub fn is_long_running(&self) -> bool {
    !matches!(self, ServiceKind::Scheduled { .. })
  }

  /// Whether the Health Gate probes over the network (TCP/HTTP) or simply
  /// watches for a restart loop.
  pub fn container_port(&self) -> Option<u16> {
    match self {
      ServiceKind::Web { container_port, .. }
      | ServiceKind::StatefulDb { container_port, .. }
      | ServiceKind::StatefulCache { container_port, .. }
      | ServiceKind::StatefulSearch { container_port, .. } => {
        Some(*container_port)
      }
      ServiceKind::Worker { .. } | ServiceKind::Scheduled { .. } => None,
    }
  }

  pub fn health_timeout_s(&self) -> u32 {
    match self {
      ServiceKind::Web { health_timeout_s, .. } => *health_timeout_s,
      ServiceKind::StatefulDb { health_timeout_s, .. } => *health_timeout_s,
      ServiceKind::StatefulCache { .. } | ServiceKind::StatefulSearch { .. } => {
        default_stateful_health_timeout_s()
      }
      ServiceKind::Worker { .. } => 10,
      ServiceKind::Scheduled { .. } => 30,
    }
  }

  pub fn is_stateful(&self) -> bool {
    matches!(
      self,
      ServiceKind::StatefulDb { .. }
        | ServiceKind::StatefulCache { .. }
        | ServiceKind::StatefulSearch { .. }
    )
  }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
  #[default]
  OnFailure,
  Always,
  Never,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DbEngine {
  Postgres,
  Mysql,
  Mongo,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheEngine {
  Redis,
  Memcached,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchEngine {
  Elasticsearch,
  Meilisearch,
}

/// A cron expression plus an optional IANA timezone, following the
/// `schedule`/`schedule_timezone` split the teacher's own scheduled
/// resources use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronSchedule {
  pub expression: String,
  #[serde(default)]
  pub timezone: String,
}

/// One service within a project: image, placement, dependencies, and
/// optional scaling policy. The unit the Deployment Engine rolls out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
  pub name: String,
  pub kind: ServiceKind,
  pub image: String,
  #[serde(default)]
  pub depends_on: Vec<String>,
  pub servers_count: u32,
  pub server_zone: String,
  pub server_cpu: u32,
  pub server_memory_mb: u64,
  #[serde(default)]
  pub auto_scaling: Option<AutoScalingConfig>,
}

impl ServiceConfig {
  pub fn tuple(&self, tenant: &str, project: &str, env: &str) -> Tuple {
    Tuple::new(tenant, project, env, &self.name)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoScalingConfig {
  #[serde(default = "default_min_replicas")]
  pub min_replicas: u32,
  #[serde(default = "default_max_replicas")]
  pub max_replicas: u32,
  #[serde(default)]
  pub thresholds: ScalingThresholds,
}

fn default_min_replicas() -> u32 {
  1
}

fn default_max_replicas() -> u32 {
  20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingThresholds {
  pub cpu_up_pct: f32,
  pub cpu_down_pct: f32,
  pub mem_up_pct: f32,
  pub mem_down_pct: f32,
  pub rps_up: f32,
  pub rps_down: f32,
}

impl Default for ScalingThresholds {
  fn default() -> Self {
    Self {
      cpu_up_pct: 75.0,
      cpu_down_pct: 20.0,
      mem_up_pct: 80.0,
      mem_down_pct: 30.0,
      rps_up: 500.0,
      rps_down: 50.0,
    }
  }
}

/// The declarative input to a project's deployment: every service, fully
/// resolved. Validated once at config-load (`ConfigError` on failure) and
/// never mutated mid-rollout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
  pub tenant: String,
  pub project: String,
  pub env: String,
  pub services: Vec<ServiceConfig>,
  /// Hosts beyond the minimum the tuple needs are returned to `reserve`
  /// rather than destroyed, up to this count per tenant.
  #[serde(default = "default_reserve_budget")]
  pub reserve_budget: u32,
}

fn default_reserve_budget() -> u32 {
  2
}

impl ProjectConfig {
  /// Validates tuple shape and `depends_on` references. A `ConfigError` in
  /// `spec.md` §7 terms; fatal, pre-flight only.
  pub fn validate(&self) -> Result<(), String> {
    for service in &self.services {
      let tuple = service.tuple(&self.tenant, &self.project, &self.env);
      tuple.validate()?;
      for dep in &service.depends_on {
        if !self.services.iter().any(|s| &s.name == dep) {
          return Err(format!(
            "service `{}` depends_on unknown service `{dep}`",
            service.name
          ));
        }
      }
    }
    Ok(())
  }

  /// Longest-path-from-a-root ordering over the `depends_on` DAG. Services
  /// sharing an order deploy in parallel; later orders wait for earlier
  /// ones.
  pub fn startup_order(&self) -> Vec<Vec<&ServiceConfig>> {
    use std::collections::HashMap;

    let mut order_of: HashMap<&str, usize> = HashMap::new();
    let by_name: HashMap<&str, &ServiceConfig> =
      self.services.iter().map(|s| (s.name.as_str(), s)).collect();

    fn compute<'a>(
      name: &'a str,
      by_name: &HashMap<&'a str, &'a ServiceConfig>,
      order_of: &mut HashMap<&'a str, usize>,
      visiting: &mut Vec<&'a str>,
    ) -> usize {
      if let Some(&o) = order_of.get(name) {
        return o;
      }
      if visiting.contains(&name) {
        // A cycle; ConfigError territory, but startup_order is infallible
        // by contract, so we just stop the path here.
        return 0;
      }
      visiting.push(name);
      let service = by_name[name];
      let order = service
        .depends_on
        .iter()
        .map(|dep| compute(dep, by_name, order_of, visiting) + 1)
        .max()
        .unwrap_or(0);
      visiting.pop();
      order_of.insert(name, order);
      order
    }

    let mut visiting = Vec::new();
    let max_order = self
      .services
      .iter()
      .map(|s| compute(&s.name, &by_name, &mut order_of, &mut visiting))
      .max()
      .unwrap_or(0);

    let mut tiers: Vec<Vec<&ServiceConfig>> = vec![Vec::new(); max_order + 1];
    for service in &self.services {
      tiers[order_of[service.name.as_str()]].push(service);
    }
    tiers
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn web(name: &str, deps: &[&str]) -> ServiceConfig {
    ServiceConfig {
      name: name.to_string(),
      kind: ServiceKind::Web {
        container_port: 8000,
        health_path: "/".to_string(),
        health_timeout_s: 60,
      },
      image: "repo/img:1".to_string(),
      depends_on: deps.iter().map(|s| s.to_string()).collect(),
      servers_count: 1,
      server_zone: "lon1".to_string(),
      server_cpu: 1,
      server_memory_mb: 1024,
      auto_scaling: None,
    }
  }

  #[test]
  fn startup_order_is_longest_path() {
    let cfg = ProjectConfig {
      tenant: "u1".into(),
      project: "myapp".into(),
      env: "prod".into(),
      services: vec![
        web("postgres", &[]),
        web("api", &["postgres"]),
        web("worker", &["postgres"]),
        web("gateway", &["api", "worker"]),
      ],
      reserve_budget: 2,
    };
    let tiers = cfg.startup_order();
    assert_eq!(tiers.len(), 3);
    assert_eq!(tiers[0].len(), 1);
    assert_eq!(tiers[0][0].name, "postgres");
    assert_eq!(tiers[1].len(), 2);
    assert_eq!(tiers[2][0].name, "gateway");
  }

  #[test]
  fn validate_rejects_unknown_dependency() {
    let cfg = ProjectConfig {
      tenant: "u1".into(),
      project: "myapp".into(),
      env: "prod".into(),
      services: vec![web("api", &["missing"])],
      reserve_budget: 2,
    };
    assert!(cfg.validate().is_err());
  }
}
