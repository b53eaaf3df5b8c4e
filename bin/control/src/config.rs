use std::{path::PathBuf, sync::OnceLock};

use clap::Parser;
use logger::{LogConfig, LogLevel};
use serde::{Deserialize, Serialize};

/// `bin/control`'s process config (`SPEC_FULL.md` §2.3): how to reach every
/// host's Health Agent, the image registry/template settings the
/// Deployment Engine and Template Provisioner need, and the tick intervals
/// for the auto-scaling cycle and the Backup Orchestrator schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
  #[serde(default = "default_bind_ip")]
  pub bind_ip: String,
  #[serde(default = "default_port")]
  pub port: u16,
  /// Shared with every `bin/agent` via `X-Deploy-Auth`.
  pub agent_shared_secret: String,
  #[serde(default = "default_agent_port")]
  pub agent_port: u16,
  #[serde(default = "default_root_directory")]
  pub secrets_root: PathBuf,
  pub docker_hub_user: String,
  #[serde(default)]
  pub template_version: u32,
  pub base_image_id: String,
  pub bake_script: String,
  #[serde(default = "default_autoscale_interval_s")]
  pub autoscale_interval_s: u64,
  #[serde(default = "default_backup_interval_s")]
  pub backup_interval_s: u64,
  /// `spec.md` §4.I step 6: the cluster-wide default every `bin/agent`'s
  /// own Health Monitor should be configured with. The control plane
  /// doesn't run the monitor itself (that's per-host), but this is the
  /// value operators roll out to agent configs alongside it.
  #[serde(default = "default_heartbeat_interval_s")]
  pub heartbeat_interval_s: u64,
  #[serde(default)]
  pub logging: LogConfig,
}

impl Default for ControlConfig {
  fn default() -> Self {
    Self {
      bind_ip: default_bind_ip(),
      port: default_port(),
      agent_shared_secret: String::new(),
      agent_port: default_agent_port(),
      secrets_root: default_root_directory(),
      docker_hub_user: String::new(),
      template_version: 0,
      base_image_id: String::new(),
      bake_script: String::new(),
      autoscale_interval_s: default_autoscale_interval_s(),
      backup_interval_s: default_backup_interval_s(),
      heartbeat_interval_s: default_heartbeat_interval_s(),
      logging: LogConfig::default(),
    }
  }
}

fn default_bind_ip() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_agent_port() -> u16 { 8081 }
fn default_root_directory() -> PathBuf { PathBuf::from("/var/lib/deploy") }
/// `spec.md` §4.G's autoscale cycle has no fixed cadence; 5 minutes keeps
/// the control plane from hammering `CloudProvider::list` on every tick.
fn default_autoscale_interval_s() -> u64 { 300 }
fn default_backup_interval_s() -> u64 { 3600 }
fn default_heartbeat_interval_s() -> u64 { 900 }

#[derive(Parser)]
pub struct CliArgs {
  #[arg(long)]
  pub config_path: Option<Vec<PathBuf>>,
  #[arg(long)]
  pub config_keyword: Option<Vec<String>>,
  #[arg(long)]
  pub log_level: Option<tracing::Level>,
}

#[derive(Deserialize)]
struct Env {
  #[serde(default)]
  control_config_paths: Vec<PathBuf>,
  #[serde(default)]
  control_config_keywords: Vec<String>,
  control_port: Option<u16>,
  control_bind_ip: Option<String>,
  control_agent_shared_secret: Option<String>,
  control_agent_port: Option<u16>,
  control_secrets_root: Option<PathBuf>,
  control_docker_hub_user: Option<String>,
  control_template_version: Option<u32>,
  control_base_image_id: Option<String>,
  control_bake_script: Option<String>,
  control_autoscale_interval_s: Option<u64>,
  control_backup_interval_s: Option<u64>,
  control_heartbeat_interval_s: Option<u64>,
  control_logging_level: Option<LogLevel>,
}

pub fn control_config() -> &'static ControlConfig {
  static CONTROL_CONFIG: OnceLock<ControlConfig> = OnceLock::new();
  CONTROL_CONFIG.get_or_init(|| {
    let env: Env = envy::from_env().expect("failed to parse control environment");
    let args = CliArgs::parse();
    let config_paths = args.config_path.unwrap_or(env.control_config_paths);

    let config = if config_paths.is_empty() {
      ControlConfig::default()
    } else {
      config::ConfigLoader {
        paths: &config_paths.iter().map(PathBuf::as_path).collect::<Vec<_>>(),
        match_wildcards: &args
          .config_keyword
          .unwrap_or(env.control_config_keywords)
          .iter()
          .map(String::as_str)
          .collect::<Vec<_>>(),
        include_file_name: ".controlinclude",
        merge_nested: true,
        extend_array: false,
        debug_print: args.log_level.map(|l| l == tracing::Level::DEBUG || l == tracing::Level::TRACE).unwrap_or(false),
      }
      .load()
      .expect("failed at parsing control config from paths")
    };

    ControlConfig {
      port: env.control_port.unwrap_or(config.port),
      bind_ip: env.control_bind_ip.unwrap_or(config.bind_ip),
      agent_shared_secret: env.control_agent_shared_secret.unwrap_or(config.agent_shared_secret),
      agent_port: env.control_agent_port.unwrap_or(config.agent_port),
      secrets_root: env.control_secrets_root.unwrap_or(config.secrets_root),
      docker_hub_user: env.control_docker_hub_user.unwrap_or(config.docker_hub_user),
      template_version: env.control_template_version.unwrap_or(config.template_version),
      base_image_id: env.control_base_image_id.unwrap_or(config.base_image_id),
      bake_script: env.control_bake_script.unwrap_or(config.bake_script),
      autoscale_interval_s: env.control_autoscale_interval_s.unwrap_or(config.autoscale_interval_s),
      backup_interval_s: env.control_backup_interval_s.unwrap_or(config.backup_interval_s),
      heartbeat_interval_s: env.control_heartbeat_interval_s.unwrap_or(config.heartbeat_interval_s),
      logging: LogConfig {
        level: args.log_level.map(LogLevel::from).or(env.control_logging_level).unwrap_or(config.logging.level),
        ..config.logging
      },
    }
  })
}
