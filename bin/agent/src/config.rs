use std::{net::IpAddr, path::PathBuf, sync::OnceLock};

use clap::Parser;
use logger::{LogConfig, LogLevel};
use serde::{Deserialize, Serialize};

/// `bin/agent`'s process config (`SPEC_FULL.md` §2.3): bind address/port,
/// shared secret for `X-Deploy-Auth`, root directory for `/var/lib/deploy`,
/// the `(tenant, project, env, zone)` scope this host's monitor watches, and
/// what it needs to clone a replacement host during Stage 2 recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
  #[serde(default = "default_bind_ip")]
  pub bind_ip: String,
  #[serde(default = "default_port")]
  pub port: u16,
  pub shared_secret: String,
  #[serde(default = "default_root_directory")]
  pub root_directory: PathBuf,
  /// This host's private IP, used both for leader election in the Health
  /// Monitor's tick loop and as the `recovery_owner:` lock identity.
  pub private_ip: IpAddr,
  pub tenant: String,
  pub project: String,
  pub env: String,
  pub zone: String,
  pub base_image_id: String,
  pub bake_script: String,
  /// Passed straight through to the local leg of the Remote Executor
  /// (`host == "local"`) and the Health Agent's own container inspection.
  #[serde(default = "default_docker_socket_path")]
  pub docker_socket_path: PathBuf,
  /// How often the Health Monitor tick loop probes itself and its peers.
  #[serde(default = "default_monitor_tick_interval_s")]
  pub monitor_tick_interval_s: u64,
  /// `spec.md` §4.I step 6 default: 15 min.
  #[serde(default = "default_heartbeat_interval_s")]
  pub heartbeat_interval_s: u64,
  #[serde(default)]
  pub logging: LogConfig,
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self {
      bind_ip: default_bind_ip(),
      port: default_port(),
      shared_secret: String::new(),
      root_directory: default_root_directory(),
      private_ip: IpAddr::from([127, 0, 0, 1]),
      tenant: String::new(),
      project: String::new(),
      env: String::new(),
      zone: String::new(),
      base_image_id: String::new(),
      bake_script: String::new(),
      docker_socket_path: default_docker_socket_path(),
      monitor_tick_interval_s: default_monitor_tick_interval_s(),
      heartbeat_interval_s: default_heartbeat_interval_s(),
      logging: LogConfig::default(),
    }
  }
}

fn default_bind_ip() -> String {
  "0.0.0.0".to_string()
}

fn default_port() -> u16 {
  8081
}

fn default_root_directory() -> PathBuf {
  PathBuf::from("/var/lib/deploy")
}

fn default_docker_socket_path() -> PathBuf {
  PathBuf::from("/var/run/docker.sock")
}

fn default_monitor_tick_interval_s() -> u64 {
  5
}

fn default_heartbeat_interval_s() -> u64 {
  900
}

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
  agent_config_paths: Vec<PathBuf>,
  #[serde(default)]
  agent_config_keywords: Vec<String>,
  agent_port: Option<u16>,
  agent_bind_ip: Option<String>,
  agent_shared_secret: Option<String>,
  agent_root_directory: Option<PathBuf>,
  agent_private_ip: Option<IpAddr>,
  agent_tenant: Option<String>,
  agent_project: Option<String>,
  agent_env: Option<String>,
  agent_zone: Option<String>,
  agent_base_image_id: Option<String>,
  agent_bake_script: Option<String>,
  agent_docker_socket_path: Option<PathBuf>,
  agent_monitor_tick_interval_s: Option<u64>,
  agent_heartbeat_interval_s: Option<u64>,
  agent_logging_level: Option<LogLevel>,
}

pub fn agent_config() -> &'static AgentConfig {
  static AGENT_CONFIG: OnceLock<AgentConfig> = OnceLock::new();
  AGENT_CONFIG.get_or_init(|| {
    let env: Env = envy::from_env().expect("failed to parse agent environment");
    let args = CliArgs::parse();
    let config_paths = args.config_path.unwrap_or(env.agent_config_paths);

    let config = if config_paths.is_empty() {
      AgentConfig::default()
    } else {
      config::ConfigLoader {
        paths: &config_paths.iter().map(PathBuf::as_path).collect::<Vec<_>>(),
        match_wildcards: &args
          .config_keyword
          .unwrap_or(env.agent_config_keywords)
          .iter()
          .map(String::as_str)
          .collect::<Vec<_>>(),
        include_file_name: ".agentinclude",
        merge_nested: true,
        extend_array: false,
        debug_print: args.log_level.map(|l| l == tracing::Level::DEBUG || l == tracing::Level::TRACE).unwrap_or(false),
      }
      .load()
      .expect("failed at parsing agent config from paths")
    };

    AgentConfig {
      port: env.agent_port.unwrap_or(config.port),
      bind_ip: env.agent_bind_ip.unwrap_or(config.bind_ip),
      shared_secret: env.agent_shared_secret.unwrap_or(config.shared_secret),
      root_directory: env.agent_root_directory.unwrap_or(config.root_directory),
      private_ip: env.agent_private_ip.unwrap_or(config.private_ip),
      tenant: env.agent_tenant.unwrap_or(config.tenant),
      project: env.agent_project.unwrap_or(config.project),
      env: env.agent_env.unwrap_or(config.env),
      zone: env.agent_zone.unwrap_or(config.zone),
      base_image_id: env.agent_base_image_id.unwrap_or(config.base_image_id),
      bake_script: env.agent_bake_script.unwrap_or(config.bake_script),
      docker_socket_path: env.agent_docker_socket_path.unwrap_or(config.docker_socket_path),
      monitor_tick_interval_s: env.agent_monitor_tick_interval_s.unwrap_or(config.monitor_tick_interval_s),
      heartbeat_interval_s: env.agent_heartbeat_interval_s.unwrap_or(config.heartbeat_interval_s),
      logging: LogConfig {
        level: args.log_level.map(LogLevel::from).or(env.agent_logging_level).unwrap_or(config.logging.level),
        ..config.logging
      },
    }
  })
}
